//! # Chatlingo
//!
//! 直播聊天实时翻译核心：从页面变更中发现聊天消息，过滤出需要翻译的
//! 外语消息，经由请求通道交给后台翻译并缓存，最后把译文显示在消息下方。
//!
//! ## 模块组织
//!
//! - `pipeline` - 语言判断与翻译资格过滤（纯函数）
//! - `content` - 消息提取、宽限期、变更监听、译文显示
//! - `channel` - 带超时和重试的请求/响应通道
//! - `background` - 后台翻译服务（缓存 + 远程翻译器）
//! - `storage` - 翻译缓存
//! - `translator` - 远程翻译接口与 Gemini 实现
//! - `settings` / `secret` - 外部设置提供者与密钥保管库接口
//! - `protocol` - 内容侧与后台之间的消息类型
//! - `notice` - 用户提示
//! - `config` / `env` - 运行时配置与环境变量

pub mod background;
pub mod channel;
pub mod config;
pub mod content;
pub mod env;
pub mod error;
#[cfg(feature = "cli")]
pub mod logging;
pub mod notice;
pub mod pipeline;
pub mod protocol;
pub mod runtime;
pub mod secret;
pub mod settings;
pub mod storage;
pub mod translator;

pub use error::{ChatlingoError, ChatlingoResult};
pub use runtime::{ChatRuntime, ReplayReport};
