//! 内容侧：页面上的消息发现、过滤、请求翻译与译文显示
//!
//! - `dom`: 基础 DOM 操作和简单选择器
//! - `extractor`: 聊天消息判定与提取
//! - `grace`: 宽限期闸门
//! - `navigation`: 导航事件来源
//! - `processor`: 单条消息的处理流程
//! - `render`: 译文显示
//! - `watcher`: 容器发现与变更监听

pub mod dom;
pub mod extractor;
pub mod grace;
pub mod navigation;
pub mod processor;
pub mod render;
pub mod watcher;

pub use extractor::{ChatMessage, MessageExtractor};
pub use grace::{ArmReason, GateDecision, GracePeriodGate, GracePeriodState};
pub use navigation::{
    NavigationEvent, NavigationEvents, NavigationNotifier, NavigationSource, UrlPoller,
};
pub use processor::{MessageProcessor, ProcessOutcome};
pub use render::DisplayRenderer;
pub use watcher::{
    discover_container, find_container, MutationBatch, MutationFeed, MutationWatcher, WatchSummary,
};
