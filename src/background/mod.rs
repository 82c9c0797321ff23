//! 后台侧：请求分发、翻译编排与缓存维护

pub mod service;

pub use service::TranslationService;
