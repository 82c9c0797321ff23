//! 消息过滤流水线
//!
//! 语言判断与翻译资格过滤，都是无状态的纯函数

pub mod eligibility;
pub mod language;

pub use eligibility::{is_eligible, is_translatable, should_translate, Criteria};
pub use language::{classify, LanguageClass};
