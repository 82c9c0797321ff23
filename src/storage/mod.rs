//! 存储模块

pub mod cache;

pub use cache::{CacheEntry, CacheStats, TranslationCache};
