//! 翻译缓存模块
//!
//! 以原文为键保存译文，容量超出时淘汰插入时间最早的条目。
//! 缓存只存在于内存中，不跨进程持久化。

use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use indexmap::IndexMap;

use crate::settings::CachePolicy;

// ============================================================================
// 核心类型
// ============================================================================

/// 缓存条目
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub translated_text: String,
    pub inserted_at: DateTime<Utc>,
}

/// 缓存统计信息
#[derive(Debug, Default, Clone, PartialEq)]
pub struct CacheStats {
    pub total_requests: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub total_entries: usize,
    pub evictions: u64,
    pub expirations: u64,
}

impl CacheStats {
    /// 计算命中率
    pub fn hit_rate(&self) -> f64 {
        if self.total_requests == 0 {
            0.0
        } else {
            self.cache_hits as f64 / self.total_requests as f64
        }
    }

    /// 重置统计信息
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// 翻译缓存
///
/// 键为原文本身（区分大小写，不做规范化）。条目按插入顺序保存，
/// 淘汰时选择 `inserted_at` 最小的条目，时间相同时取迭代顺序中的第一个。
#[derive(Debug, Clone)]
pub struct TranslationCache {
    entries: IndexMap<String, CacheEntry>,
    max_size: usize,
    expiration: TimeDelta,
    stats: CacheStats,
}

// ============================================================================
// 实现
// ============================================================================

impl TranslationCache {
    /// 使用指定容量和过期时间创建缓存
    pub fn with_config(max_size: usize, expiration: Duration) -> Self {
        Self {
            entries: IndexMap::new(),
            max_size: max_size.max(1),
            expiration: TimeDelta::from_std(expiration).unwrap_or(TimeDelta::MAX),
            stats: CacheStats::default(),
        }
    }

    /// 根据缓存策略创建缓存
    pub fn from_policy(policy: &CachePolicy) -> Self {
        Self::with_config(policy.max_size, policy.expiration())
    }

    /// 查找缓存条目，过期条目在查找时被移除
    pub fn lookup(&mut self, key: &str, now: DateTime<Utc>) -> Option<CacheEntry> {
        self.stats.total_requests += 1;

        let expired = match self.entries.get(key) {
            Some(entry) if !self.is_expired(entry, now) => {
                self.stats.cache_hits += 1;
                return Some(entry.clone());
            }
            Some(_) => true,
            None => false,
        };

        if expired {
            self.entries.shift_remove(key);
            self.stats.expirations += 1;
            self.stats.total_entries = self.entries.len();
        }

        self.stats.cache_misses += 1;
        None
    }

    /// 插入缓存条目
    ///
    /// 已有条目会被覆盖并刷新插入时间；插入后超出容量时淘汰一个最旧的条目
    pub fn insert(&mut self, key: String, translated_text: String, now: DateTime<Utc>) {
        // 先移除再插入，保证迭代顺序与插入顺序一致
        self.entries.shift_remove(&key);
        self.entries.insert(
            key,
            CacheEntry {
                translated_text,
                inserted_at: now,
            },
        );

        if self.entries.len() > self.max_size {
            if let Some(evicted) = self.evict_oldest() {
                tracing::debug!("缓存已满，淘汰最旧条目: {}", evicted);
            }
        }

        self.stats.total_entries = self.entries.len();
    }

    /// 淘汰最旧条目，直到条目数不超过 `max_size`
    pub fn trim_to(&mut self, max_size: usize) -> usize {
        let mut evicted = 0;
        while self.entries.len() > max_size {
            if self.evict_oldest().is_none() {
                break;
            }
            evicted += 1;
        }

        self.stats.total_entries = self.entries.len();
        evicted
    }

    /// 清空缓存
    pub fn clear(&mut self) {
        self.entries.clear();
        self.stats.total_entries = 0;
    }

    /// 清理过期条目
    pub fn purge_expired(&mut self, now: DateTime<Utc>) -> usize {
        let before = self.entries.len();
        let expiration = self.expiration;
        self.entries
            .retain(|_, entry| now.signed_duration_since(entry.inserted_at) <= expiration);

        let removed = before - self.entries.len();
        self.stats.expirations += removed as u64;
        self.stats.total_entries = self.entries.len();
        removed
    }

    /// 应用新的缓存策略，容量缩小时立即裁剪
    pub fn reconfigure(&mut self, policy: &CachePolicy) -> usize {
        self.max_size = policy.max_size.max(1);
        self.expiration = TimeDelta::from_std(policy.expiration()).unwrap_or(TimeDelta::MAX);
        self.trim_to(self.max_size)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// 获取统计信息
    pub fn get_stats(&self) -> CacheStats {
        self.stats.clone()
    }

    fn is_expired(&self, entry: &CacheEntry, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(entry.inserted_at) > self.expiration
    }

    fn evict_oldest(&mut self) -> Option<String> {
        // min_by_key 在时间相同时返回第一个，保证淘汰顺序确定
        let index = self
            .entries
            .values()
            .enumerate()
            .min_by_key(|(_, entry)| entry.inserted_at)
            .map(|(index, _)| index)?;

        let (key, _) = self.entries.shift_remove_index(index)?;
        self.stats.evictions += 1;
        Some(key)
    }
}

impl Default for TranslationCache {
    fn default() -> Self {
        Self::from_policy(&CachePolicy::default())
    }
}
