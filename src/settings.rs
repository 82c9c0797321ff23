//! 用户设置与设置提供者
//!
//! 设置由外部界面写入，核心只读取并订阅变更通知

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::time::Instant;

use crate::error::{ChatlingoError, ChatlingoResult};

/// 扩展运行状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtensionState {
    Enabled,
    Disabled,
    Error,
}

impl ExtensionState {
    pub fn is_enabled(self) -> bool {
        self == ExtensionState::Enabled
    }
}

/// 翻译模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TranslationMode {
    /// 翻译所有消息
    All,
    /// 只翻译非母语消息
    #[serde(rename = "non_japanese", alias = "non_native")]
    NonNative,
    /// 只翻译指定来源语言的消息
    SelectedLanguages,
    /// 自定义策略（当前等同于与目标语言比较）
    Custom,
    /// 无法识别的模式，一律不翻译
    #[serde(other)]
    Unknown,
}

/// 缓存策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachePolicy {
    pub enabled: bool,
    pub max_size: usize,
    pub expiration_ms: u64,
}

impl CachePolicy {
    pub fn expiration(&self) -> Duration {
        Duration::from_millis(self.expiration_ms)
    }
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            max_size: 1000,
            expiration_ms: 24 * 60 * 60 * 1000,
        }
    }
}

/// 译文展示样式
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayStyle {
    pub text_color: String,
    pub background_color: String,
    pub font_style: String,
    pub prefix: String,
}

impl DisplayStyle {
    /// 渲染为内联 style 属性
    pub fn to_css(&self) -> String {
        format!(
            "color: {}; background-color: {}; font-style: {};",
            self.text_color, self.background_color, self.font_style
        )
    }
}

impl Default for DisplayStyle {
    fn default() -> Self {
        Self {
            text_color: "#6c757d".to_string(),
            background_color: "transparent".to_string(),
            font_style: "normal".to_string(),
            prefix: "🌐 ".to_string(),
        }
    }
}

/// 翻译设置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TranslationSettings {
    pub extension_state: ExtensionState,
    pub mode: TranslationMode,
    pub target_language: String,
    pub source_languages: Vec<String>,
    pub api_key_set: bool,
    pub display_style: DisplayStyle,
    pub cache: CachePolicy,
}

impl Default for TranslationSettings {
    fn default() -> Self {
        Self {
            extension_state: ExtensionState::Disabled,
            mode: TranslationMode::NonNative,
            target_language: "ja".to_string(),
            source_languages: Vec::new(),
            api_key_set: false,
            display_style: DisplayStyle::default(),
            cache: CachePolicy::default(),
        }
    }
}

impl TranslationSettings {
    /// 验证设置
    pub fn validate(&self) -> ChatlingoResult<()> {
        if self.cache.max_size == 0 {
            return Err(ChatlingoError::Config("缓存大小必须大于0".to_string()));
        }

        if self.cache.expiration_ms == 0 {
            return Err(ChatlingoError::Config("缓存过期时间必须大于0".to_string()));
        }

        if self.target_language.trim().is_empty() {
            return Err(ChatlingoError::Config("目标语言不能为空".to_string()));
        }

        Ok(())
    }
}

/// 设置变更通知
#[derive(Debug, Clone)]
pub struct SettingsChanged {
    pub previous: TranslationSettings,
    pub current: TranslationSettings,
}

/// 设置提供者
#[async_trait(?Send)]
pub trait SettingsStore {
    /// 读取当前设置
    async fn load(&self) -> ChatlingoResult<TranslationSettings>;

    /// 写入新设置并广播变更
    async fn store(&self, settings: TranslationSettings) -> ChatlingoResult<()>;

    /// 订阅变更通知
    fn subscribe(&self) -> broadcast::Receiver<SettingsChanged>;
}

/// 内存设置提供者
pub struct MemorySettingsStore {
    settings: RefCell<TranslationSettings>,
    changes: broadcast::Sender<SettingsChanged>,
}

impl MemorySettingsStore {
    pub fn new(settings: TranslationSettings) -> Self {
        let (changes, _) = broadcast::channel(16);
        Self {
            settings: RefCell::new(settings),
            changes,
        }
    }

    /// 同步读取快照
    pub fn snapshot(&self) -> TranslationSettings {
        self.settings.borrow().clone()
    }
}

impl Default for MemorySettingsStore {
    fn default() -> Self {
        Self::new(TranslationSettings::default())
    }
}

#[async_trait(?Send)]
impl SettingsStore for MemorySettingsStore {
    async fn load(&self) -> ChatlingoResult<TranslationSettings> {
        Ok(self.snapshot())
    }

    async fn store(&self, settings: TranslationSettings) -> ChatlingoResult<()> {
        settings.validate()?;
        let previous = self.settings.replace(settings.clone());

        if previous != settings {
            // 没有订阅者时发送失败，可以忽略
            let _ = self.changes.send(SettingsChanged {
                previous,
                current: settings,
            });
        }
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<SettingsChanged> {
        self.changes.subscribe()
    }
}

/// 带新鲜度窗口的设置读取缓存
///
/// 窗口内直接返回上次读取的值；提供者出错时回退到上次成功的值，
/// 从未成功过则回退到默认设置
pub struct SettingsCache {
    store: Rc<dyn SettingsStore>,
    freshness: Duration,
    last: RefCell<Option<(TranslationSettings, Instant)>>,
}

impl SettingsCache {
    pub fn new(store: Rc<dyn SettingsStore>, freshness: Duration) -> Self {
        Self {
            store,
            freshness,
            last: RefCell::new(None),
        }
    }

    pub async fn get(&self) -> TranslationSettings {
        let cached = self.last.borrow().clone();
        if let Some((settings, fetched_at)) = &cached {
            if fetched_at.elapsed() < self.freshness {
                return settings.clone();
            }
        }

        match self.store.load().await {
            Ok(settings) => {
                *self.last.borrow_mut() = Some((settings.clone(), Instant::now()));
                settings
            }
            Err(e) => {
                tracing::warn!("读取设置失败，使用缓存的设置: {}", e);
                cached.map(|(settings, _)| settings).unwrap_or_default()
            }
        }
    }

    /// 丢弃缓存，下次读取时强制刷新
    pub fn invalidate(&self) {
        self.last.borrow_mut().take();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    struct FlakyStore {
        inner: MemorySettingsStore,
        fail: Cell<bool>,
        loads: Cell<usize>,
    }

    #[async_trait(?Send)]
    impl SettingsStore for FlakyStore {
        async fn load(&self) -> ChatlingoResult<TranslationSettings> {
            self.loads.set(self.loads.get() + 1);
            if self.fail.get() {
                return Err(ChatlingoError::Internal("storage unavailable".into()));
            }
            self.inner.load().await
        }

        async fn store(&self, settings: TranslationSettings) -> ChatlingoResult<()> {
            self.inner.store(settings).await
        }

        fn subscribe(&self) -> broadcast::Receiver<SettingsChanged> {
            self.inner.subscribe()
        }
    }

    #[test]
    fn test_defaults_match_shipping_configuration() {
        let settings = TranslationSettings::default();
        assert_eq!(settings.extension_state, ExtensionState::Disabled);
        assert_eq!(settings.mode, TranslationMode::NonNative);
        assert_eq!(settings.target_language, "ja");
        assert_eq!(settings.cache.max_size, 1000);
        assert_eq!(settings.display_style.prefix, "🌐 ");
        assert!(!settings.api_key_set);
    }

    #[test]
    fn test_unrecognised_mode_deserializes_as_unknown() {
        let mode: TranslationMode = serde_json::from_str("\"fancy\"").unwrap();
        assert_eq!(mode, TranslationMode::Unknown);

        let mode: TranslationMode = serde_json::from_str("\"non_japanese\"").unwrap();
        assert_eq!(mode, TranslationMode::NonNative);
    }

    #[tokio::test]
    async fn test_store_broadcasts_changes() {
        let store = MemorySettingsStore::default();
        let mut changes = store.subscribe();

        let mut enabled = store.snapshot();
        enabled.extension_state = ExtensionState::Enabled;
        store.store(enabled.clone()).await.unwrap();

        let change = changes.recv().await.unwrap();
        assert_eq!(change.previous.extension_state, ExtensionState::Disabled);
        assert_eq!(change.current, enabled);
    }

    #[tokio::test]
    async fn test_store_rejects_invalid_settings() {
        let store = MemorySettingsStore::default();
        let mut invalid = store.snapshot();
        invalid.cache.max_size = 0;
        assert!(store.store(invalid).await.is_err());
    }

    fn flaky_enabled_store(fail: bool) -> Rc<FlakyStore> {
        Rc::new(FlakyStore {
            inner: MemorySettingsStore::new(TranslationSettings {
                extension_state: ExtensionState::Enabled,
                ..Default::default()
            }),
            fail: Cell::new(fail),
            loads: Cell::new(0),
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_settings_cache_freshness_and_fallback() {
        let store = flaky_enabled_store(false);
        let cache = SettingsCache::new(store.clone(), Duration::from_secs(5));

        cache.get().await;
        cache.get().await;
        assert_eq!(store.loads.get(), 1);

        // 过期后读取失败，回退到上次成功的值
        tokio::time::advance(Duration::from_secs(6)).await;
        store.fail.set(true);
        let settings = cache.get().await;
        assert_eq!(store.loads.get(), 2);
        assert_eq!(settings.extension_state, ExtensionState::Enabled);
    }

    #[tokio::test]
    async fn test_settings_cache_defaults_without_any_success() {
        let store = flaky_enabled_store(true);
        let cache = SettingsCache::new(store, Duration::from_secs(5));
        assert_eq!(cache.get().await.extension_state, ExtensionState::Disabled);
    }
}
