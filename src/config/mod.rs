//! 运行时配置管理模块
//!
//! 提供简化的配置管理，支持环境变量、配置文件和默认值

pub mod manager;

// 重新导出主要类型
pub use manager::{
    ChannelPolicy, ConfigManager, DiscoveryConfig, GeminiConfig, GraceConfig, NoticeConfig,
    RuntimeConfig,
};

/// 配置常量
pub mod constants {
    use std::time::Duration;

    // 通道重试策略
    pub const DEFAULT_CHANNEL_TIMEOUT: Duration = Duration::from_millis(10_000);
    pub const DEFAULT_MAX_RETRIES: usize = 3;
    pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(1000);
    pub const CONNECTION_CHECK_TIMEOUT: Duration = Duration::from_millis(3000);

    // 宽限期
    pub const INITIAL_GRACE_PERIOD: Duration = Duration::from_millis(8000);
    pub const NAVIGATION_GRACE_PERIOD: Duration = Duration::from_millis(5000);

    // 聊天容器发现
    pub const DISCOVERY_INTERVAL: Duration = Duration::from_millis(1000);
    pub const DISCOVERY_MAX_ATTEMPTS: usize = 30;

    // 地址轮询
    pub const URL_POLL_INTERVAL: Duration = Duration::from_millis(1000);

    // 提示与设置
    pub const NOTICE_DISPLAY: Duration = Duration::from_millis(5000);
    pub const SETTINGS_FRESHNESS: Duration = Duration::from_millis(5000);

    // 文本过滤相关
    pub const MIN_TEXT_LENGTH: usize = 2;
    pub const MIN_NON_URL_RATIO: f64 = 0.3;

    // Gemini 默认参数
    pub const DEFAULT_GEMINI_API_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
    pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.0-flash-lite";
    pub const DEFAULT_TEMPERATURE: f32 = 0.2;
    pub const DEFAULT_TOP_P: f32 = 0.95;
    pub const DEFAULT_TOP_K: u32 = 40;
    pub const MAX_OUTPUT_TOKENS: u32 = 256;

    // 聊天容器选择器，按优先级排列
    pub const CONTAINER_SELECTORS: &[&str] = &[
        ".chat-scrollable-area__message-container",
        ".Layout-sc-1xcs6mc-0",
        "[role=\"log\"]",
        ".stream-chat",
        ".chat-list",
    ];

    // 消息节点选择器
    pub const MESSAGE_SELECTORS: &[&str] = &[
        ".chat-line__message",
        "[data-a-target=\"chat-line-message\"]",
    ];

    // 节点内部出现这些结构时也视为消息
    pub const MESSAGE_DESCENDANT_SELECTORS: &[&str] = &[
        ".chat-author__display-name",
        "[data-a-target=\"chat-message-username\"]",
        ".text-fragment",
        "[data-a-target=\"chat-message-text\"]",
        ".chat-line__message-container",
        ".chat-line__username-container",
    ];

    // 消息正文选择器
    pub const TEXT_SELECTORS: &[&str] = &[
        ".text-fragment",
        "[data-a-target=\"chat-message-text\"]",
        ".message",
    ];

    // 作者选择器
    pub const AUTHOR_SELECTORS: &[&str] = &[
        ".chat-author__display-name",
        "[data-a-target=\"chat-message-username\"]",
        ".chat-line__username",
    ];

    // 时间戳选择器
    pub const TIMESTAMP_SELECTORS: &[&str] = &[
        ".chat-line__timestamp",
        "[data-a-target=\"chat-timestamp\"]",
    ];

    // 回退查找正文时排除的 class
    pub const AUTHOR_CLASS: &str = "chat-author__display-name";
    pub const TIMESTAMP_CLASS: &str = "chat-line__timestamp";

    // 译文挂载位置选择器
    pub const MESSAGE_CONTAINER_SELECTORS: &[&str] = &[
        ".chat-line__message-container",
        ".chat-line__no-background",
        ".Layout-sc-1xcs6mc-0.jCLQvB",
        ".Layout-sc-1xcs6mc-0.cVmNmw",
        ".Layout-sc-1xcs6mc-0.cwtKyw",
    ];
    pub const ANCESTOR_CONTAINER_CLASSES: &[&str] = &[
        "Layout-sc-1xcs6mc-0",
        "chat-line__message-container",
        "chat-line__no-background",
    ];
    pub const MAX_ANCESTOR_DEPTH: usize = 5;

    // 节点标记
    pub const GRACE_MARKER_ATTR: &str = "data-added-during-grace-period";
    pub const PROCESSED_ATTR: &str = "data-chatlingo-processed";
    pub const PROCESSING_ATTR: &str = "data-chatlingo-processing";
    pub const TRANSLATION_CLASS: &str = "chatlingo-translation";
    pub const MESSAGE_KEY_ATTR: &str = "data-chatlingo-key";
    pub const ANNOTATION_FOR_ATTR: &str = "data-chatlingo-for";

    pub const UNKNOWN_AUTHOR: &str = "Unknown";

    // 配置文件搜索路径
    pub const CONFIG_PATHS: &[&str] = &[
        "chatlingo.toml",
        "config.toml",
        ".chatlingo.toml",
        "~/.config/chatlingo/config.toml",
        "/etc/chatlingo/config.toml",
    ];
}

/// 加载运行时配置，失败时回退到默认配置
pub fn load_runtime_config() -> RuntimeConfig {
    match ConfigManager::new() {
        Ok(manager) => manager.into_config(),
        Err(e) => {
            tracing::warn!("配置加载失败，使用默认配置: {}", e);
            RuntimeConfig::default()
        }
    }
}
