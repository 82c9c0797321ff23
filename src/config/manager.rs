//! 简化的配置管理器
//!
//! 提供统一的配置接口，支持文件配置、环境变量和默认值

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::constants;
use crate::env::EnvVar;
use crate::error::{helpers, ChatlingoError, ChatlingoResult};
use crate::settings::TranslationSettings;

/// 通道重试策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct ChannelPolicy {
    pub timeout_ms: u64,
    pub max_retries: usize,
    pub retry_delay_ms: u64,
}

impl ChannelPolicy {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    /// 总尝试次数（首次 + 重试）
    pub fn max_attempts(&self) -> usize {
        self.max_retries + 1
    }
}

impl Default for ChannelPolicy {
    fn default() -> Self {
        Self {
            timeout_ms: constants::DEFAULT_CHANNEL_TIMEOUT.as_millis() as u64,
            max_retries: constants::DEFAULT_MAX_RETRIES,
            retry_delay_ms: constants::DEFAULT_RETRY_DELAY.as_millis() as u64,
        }
    }
}

/// 宽限期配置
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct GraceConfig {
    pub initial_ms: u64,
    pub navigation_ms: u64,
}

impl GraceConfig {
    pub fn initial(&self) -> Duration {
        Duration::from_millis(self.initial_ms)
    }

    pub fn navigation(&self) -> Duration {
        Duration::from_millis(self.navigation_ms)
    }
}

impl Default for GraceConfig {
    fn default() -> Self {
        Self {
            initial_ms: constants::INITIAL_GRACE_PERIOD.as_millis() as u64,
            navigation_ms: constants::NAVIGATION_GRACE_PERIOD.as_millis() as u64,
        }
    }
}

/// 容器发现与地址轮询配置
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    pub interval_ms: u64,
    pub max_attempts: usize,
    pub url_poll_interval_ms: u64,
}

impl DiscoveryConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn url_poll_interval(&self) -> Duration {
        Duration::from_millis(self.url_poll_interval_ms)
    }
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            interval_ms: constants::DISCOVERY_INTERVAL.as_millis() as u64,
            max_attempts: constants::DISCOVERY_MAX_ATTEMPTS,
            url_poll_interval_ms: constants::URL_POLL_INTERVAL.as_millis() as u64,
        }
    }
}

/// 提示显示配置
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct NoticeConfig {
    pub display_ms: u64,
}

impl NoticeConfig {
    pub fn display(&self) -> Duration {
        Duration::from_millis(self.display_ms)
    }
}

impl Default for NoticeConfig {
    fn default() -> Self {
        Self {
            display_ms: constants::NOTICE_DISPLAY.as_millis() as u64,
        }
    }
}

/// Gemini 接口配置
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct GeminiConfig {
    pub api_url: String,
    pub model: String,
    pub temperature: f32,
    pub top_p: f32,
    pub top_k: u32,
    pub max_output_tokens: u32,
}

impl GeminiConfig {
    /// 生成内容接口地址（不含密钥）
    pub fn endpoint(&self) -> String {
        format!("{}/models/{}:generateContent", self.api_url, self.model)
    }
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_url: constants::DEFAULT_GEMINI_API_URL.to_string(),
            model: constants::DEFAULT_GEMINI_MODEL.to_string(),
            temperature: constants::DEFAULT_TEMPERATURE,
            top_p: constants::DEFAULT_TOP_P,
            top_k: constants::DEFAULT_TOP_K,
            max_output_tokens: constants::MAX_OUTPUT_TOKENS,
        }
    }
}

/// 运行时配置
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub settings_freshness_ms: u64,
    pub channel: ChannelPolicy,
    pub grace: GraceConfig,
    pub discovery: DiscoveryConfig,
    pub notice: NoticeConfig,
    pub gemini: GeminiConfig,
    /// 设置提供者首次启动时使用的设置
    pub defaults: TranslationSettings,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            settings_freshness_ms: constants::SETTINGS_FRESHNESS.as_millis() as u64,
            channel: ChannelPolicy::default(),
            grace: GraceConfig::default(),
            discovery: DiscoveryConfig::default(),
            notice: NoticeConfig::default(),
            gemini: GeminiConfig::default(),
            defaults: TranslationSettings::default(),
        }
    }
}

impl RuntimeConfig {
    pub fn settings_freshness(&self) -> Duration {
        Duration::from_millis(self.settings_freshness_ms)
    }

    /// 验证配置
    pub fn validate(&self) -> ChatlingoResult<()> {
        if self.channel.timeout_ms == 0 {
            return Err(ChatlingoError::Config("通道超时必须大于0".to_string()));
        }

        if self.discovery.interval_ms == 0 || self.discovery.max_attempts == 0 {
            return Err(ChatlingoError::Config("容器发现间隔和次数必须大于0".to_string()));
        }

        if self.discovery.url_poll_interval_ms == 0 {
            return Err(ChatlingoError::Config("地址轮询间隔必须大于0".to_string()));
        }

        if self.gemini.model.is_empty() {
            return Err(ChatlingoError::Config("模型名称不能为空".to_string()));
        }

        if !(0.0..=2.0).contains(&self.gemini.temperature) {
            return Err(ChatlingoError::Config(format!(
                "temperature 超出范围: {}",
                self.gemini.temperature
            )));
        }

        self.defaults.validate()
    }

    /// 应用环境变量覆盖
    pub fn apply_env_overrides(&mut self) {
        use crate::env::{cache, channel, discovery, gemini, grace};

        fn take<T>(name: &str, value: Option<crate::env::EnvResult<T>>) -> Option<T> {
            match value {
                Some(Ok(value)) => Some(value),
                Some(Err(e)) => {
                    tracing::warn!("忽略无效的环境变量 {}: {}", name, e);
                    None
                }
                None => None,
            }
        }

        if let Some(enabled) = take(cache::Enabled::NAME, cache::Enabled::get_override()) {
            self.defaults.cache.enabled = enabled;
        }
        if let Some(size) = take(cache::MaxSize::NAME, cache::MaxSize::get_override()) {
            self.defaults.cache.max_size = size;
        }
        if let Some(expiration) = take(cache::Expiration::NAME, cache::Expiration::get_override()) {
            self.defaults.cache.expiration_ms = expiration.as_millis() as u64;
        }

        if let Some(timeout) = take(channel::Timeout::NAME, channel::Timeout::get_override()) {
            self.channel.timeout_ms = timeout.as_millis() as u64;
        }
        if let Some(retries) =
            take(channel::MaxRetries::NAME, channel::MaxRetries::get_override())
        {
            self.channel.max_retries = retries;
        }
        if let Some(delay) = take(channel::RetryDelay::NAME, channel::RetryDelay::get_override()) {
            self.channel.retry_delay_ms = delay.as_millis() as u64;
        }

        if let Some(initial) = take(grace::Initial::NAME, grace::Initial::get_override()) {
            self.grace.initial_ms = initial.as_millis() as u64;
        }
        if let Some(navigation) = take(grace::Navigation::NAME, grace::Navigation::get_override()) {
            self.grace.navigation_ms = navigation.as_millis() as u64;
        }

        if let Some(interval) =
            take(discovery::Interval::NAME, discovery::Interval::get_override())
        {
            self.discovery.interval_ms = interval.as_millis() as u64;
        }
        if let Some(attempts) =
            take(discovery::MaxAttempts::NAME, discovery::MaxAttempts::get_override())
        {
            self.discovery.max_attempts = attempts;
        }

        if let Some(api_url) = take(gemini::ApiUrl::NAME, gemini::ApiUrl::get_override()) {
            tracing::info!("环境变量覆盖 API URL: {}", api_url);
            self.gemini.api_url = api_url;
        }
        if let Some(model) = take(gemini::Model::NAME, gemini::Model::get_override()) {
            self.gemini.model = model;
        }
    }
}

/// 简化的配置管理器
pub struct ConfigManager {
    config: RuntimeConfig,
}

impl ConfigManager {
    /// 创建新的配置管理器
    pub fn new() -> ChatlingoResult<Self> {
        let mut config = Self::load_config()?;
        config.apply_env_overrides();
        config.validate()?;

        Ok(Self { config })
    }

    /// 从指定文件创建配置管理器
    pub fn from_path<P: AsRef<Path>>(path: P) -> ChatlingoResult<Self> {
        let mut config = Self::load_from_file(path.as_ref())?;
        config.apply_env_overrides();
        config.validate()?;

        Ok(Self { config })
    }

    pub fn into_config(self) -> RuntimeConfig {
        self.config
    }

    /// 从文件加载配置
    fn load_config() -> ChatlingoResult<RuntimeConfig> {
        // 首先尝试加载 .env 文件
        Self::load_dotenv();

        // 查找配置文件
        for path in constants::CONFIG_PATHS {
            let expanded_path = shellexpand::tilde(path);
            if Path::new(expanded_path.as_ref()).exists() {
                tracing::info!("加载配置文件: {}", expanded_path);
                return Self::load_from_file(Path::new(expanded_path.as_ref()));
            }
        }

        tracing::info!("未找到配置文件，使用默认配置");
        Ok(RuntimeConfig::default())
    }

    /// 从指定文件加载配置
    fn load_from_file(path: &Path) -> ChatlingoResult<RuntimeConfig> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ChatlingoError::Config(format!("读取配置文件失败: {}", e)))?;

        if path.extension().map_or(false, |ext| ext == "toml") {
            toml::from_str(&content)
                .map_err(|e| ChatlingoError::Config(format!("解析TOML配置失败: {}", e)))
        } else {
            serde_json::from_str(&content)
                .map_err(|e| ChatlingoError::Config(format!("解析JSON配置失败: {}", e)))
        }
    }

    /// 加载 .env 文件
    fn load_dotenv() {
        let env_files = [".env.local", ".env.development", ".env.production", ".env"];

        for env_file in &env_files {
            if Path::new(env_file).exists() && dotenv::from_filename(env_file).is_ok() {
                tracing::info!("已加载环境变量文件: {}", env_file);
                break;
            }
        }
    }

    /// 生成示例配置文件
    pub fn generate_example_config<P: AsRef<Path>>(path: P) -> ChatlingoResult<()> {
        let config = RuntimeConfig::default();
        let content = toml::to_string_pretty(&config)
            .map_err(|e| helpers::config_error(format!("序列化配置失败: {}", e)))?;

        std::fs::write(path, content)
            .map_err(|e| helpers::config_error(format!("写入配置文件失败: {}", e)))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::TranslationMode;
    use std::io::Write;

    #[test]
    fn test_default_policy_values() {
        let config = RuntimeConfig::default();
        assert_eq!(config.channel.max_attempts(), 4);
        assert_eq!(config.channel.retry_delay(), Duration::from_millis(1000));
        assert_eq!(config.channel.timeout(), Duration::from_millis(10_000));
        assert!(config.grace.initial() > config.grace.navigation());
        assert_eq!(config.notice.display(), Duration::from_millis(5000));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_gemini_endpoint() {
        let config = GeminiConfig::default();
        assert_eq!(
            config.endpoint(),
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.0-flash-lite:generateContent"
        );
    }

    #[test]
    fn test_load_partial_toml_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[channel]
max_retries = 1

[defaults]
mode = "all"
target_language = "ja"
"#
        )
        .unwrap();

        let config = ConfigManager::load_from_file(file.path()).unwrap();
        assert_eq!(config.channel.max_retries, 1);
        assert_eq!(config.channel.timeout_ms, 10_000);
        assert_eq!(config.defaults.mode, TranslationMode::All);
        assert_eq!(config.defaults.cache.max_size, 1000);
    }

    #[test]
    fn test_load_json_file() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(file, r#"{{"grace": {{"initial_ms": 100}}}}"#).unwrap();

        let config = ConfigManager::load_from_file(file.path()).unwrap();
        assert_eq!(config.grace.initial_ms, 100);
        assert_eq!(config.grace.navigation_ms, 5000);
    }

    #[test]
    fn test_example_config_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chatlingo.toml");

        ConfigManager::generate_example_config(&path).unwrap();
        let loaded = ConfigManager::load_from_file(&path).unwrap();
        assert_eq!(loaded, RuntimeConfig::default());
    }

    #[test]
    fn test_validate_rejects_zero_timeout() {
        let mut config = RuntimeConfig::default();
        config.channel.timeout_ms = 0;
        assert!(config.validate().is_err());
    }
}
