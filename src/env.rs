//! 统一的环境变量管理系统
//!
//! 提供类型安全、可验证的环境变量访问，所有变量以 `CHATLINGO_` 为前缀

use std::env;
use std::fmt;
use std::time::Duration;

/// 环境变量解析错误
#[derive(Debug, Clone)]
pub struct EnvError {
    pub variable: String,
    pub message: String,
}

impl fmt::Display for EnvError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Environment variable '{}': {}", self.variable, self.message)
    }
}

impl std::error::Error for EnvError {}

pub type EnvResult<T> = Result<T, EnvError>;

/// 环境变量访问器特性
pub trait EnvVar<T> {
    const NAME: &'static str;
    const DEFAULT: Option<T>;
    const DESCRIPTION: &'static str;

    fn parse(value: &str) -> EnvResult<T>;

    fn get() -> EnvResult<T> {
        match env::var(Self::NAME) {
            Ok(value) => Self::parse(&value),
            Err(_) => {
                if let Some(default) = Self::DEFAULT {
                    Ok(default)
                } else {
                    Err(EnvError {
                        variable: Self::NAME.to_string(),
                        message: "Required environment variable not set".to_string(),
                    })
                }
            }
        }
    }

    /// 只在变量被显式设置时返回值，用于覆盖配置文件
    fn get_override() -> Option<EnvResult<T>> {
        env::var(Self::NAME).ok().map(|value| Self::parse(&value))
    }
}

/// 核心环境变量定义
pub mod core {
    use super::*;

    /// 日志级别
    pub struct LogLevel;
    impl EnvVar<String> for LogLevel {
        const NAME: &'static str = "CHATLINGO_LOG_LEVEL";
        const DEFAULT: Option<String> = None;

        fn get() -> EnvResult<String> {
            match env::var(Self::NAME) {
                Ok(value) => Self::parse(&value),
                Err(_) => Ok("info".to_string()),
            }
        }
        const DESCRIPTION: &'static str = "Log level: trace, debug, info, warn, error";

        fn parse(value: &str) -> EnvResult<String> {
            match value.to_lowercase().as_str() {
                "trace" | "debug" | "info" | "warn" | "error" => Ok(value.to_lowercase()),
                _ => Err(EnvError {
                    variable: Self::NAME.to_string(),
                    message: format!(
                        "Invalid log level '{}'. Use: trace, debug, info, warn, error",
                        value
                    ),
                }),
            }
        }
    }
}

/// 缓存相关环境变量
pub mod cache {
    use super::*;

    /// 缓存启用状态
    pub struct Enabled;
    impl EnvVar<bool> for Enabled {
        const NAME: &'static str = "CHATLINGO_CACHE_ENABLED";
        const DEFAULT: Option<bool> = Some(true);
        const DESCRIPTION: &'static str = "Enable the in-memory translation cache";

        fn parse(value: &str) -> EnvResult<bool> {
            parse_bool(value, Self::NAME)
        }
    }

    /// 缓存最大条目数
    pub struct MaxSize;
    impl EnvVar<usize> for MaxSize {
        const NAME: &'static str = "CHATLINGO_CACHE_MAX_SIZE";
        const DEFAULT: Option<usize> = Some(1000);
        const DESCRIPTION: &'static str = "Maximum number of cached translations";

        fn parse(value: &str) -> EnvResult<usize> {
            parse_positive_usize(value, Self::NAME, 1, 1_000_000)
        }
    }

    /// 缓存过期时间
    pub struct Expiration;
    impl EnvVar<Duration> for Expiration {
        const NAME: &'static str = "CHATLINGO_CACHE_EXPIRATION_MS";
        const DEFAULT: Option<Duration> = Some(Duration::from_millis(24 * 60 * 60 * 1000));
        const DESCRIPTION: &'static str = "Cache entry lifetime in milliseconds";

        fn parse(value: &str) -> EnvResult<Duration> {
            parse_millis(value, Self::NAME, 1, u64::MAX)
        }
    }
}

/// 通道重试策略
pub mod channel {
    use super::*;

    /// 单次尝试超时
    pub struct Timeout;
    impl EnvVar<Duration> for Timeout {
        const NAME: &'static str = "CHATLINGO_CHANNEL_TIMEOUT_MS";
        const DEFAULT: Option<Duration> = Some(Duration::from_millis(10_000));
        const DESCRIPTION: &'static str = "Per-attempt request timeout in milliseconds";

        fn parse(value: &str) -> EnvResult<Duration> {
            parse_millis(value, Self::NAME, 1, 600_000)
        }
    }

    /// 最大重试次数
    pub struct MaxRetries;
    impl EnvVar<usize> for MaxRetries {
        const NAME: &'static str = "CHATLINGO_CHANNEL_MAX_RETRIES";
        const DEFAULT: Option<usize> = Some(3);
        const DESCRIPTION: &'static str = "Retries after the first attempt (0 disables retry)";

        fn parse(value: &str) -> EnvResult<usize> {
            parse_positive_usize(value, Self::NAME, 0, 20)
        }
    }

    /// 重试间隔
    pub struct RetryDelay;
    impl EnvVar<Duration> for RetryDelay {
        const NAME: &'static str = "CHATLINGO_CHANNEL_RETRY_DELAY_MS";
        const DEFAULT: Option<Duration> = Some(Duration::from_millis(1000));
        const DESCRIPTION: &'static str = "Fixed delay between attempts in milliseconds";

        fn parse(value: &str) -> EnvResult<Duration> {
            parse_millis(value, Self::NAME, 0, 60_000)
        }
    }
}

/// 宽限期配置
pub mod grace {
    use super::*;

    /// 首次加载时的宽限期
    pub struct Initial;
    impl EnvVar<Duration> for Initial {
        const NAME: &'static str = "CHATLINGO_GRACE_INITIAL_MS";
        const DEFAULT: Option<Duration> = Some(Duration::from_millis(8000));
        const DESCRIPTION: &'static str = "Suppression window after initial load in milliseconds";

        fn parse(value: &str) -> EnvResult<Duration> {
            parse_millis(value, Self::NAME, 0, 120_000)
        }
    }

    /// 页面导航后的宽限期
    pub struct Navigation;
    impl EnvVar<Duration> for Navigation {
        const NAME: &'static str = "CHATLINGO_GRACE_NAVIGATION_MS";
        const DEFAULT: Option<Duration> = Some(Duration::from_millis(5000));
        const DESCRIPTION: &'static str = "Suppression window after navigation in milliseconds";

        fn parse(value: &str) -> EnvResult<Duration> {
            parse_millis(value, Self::NAME, 0, 120_000)
        }
    }
}

/// 聊天容器发现
pub mod discovery {
    use super::*;

    /// 轮询间隔
    pub struct Interval;
    impl EnvVar<Duration> for Interval {
        const NAME: &'static str = "CHATLINGO_DISCOVERY_INTERVAL_MS";
        const DEFAULT: Option<Duration> = Some(Duration::from_millis(1000));
        const DESCRIPTION: &'static str = "Chat container polling interval in milliseconds";

        fn parse(value: &str) -> EnvResult<Duration> {
            parse_millis(value, Self::NAME, 1, 60_000)
        }
    }

    /// 最大轮询次数
    pub struct MaxAttempts;
    impl EnvVar<usize> for MaxAttempts {
        const NAME: &'static str = "CHATLINGO_DISCOVERY_MAX_ATTEMPTS";
        const DEFAULT: Option<usize> = Some(30);
        const DESCRIPTION: &'static str = "Maximum container polling attempts";

        fn parse(value: &str) -> EnvResult<usize> {
            parse_positive_usize(value, Self::NAME, 1, 10_000)
        }
    }
}

/// Gemini 接口配置
pub mod gemini {
    use super::*;

    /// API 基础地址
    pub struct ApiUrl;
    impl EnvVar<String> for ApiUrl {
        const NAME: &'static str = "CHATLINGO_GEMINI_API_URL";
        const DEFAULT: Option<String> = None;

        fn get() -> EnvResult<String> {
            match env::var(Self::NAME) {
                Ok(value) => Self::parse(&value),
                Err(_) => Ok("https://generativelanguage.googleapis.com/v1beta".to_string()),
            }
        }
        const DESCRIPTION: &'static str = "Generative language API base URL";

        fn parse(value: &str) -> EnvResult<String> {
            let url = value.trim().trim_end_matches('/');
            if url.starts_with("http://") || url.starts_with("https://") {
                Ok(url.to_string())
            } else {
                Err(EnvError {
                    variable: Self::NAME.to_string(),
                    message: "API URL must start with http:// or https://".to_string(),
                })
            }
        }
    }

    /// 模型名称
    pub struct Model;
    impl EnvVar<String> for Model {
        const NAME: &'static str = "CHATLINGO_GEMINI_MODEL";
        const DEFAULT: Option<String> = None;

        fn get() -> EnvResult<String> {
            match env::var(Self::NAME) {
                Ok(value) => Self::parse(&value),
                Err(_) => Ok("gemini-2.0-flash-lite".to_string()),
            }
        }
        const DESCRIPTION: &'static str = "Model used for translation";

        fn parse(value: &str) -> EnvResult<String> {
            let model = value.trim();
            if model.is_empty() || model.contains('/') {
                return Err(EnvError {
                    variable: Self::NAME.to_string(),
                    message: "Model name must be non-empty and contain no '/'".to_string(),
                });
            }
            Ok(model.to_string())
        }
    }

    /// API 密钥
    pub struct ApiKey;
    impl EnvVar<String> for ApiKey {
        const NAME: &'static str = "CHATLINGO_GEMINI_API_KEY";
        const DEFAULT: Option<String> = None;
        const DESCRIPTION: &'static str = "API key used by the command-line replay";

        fn parse(value: &str) -> EnvResult<String> {
            let key = value.trim();
            if key.len() < 16 {
                return Err(EnvError {
                    variable: Self::NAME.to_string(),
                    message: "API key too short (minimum 16 characters)".to_string(),
                });
            }
            Ok(key.to_string())
        }
    }
}

fn parse_bool(value: &str, var_name: &str) -> EnvResult<bool> {
    match value.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" | "enabled" => Ok(true),
        "false" | "0" | "no" | "off" | "disabled" => Ok(false),
        _ => Err(EnvError {
            variable: var_name.to_string(),
            message: format!(
                "Invalid boolean value '{}'. Use: true/false, 1/0, yes/no, on/off, enabled/disabled",
                value
            ),
        }),
    }
}

fn parse_positive_usize(value: &str, var_name: &str, min: usize, max: usize) -> EnvResult<usize> {
    let num: usize = value.trim().parse().map_err(|_| EnvError {
        variable: var_name.to_string(),
        message: "Must be a valid positive number".to_string(),
    })?;

    if num < min {
        return Err(EnvError {
            variable: var_name.to_string(),
            message: format!("Value {} is below minimum {}", num, min),
        });
    }

    if num > max {
        return Err(EnvError {
            variable: var_name.to_string(),
            message: format!("Value {} exceeds maximum {}", num, max),
        });
    }

    Ok(num)
}

fn parse_millis(value: &str, var_name: &str, min: u64, max: u64) -> EnvResult<Duration> {
    let millis: u64 = value.trim().parse().map_err(|_| EnvError {
        variable: var_name.to_string(),
        message: "Must be a valid number of milliseconds".to_string(),
    })?;

    if millis < min || millis > max {
        return Err(EnvError {
            variable: var_name.to_string(),
            message: format!("Value {}ms outside allowed range {}..={}", millis, min, max),
        });
    }

    Ok(Duration::from_millis(millis))
}

/// 环境变量文档生成器
pub fn generate_env_docs() -> String {
    let mut docs = String::new();
    docs.push_str("# Environment Variables Documentation\n\n");

    docs.push_str("## Core Configuration\n\n");
    docs.push_str(&format!("- `{}`: {} (default: \"info\")\n",
        core::LogLevel::NAME, core::LogLevel::DESCRIPTION));

    docs.push_str("\n## Cache Configuration\n\n");
    docs.push_str(&format!("- `{}`: {} (default: {:?})\n",
        cache::Enabled::NAME, cache::Enabled::DESCRIPTION, cache::Enabled::DEFAULT));
    docs.push_str(&format!("- `{}`: {} (default: {:?})\n",
        cache::MaxSize::NAME, cache::MaxSize::DESCRIPTION, cache::MaxSize::DEFAULT));
    docs.push_str(&format!("- `{}`: {} (default: {:?})\n",
        cache::Expiration::NAME, cache::Expiration::DESCRIPTION, cache::Expiration::DEFAULT));

    docs.push_str("\n## Channel Configuration\n\n");
    docs.push_str(&format!("- `{}`: {} (default: {:?})\n",
        channel::Timeout::NAME, channel::Timeout::DESCRIPTION, channel::Timeout::DEFAULT));
    docs.push_str(&format!("- `{}`: {} (default: {:?})\n",
        channel::MaxRetries::NAME, channel::MaxRetries::DESCRIPTION, channel::MaxRetries::DEFAULT));
    docs.push_str(&format!("- `{}`: {} (default: {:?})\n",
        channel::RetryDelay::NAME, channel::RetryDelay::DESCRIPTION, channel::RetryDelay::DEFAULT));

    docs.push_str("\n## Grace Period\n\n");
    docs.push_str(&format!("- `{}`: {} (default: {:?})\n",
        grace::Initial::NAME, grace::Initial::DESCRIPTION, grace::Initial::DEFAULT));
    docs.push_str(&format!("- `{}`: {} (default: {:?})\n",
        grace::Navigation::NAME, grace::Navigation::DESCRIPTION, grace::Navigation::DEFAULT));

    docs.push_str("\n## Container Discovery\n\n");
    docs.push_str(&format!("- `{}`: {} (default: {:?})\n",
        discovery::Interval::NAME, discovery::Interval::DESCRIPTION, discovery::Interval::DEFAULT));
    docs.push_str(&format!("- `{}`: {} (default: {:?})\n",
        discovery::MaxAttempts::NAME,
        discovery::MaxAttempts::DESCRIPTION,
        discovery::MaxAttempts::DEFAULT));

    docs.push_str("\n## Gemini\n\n");
    docs.push_str(&format!("- `{}`: {}\n", gemini::ApiUrl::NAME, gemini::ApiUrl::DESCRIPTION));
    docs.push_str(&format!("- `{}`: {}\n", gemini::Model::NAME, gemini::Model::DESCRIPTION));
    docs.push_str(&format!("- `{}`: {}\n", gemini::ApiKey::NAME, gemini::ApiKey::DESCRIPTION));

    docs
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_boolean_parsing() {
        assert!(cache::Enabled::parse("true").unwrap());
        assert!(cache::Enabled::parse("YES").unwrap());
        assert!(!cache::Enabled::parse("off").unwrap());

        assert!(cache::Enabled::parse("maybe").is_err());
    }

    #[test]
    fn test_millis_validation() {
        assert_eq!(channel::Timeout::parse("2500").unwrap(), Duration::from_millis(2500));
        assert_eq!(channel::RetryDelay::parse("0").unwrap(), Duration::ZERO);

        // 超出范围
        assert!(channel::Timeout::parse("0").is_err());
        assert!(channel::Timeout::parse("abc").is_err());
    }

    #[test]
    fn test_numeric_validation() {
        assert_eq!(cache::MaxSize::parse("50").unwrap(), 50);
        assert!(cache::MaxSize::parse("0").is_err());
        assert_eq!(channel::MaxRetries::parse("0").unwrap(), 0);
        assert!(channel::MaxRetries::parse("100").is_err());
    }

    #[test]
    fn test_url_validation() {
        assert_eq!(
            gemini::ApiUrl::parse("https://example.com/v1beta/").unwrap(),
            "https://example.com/v1beta"
        );
        assert!(gemini::ApiUrl::parse("ftp://example.com").is_err());
        assert!(gemini::Model::parse("models/x").is_err());
    }

    #[test]
    fn test_env_docs_list_every_section() {
        let docs = generate_env_docs();
        assert!(docs.contains("CHATLINGO_CHANNEL_TIMEOUT_MS"));
        assert!(docs.contains("CHATLINGO_GRACE_INITIAL_MS"));
        assert!(docs.contains("CHATLINGO_DISCOVERY_MAX_ATTEMPTS"));
    }
}
