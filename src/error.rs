//! 统一错误处理
//!
//! 提供结构化错误类型，覆盖输入、策略、通道、上游服务四类失败

use std::fmt;

use thiserror::Error;

/// 翻译核心错误类型
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ChatlingoError {
    /// 输入验证错误（缺少文本或消息ID）
    #[error("输入无效: {0}")]
    InvalidInput(String),

    /// 扩展未启用
    #[error("扩展未启用")]
    ExtensionDisabled,

    /// 未设置API密钥
    #[error("未设置API密钥")]
    MissingCredential,

    /// 通道超时（每次尝试均超时）
    #[error("通信超时: {0}")]
    Timeout(String),

    /// 一般通道传输错误
    #[error("通信错误: {0}")]
    Transport(String),

    /// 宿主通道已断开，需要重新加载
    #[error("通道已断开: {0}")]
    Disconnected(String),

    /// 上游拒绝了凭据
    #[error("API密钥无效: {0}")]
    InvalidCredential(String),

    /// 上游速率限制
    #[error("请求速率过快，已达到限制")]
    RateLimited,

    /// 上游响应格式异常
    #[error("响应格式异常: {0}")]
    MalformedResponse(String),

    /// 其他上游错误
    #[error("上游服务错误: {0}")]
    Upstream(String),

    /// 配置错误
    #[error("配置错误: {0}")]
    Config(String),

    /// 序列化错误
    #[error("序列化错误: {0}")]
    Serialization(String),

    /// 内部错误
    #[error("内部错误: {0}")]
    Internal(String),
}

impl ChatlingoError {
    /// 检查错误是否可由通道层重试
    ///
    /// 只有超时和一般传输错误会重试；断开的通道和上游错误都不会自行恢复
    pub fn is_retryable(&self) -> bool {
        match self {
            ChatlingoError::Timeout(_) => true,
            ChatlingoError::Transport(_) => true,
            ChatlingoError::Disconnected(_) => false,
            ChatlingoError::InvalidInput(_) => false,
            ChatlingoError::ExtensionDisabled => false,
            ChatlingoError::MissingCredential => false,
            ChatlingoError::InvalidCredential(_) => false,
            ChatlingoError::RateLimited => false,
            ChatlingoError::MalformedResponse(_) => false,
            ChatlingoError::Upstream(_) => false,
            ChatlingoError::Config(_) => false,
            ChatlingoError::Serialization(_) => false,
            ChatlingoError::Internal(_) => false,
        }
    }

    /// 获取错误的严重程度
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            ChatlingoError::InvalidInput(_) => ErrorSeverity::Info,
            ChatlingoError::ExtensionDisabled => ErrorSeverity::Info,
            ChatlingoError::MissingCredential => ErrorSeverity::Warning,
            ChatlingoError::Timeout(_) => ErrorSeverity::Warning,
            ChatlingoError::Transport(_) => ErrorSeverity::Warning,
            ChatlingoError::Disconnected(_) => ErrorSeverity::Critical,
            ChatlingoError::InvalidCredential(_) => ErrorSeverity::Error,
            ChatlingoError::RateLimited => ErrorSeverity::Warning,
            ChatlingoError::MalformedResponse(_) => ErrorSeverity::Error,
            ChatlingoError::Upstream(_) => ErrorSeverity::Error,
            ChatlingoError::Config(_) => ErrorSeverity::Critical,
            ChatlingoError::Serialization(_) => ErrorSeverity::Error,
            ChatlingoError::Internal(_) => ErrorSeverity::Critical,
        }
    }

    /// 获取错误类别
    pub fn category(&self) -> ErrorCategory {
        match self {
            ChatlingoError::InvalidInput(_) => ErrorCategory::Input,
            ChatlingoError::ExtensionDisabled | ChatlingoError::MissingCredential => {
                ErrorCategory::Policy
            }
            ChatlingoError::Timeout(_) | ChatlingoError::Transport(_) => ErrorCategory::Transient,
            ChatlingoError::Disconnected(_) => ErrorCategory::Fatal,
            ChatlingoError::InvalidCredential(_)
            | ChatlingoError::RateLimited
            | ChatlingoError::MalformedResponse(_)
            | ChatlingoError::Upstream(_) => ErrorCategory::Upstream,
            ChatlingoError::Config(_) => ErrorCategory::Configuration,
            ChatlingoError::Serialization(_) => ErrorCategory::Serialization,
            ChatlingoError::Internal(_) => ErrorCategory::Internal,
        }
    }

    /// 面向用户的提示文本
    pub fn user_message(&self) -> &'static str {
        match self {
            ChatlingoError::Disconnected(_) => notices::RELOAD_REQUIRED,
            ChatlingoError::Timeout(_) => notices::TIMEOUT,
            ChatlingoError::MissingCredential => notices::CREDENTIAL_REQUIRED,
            ChatlingoError::InvalidCredential(_) => notices::INVALID_CREDENTIAL,
            ChatlingoError::RateLimited => notices::RATE_LIMITED,
            ChatlingoError::ExtensionDisabled => notices::EXTENSION_DISABLED,
            ChatlingoError::Transport(_) => notices::CHANNEL_FAILED,
            _ => notices::GENERIC,
        }
    }

    /// 创建带上下文的错误
    pub fn with_context<T: fmt::Display>(mut self, context: T) -> Self {
        let new_msg = format!("{} (上下文: {})", self, context);

        match &mut self {
            ChatlingoError::InvalidInput(ref mut msg)
            | ChatlingoError::Timeout(ref mut msg)
            | ChatlingoError::Transport(ref mut msg)
            | ChatlingoError::Disconnected(ref mut msg)
            | ChatlingoError::InvalidCredential(ref mut msg)
            | ChatlingoError::MalformedResponse(ref mut msg)
            | ChatlingoError::Upstream(ref mut msg)
            | ChatlingoError::Config(ref mut msg)
            | ChatlingoError::Serialization(ref mut msg)
            | ChatlingoError::Internal(ref mut msg) => *msg = new_msg,
            ChatlingoError::ExtensionDisabled
            | ChatlingoError::MissingCredential
            | ChatlingoError::RateLimited => {}
        }

        self
    }
}

/// 用户提示文本
pub mod notices {
    pub const RELOAD_REQUIRED: &str =
        "拡張機能のコンテキストが無効になりました。ページを再読み込みしてください。";
    pub const CHANNEL_FAILED: &str =
        "バックグラウンドとの通信に失敗しました。拡張機能を再読み込みしてください。";
    pub const TIMEOUT: &str = "翻訳リクエストがタイムアウトしました。再試行してください。";
    pub const CREDENTIAL_REQUIRED: &str =
        "APIキーが設定されていないか無効です。設定を確認してください。";
    pub const INVALID_CREDENTIAL: &str =
        "APIキーが無効です。オプションページで有効なAPIキーを設定してください。";
    pub const RATE_LIMITED: &str =
        "APIリクエスト制限に達しました。しばらく待ってから再試行してください。";
    pub const EXTENSION_DISABLED: &str = "翻訳機能が無効になっています。";
    pub const GENERIC: &str = "翻訳処理中にエラーが発生しました。";
}

/// 错误严重程度
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ErrorSeverity {
    Info,
    Warning,
    Error,
    Critical,
}

/// 错误类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    Input,
    Policy,
    Transient,
    Fatal,
    Upstream,
    Configuration,
    Serialization,
    Internal,
}

/// 标准错误转换
impl From<std::io::Error> for ChatlingoError {
    fn from(error: std::io::Error) -> Self {
        ChatlingoError::Internal(format!("IO错误: {}", error))
    }
}

impl From<serde_json::Error> for ChatlingoError {
    fn from(error: serde_json::Error) -> Self {
        ChatlingoError::Serialization(format!("JSON序列化错误: {}", error))
    }
}

impl From<toml::de::Error> for ChatlingoError {
    fn from(error: toml::de::Error) -> Self {
        ChatlingoError::Config(format!("TOML解析错误: {}", error))
    }
}

impl From<tokio::time::error::Elapsed> for ChatlingoError {
    fn from(error: tokio::time::error::Elapsed) -> Self {
        ChatlingoError::Timeout(format!("异步操作超时: {}", error))
    }
}

impl From<crate::env::EnvError> for ChatlingoError {
    fn from(error: crate::env::EnvError) -> Self {
        ChatlingoError::Config(error.to_string())
    }
}

/// 错误结果类型别名
pub type ChatlingoResult<T> = Result<T, ChatlingoError>;

/// 错误统计信息
#[derive(Debug, Clone, Default)]
pub struct ErrorStats {
    pub total_errors: usize,
    pub by_category: std::collections::HashMap<ErrorCategory, usize>,
    pub by_severity: std::collections::HashMap<ErrorSeverity, usize>,
    pub retryable_errors: usize,
    pub critical_errors: usize,
}

impl ErrorStats {
    /// 记录错误
    pub fn record_error(&mut self, error: &ChatlingoError) {
        self.total_errors += 1;

        let category = error.category();
        *self.by_category.entry(category).or_insert(0) += 1;

        let severity = error.severity();
        *self.by_severity.entry(severity).or_insert(0) += 1;

        if error.is_retryable() {
            self.retryable_errors += 1;
        }

        if severity == ErrorSeverity::Critical {
            self.critical_errors += 1;
        }
    }

    /// 重置统计
    pub fn reset(&mut self) {
        *self = Default::default();
    }
}

/// 错误处理助手函数
pub mod helpers {
    use super::*;

    /// 记录并返回错误
    pub fn log_error<T>(error: ChatlingoError) -> ChatlingoResult<T> {
        match error.severity() {
            ErrorSeverity::Info => tracing::info!("翻译信息: {}", error),
            ErrorSeverity::Warning => tracing::warn!("翻译警告: {}", error),
            ErrorSeverity::Error => tracing::error!("翻译错误: {}", error),
            ErrorSeverity::Critical => tracing::error!("翻译严重错误: {}", error),
        }

        Err(error)
    }

    /// 创建配置错误
    pub fn config_error<T: fmt::Display>(msg: T) -> ChatlingoError {
        ChatlingoError::Config(msg.to_string())
    }

    /// 创建输入验证错误
    pub fn validation_error<T: fmt::Display>(msg: T) -> ChatlingoError {
        ChatlingoError::InvalidInput(msg.to_string())
    }

    /// 创建内部错误
    pub fn internal_error<T: fmt::Display>(msg: T) -> ChatlingoError {
        ChatlingoError::Internal(msg.to_string())
    }
}
