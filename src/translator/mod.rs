//! 远程翻译服务接口
//!
//! 核心只依赖 [`RemoteTranslator`]，具体服务商在子模块中实现

#[cfg(feature = "gemini")]
pub mod gemini;

use std::fmt;

use async_trait::async_trait;

use crate::error::ChatlingoError;
use crate::secret::SecretHandle;

#[cfg(feature = "gemini")]
pub use gemini::GeminiTranslator;

/// 远程失败类别，调用方据此选择提示文本
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    InvalidInput,
    InvalidCredential,
    RateLimited,
    MalformedResponse,
    Upstream,
    Transport,
}

/// 远程翻译失败
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFailure {
    pub kind: FailureKind,
    pub message: String,
    pub http_status: Option<u16>,
}

impl RemoteFailure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            http_status: None,
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.http_status = Some(status);
        self
    }
}

impl fmt::Display for RemoteFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.http_status {
            Some(status) => write!(f, "{} (HTTP {})", self.message, status),
            None => f.write_str(&self.message),
        }
    }
}

impl From<RemoteFailure> for ChatlingoError {
    fn from(failure: RemoteFailure) -> Self {
        let message = failure.to_string();
        match failure.kind {
            FailureKind::InvalidInput => ChatlingoError::InvalidInput(message),
            FailureKind::InvalidCredential => ChatlingoError::InvalidCredential(message),
            FailureKind::RateLimited => ChatlingoError::RateLimited,
            FailureKind::MalformedResponse => ChatlingoError::MalformedResponse(message),
            FailureKind::Upstream => ChatlingoError::Upstream(message),
            // 远程调用的网络失败属于上游错误，不由通道层重试
            FailureKind::Transport => ChatlingoError::Upstream(message),
        }
    }
}

/// 远程翻译器
#[async_trait(?Send)]
pub trait RemoteTranslator {
    /// 翻译一段文本；密钥只在本次调用期间可见
    async fn translate(&self, text: &str, secret: &SecretHandle) -> Result<String, RemoteFailure>;

    fn name(&self) -> &str;
}

/// 不访问网络的翻译器，原文加前缀返回
///
/// 命令行 `--dry-run` 使用，便于检查流水线行为
pub struct DryRunTranslator {
    marker: String,
}

impl DryRunTranslator {
    pub fn new(marker: impl Into<String>) -> Self {
        Self {
            marker: marker.into(),
        }
    }
}

impl Default for DryRunTranslator {
    fn default() -> Self {
        Self::new("[dry-run]")
    }
}

#[async_trait(?Send)]
impl RemoteTranslator for DryRunTranslator {
    async fn translate(&self, text: &str, _secret: &SecretHandle) -> Result<String, RemoteFailure> {
        Ok(format!("{} {}", self.marker, text))
    }

    fn name(&self) -> &str {
        "dry-run"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_maps_to_distinct_errors() {
        let credential: ChatlingoError =
            RemoteFailure::new(FailureKind::InvalidCredential, "bad key").with_status(400).into();
        assert!(matches!(
            credential,
            ChatlingoError::InvalidCredential(ref m) if m.contains("HTTP 400")
        ));

        let limited: ChatlingoError = RemoteFailure::new(FailureKind::RateLimited, "quota").into();
        assert_eq!(limited, ChatlingoError::RateLimited);

        let malformed: ChatlingoError =
            RemoteFailure::new(FailureKind::MalformedResponse, "no candidates").into();
        assert!(matches!(malformed, ChatlingoError::MalformedResponse(_)));
    }

    #[tokio::test]
    async fn test_dry_run_translator() {
        let translator = DryRunTranslator::default();
        let secret = SecretHandle::new(String::new());
        assert_eq!(translator.translate("hello", &secret).await.unwrap(), "[dry-run] hello");
    }
}
