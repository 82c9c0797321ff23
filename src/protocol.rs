//! 内容侧与后台侧之间的消息协议
//!
//! 每种请求都有唯一对应的响应；错误报告不需要响应

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ChatlingoError;
use crate::settings::{ExtensionState, TranslationMode, TranslationSettings};

/// 翻译请求载荷
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranslationRequest {
    pub text: String,
    pub message_id: String,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

/// 翻译响应载荷
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranslationResponse {
    pub success: bool,
    pub message_id: Option<String>,
    pub original_text: Option<String>,
    pub translated_text: Option<String>,
    pub from_cache: bool,
    pub error: Option<String>,
    #[serde(default)]
    pub error_code: Option<ErrorCode>,
}

/// 失败响应携带的错误类别，内容侧据此还原类型化错误
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    InvalidInput,
    ExtensionDisabled,
    MissingCredential,
    InvalidCredential,
    RateLimited,
    MalformedResponse,
    Upstream,
    Internal,
}

impl ErrorCode {
    pub fn of(error: &ChatlingoError) -> Self {
        match error {
            ChatlingoError::InvalidInput(_) => ErrorCode::InvalidInput,
            ChatlingoError::ExtensionDisabled => ErrorCode::ExtensionDisabled,
            ChatlingoError::MissingCredential => ErrorCode::MissingCredential,
            ChatlingoError::InvalidCredential(_) => ErrorCode::InvalidCredential,
            ChatlingoError::RateLimited => ErrorCode::RateLimited,
            ChatlingoError::MalformedResponse(_) => ErrorCode::MalformedResponse,
            ChatlingoError::Upstream(_) => ErrorCode::Upstream,
            _ => ErrorCode::Internal,
        }
    }

    /// 还原为错误值
    pub fn into_error(self, message: String) -> ChatlingoError {
        match self {
            ErrorCode::InvalidInput => ChatlingoError::InvalidInput(message),
            ErrorCode::ExtensionDisabled => ChatlingoError::ExtensionDisabled,
            ErrorCode::MissingCredential => ChatlingoError::MissingCredential,
            ErrorCode::InvalidCredential => ChatlingoError::InvalidCredential(message),
            ErrorCode::RateLimited => ChatlingoError::RateLimited,
            ErrorCode::MalformedResponse => ChatlingoError::MalformedResponse(message),
            ErrorCode::Upstream => ChatlingoError::Upstream(message),
            ErrorCode::Internal => ChatlingoError::Internal(message),
        }
    }
}

impl TranslationResponse {
    pub fn success(
        request: &TranslationRequest,
        translated_text: String,
        from_cache: bool,
    ) -> Self {
        Self {
            success: true,
            message_id: Some(request.message_id.clone()),
            original_text: Some(request.text.clone()),
            translated_text: Some(translated_text),
            from_cache,
            error: None,
            error_code: None,
        }
    }

    pub fn failure(
        message_id: Option<String>,
        original_text: Option<String>,
        error: &ChatlingoError,
    ) -> Self {
        Self {
            success: false,
            message_id,
            original_text,
            translated_text: None,
            from_cache: false,
            error: Some(error.to_string()),
            error_code: Some(ErrorCode::of(error)),
        }
    }

    /// 把响应转换为结果；旧格式的失败响应没有类别时按上游错误处理
    pub fn into_result(self) -> Result<TranslatedText, ChatlingoError> {
        match (self.success, self.translated_text) {
            (true, Some(text)) => Ok(TranslatedText {
                text,
                from_cache: self.from_cache,
            }),
            (true, None) => Err(ChatlingoError::MalformedResponse("成功响应缺少译文".to_string())),
            (false, _) => {
                let message = self.error.unwrap_or_default();
                Err(self
                    .error_code
                    .unwrap_or(ErrorCode::Upstream)
                    .into_error(message))
            }
        }
    }
}

/// 成功的翻译结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranslatedText {
    pub text: String,
    pub from_cache: bool,
}

/// 状态响应载荷
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    pub state: ExtensionState,
    pub has_api_key: bool,
    pub translation_mode: TranslationMode,
    pub cache_size: usize,
    pub cache_enabled: bool,
}

/// 错误报告载荷
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorReport {
    pub message: String,
    pub context: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub url: Option<String>,
}

/// 发往后台的请求
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum Request {
    TranslationRequest(TranslationRequest),
    SettingsChange(TranslationSettings),
    ExtensionStateChange { state: ExtensionState },
    /// `None` 表示删除密钥
    ApiKeyChange { api_key: Option<String> },
    StatusRequest,
    ErrorReport(ErrorReport),
}

impl Request {
    /// 是否期待响应
    pub fn expects_response(&self) -> bool {
        !matches!(self, Request::ErrorReport(_))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Request::TranslationRequest(_) => "translation_request",
            Request::SettingsChange(_) => "settings_change",
            Request::ExtensionStateChange { .. } => "extension_state_change",
            Request::ApiKeyChange { .. } => "api_key_change",
            Request::StatusRequest => "status_request",
            Request::ErrorReport(_) => "error_report",
        }
    }
}

/// 设置类请求的确认
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ack {
    pub success: bool,
    #[serde(default)]
    pub error: Option<String>,
}

impl Ack {
    pub fn ok() -> Self {
        Self {
            success: true,
            error: None,
        }
    }

    pub fn failed(error: &ChatlingoError) -> Self {
        Self {
            success: false,
            error: Some(error.to_string()),
        }
    }
}

impl From<Result<(), ChatlingoError>> for Ack {
    fn from(result: Result<(), ChatlingoError>) -> Self {
        match result {
            Ok(()) => Ack::ok(),
            Err(e) => Ack::failed(&e),
        }
    }
}

/// 后台返回的响应
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum Response {
    TranslationResponse(TranslationResponse),
    SettingsChangeAck(Ack),
    ExtensionStateChangeAck(Ack),
    ApiKeyChangeAck(Ack),
    StatusResponse(StatusReport),
}

impl Response {
    pub fn kind(&self) -> &'static str {
        match self {
            Response::TranslationResponse(_) => "translation_response",
            Response::SettingsChangeAck(_) => "settings_change_ack",
            Response::ExtensionStateChangeAck(_) => "extension_state_change_ack",
            Response::ApiKeyChangeAck(_) => "api_key_change_ack",
            Response::StatusResponse(_) => "status_response",
        }
    }
}
