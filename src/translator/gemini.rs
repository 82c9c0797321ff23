//! Gemini 翻译客户端

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use super::{FailureKind, RemoteFailure, RemoteTranslator};
use crate::config::GeminiConfig;
use crate::error::{ChatlingoError, ChatlingoResult};
use crate::secret::SecretHandle;

const TRANSLATION_PROMPT: &str = r#"
あなたは翻訳のプロフェッショナルです。以下のテキストを日本語に翻訳してください：
入力言語は自動的に検出します。翻訳は自然で流暢な日本語にしてください。
テキストにはインターネットスラングやミームが含まれている可能性があり、
これらは日本語の等価な表現に変換してください。

ただし、翻訳結果は翻訳テキストのみを返してください。余分な説明や注釈は不要です。

テキスト: "{{text}}"
"#;

const SAFETY_CATEGORIES: &[&str] = &[
    "HARM_CATEGORY_HARASSMENT",
    "HARM_CATEGORY_HATE_SPEECH",
    "HARM_CATEGORY_SEXUALLY_EXPLICIT",
    "HARM_CATEGORY_DANGEROUS_CONTENT",
];

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
    safety_settings: Vec<SafetySetting>,
}

#[derive(Debug, Serialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
struct Part {
    text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    top_p: f32,
    top_k: u32,
    max_output_tokens: u32,
}

#[derive(Debug, Serialize)]
struct SafetySetting {
    category: &'static str,
    threshold: &'static str,
}

/// 填充翻译提示模板
pub fn build_prompt(text: &str) -> String {
    TRANSLATION_PROMPT.replacen("{{text}}", text, 1)
}

fn build_request(config: &GeminiConfig, text: &str) -> GenerateRequest {
    GenerateRequest {
        contents: vec![Content {
            parts: vec![Part {
                text: build_prompt(text),
            }],
        }],
        generation_config: GenerationConfig {
            temperature: config.temperature,
            top_p: config.top_p,
            top_k: config.top_k,
            max_output_tokens: config.max_output_tokens,
        },
        safety_settings: SAFETY_CATEGORIES
            .iter()
            .map(|&category| SafetySetting {
                category,
                threshold: "BLOCK_NONE",
            })
            .collect(),
    }
}

/// 把非 2xx 响应映射为失败类别
pub fn classify_failure(status: u16, body: &str) -> RemoteFailure {
    let message = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|value| {
            value
                .pointer("/error/message")
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .unwrap_or_default();

    if status == 400 && (message.contains("API key") || message.contains("Invalid value")) {
        return RemoteFailure::new(
            FailureKind::InvalidCredential,
            "APIキーが無効です。オプションページで有効なAPIキーを設定してください。",
        )
        .with_status(status);
    }

    if status == 429 {
        return RemoteFailure::new(
            FailureKind::RateLimited,
            "APIリクエスト制限に達しました。しばらく待ってから再試行してください。",
        )
        .with_status(status);
    }

    let detail = if message.is_empty() { "unknown error".to_string() } else { message };
    RemoteFailure::new(FailureKind::Upstream, format!("API エラー: {} {}", status, detail))
        .with_status(status)
}

/// 从响应中取出 `candidates[0].content.parts[0].text`
pub fn parse_candidate_text(body: &Value) -> Result<String, RemoteFailure> {
    body.pointer("/candidates/0/content/parts/0/text")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(str::to_string)
        .ok_or_else(|| {
            tracing::error!("Gemini 响应格式异常: {}", body);
            RemoteFailure::new(FailureKind::MalformedResponse, "予期しないAPIレスポンス形式")
        })
}

/// Gemini 翻译器
pub struct GeminiTranslator {
    client: reqwest::Client,
    config: GeminiConfig,
}

impl GeminiTranslator {
    pub fn new(config: GeminiConfig) -> ChatlingoResult<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| ChatlingoError::Config(format!("创建HTTP客户端失败: {}", e)))?;

        Ok(Self { client, config })
    }

    /// 用一条简单文本验证密钥是否可用
    pub async fn test_api_key(&self, secret: &SecretHandle) -> Result<(), RemoteFailure> {
        if secret.expose().is_empty() {
            return Err(RemoteFailure::new(FailureKind::InvalidCredential, "APIキーが指定されていません"));
        }
        self.translate("Hello world", secret).await.map(|_| ())
    }
}

#[async_trait(?Send)]
impl RemoteTranslator for GeminiTranslator {
    async fn translate(&self, text: &str, secret: &SecretHandle) -> Result<String, RemoteFailure> {
        if text.trim().chars().count() < 2 {
            return Err(RemoteFailure::new(FailureKind::InvalidInput, "テキストが短すぎます"));
        }

        let request = build_request(&self.config, text);
        let response = self
            .client
            .post(self.config.endpoint())
            .query(&[("key", secret.expose())])
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                // 错误信息可能包含带密钥的 URL
                RemoteFailure::new(FailureKind::Transport, format!("リクエストエラー: {}", e.without_url()))
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!("Gemini 接口返回错误: {}", status);
            return Err(classify_failure(status.as_u16(), &body));
        }

        let body: Value = response.json().await.map_err(|e| {
            RemoteFailure::new(
                FailureKind::MalformedResponse,
                format!("予期しないAPIレスポンス形式: {}", e.without_url()),
            )
        })?;

        parse_candidate_text(&body)
    }

    fn name(&self) -> &str {
        "gemini"
    }
}
