//! 翻译资格过滤器
//!
//! 判断消息是否值得翻译（[`is_translatable`]）以及当前模式下是否应该翻译（[`should_translate`]）。
//! 两者同时为真时消息才会被发送翻译。

use std::sync::OnceLock;

use regex::Regex;

use super::language::{classify, LanguageClass};
use crate::config::constants;
use crate::settings::{TranslationMode, TranslationSettings};

/// 翻译判定条件
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Criteria {
    pub mode: TranslationMode,
    pub target_language: String,
    pub source_languages: Vec<String>,
}

impl Criteria {
    pub fn new(mode: TranslationMode) -> Self {
        Self {
            mode,
            target_language: "ja".to_string(),
            source_languages: Vec::new(),
        }
    }
}

impl From<&TranslationSettings> for Criteria {
    fn from(settings: &TranslationSettings) -> Self {
        Self {
            mode: settings.mode,
            target_language: settings.target_language.clone(),
            source_languages: settings.source_languages.clone(),
        }
    }
}

fn emoji_pattern() -> Option<&'static Regex> {
    static EMOJI: OnceLock<Option<Regex>> = OnceLock::new();
    EMOJI
        .get_or_init(|| {
            // 连接符、变体选择符和键帽组合符本身不可见，一并去除
            Regex::new(
                r"[\p{Emoji_Presentation}\p{Extended_Pictographic}\x{200D}\x{FE0E}\x{FE0F}\x{20E3}]",
            )
            .ok()
        })
        .as_ref()
}

fn url_pattern() -> Option<&'static Regex> {
    static URL: OnceLock<Option<Regex>> = OnceLock::new();
    URL.get_or_init(|| Regex::new(r"https?://\S+").ok()).as_ref()
}

/// 去除所有表情符号
pub fn strip_emoji(text: &str) -> String {
    match emoji_pattern() {
        Some(pattern) => pattern.replace_all(text, "").into_owned(),
        None => text.to_string(),
    }
}

/// 去除所有 URL
pub fn strip_urls(text: &str) -> String {
    match url_pattern() {
        Some(pattern) => pattern.replace_all(text, "").into_owned(),
        None => text.to_string(),
    }
}

/// 判断文本是否值得翻译
///
/// - 少于 2 个字符的文本不翻译
/// - 去掉表情后为空的文本不翻译
/// - 去掉 URL 后剩余不足原长度 30% 的文本不翻译
pub fn is_translatable(text: &str) -> bool {
    let length = text.chars().count();
    if length < constants::MIN_TEXT_LENGTH {
        return false;
    }

    if strip_emoji(text).trim().is_empty() {
        return false;
    }

    let remaining = strip_urls(text).trim().chars().count();
    (remaining as f64) >= (length as f64) * constants::MIN_NON_URL_RATIO
}

/// 判断在给定条件下是否应该翻译
pub fn should_translate(text: &str, criteria: &Criteria) -> bool {
    let class = classify(text);

    match criteria.mode {
        TranslationMode::All => true,
        TranslationMode::NonNative => class != LanguageClass::Native,
        TranslationMode::SelectedLanguages => {
            if criteria.source_languages.is_empty() {
                class.tag() != criteria.target_language
            } else {
                criteria.source_languages.iter().any(|lang| lang == class.tag())
            }
        }
        TranslationMode::Custom => class.tag() != criteria.target_language,
        TranslationMode::Unknown => false,
    }
}

/// 两个判断同时成立时才发送翻译
pub fn is_eligible(text: &str, criteria: &Criteria) -> bool {
    is_translatable(text) && should_translate(text, criteria)
}
