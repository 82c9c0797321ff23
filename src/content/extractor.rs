//! 聊天消息提取
//!
//! 判断节点是否为聊天消息只看节点结构（class、属性、子节点），不看文本

use chrono::{DateTime, Utc};
use markup5ever_rcdom::Handle;

use super::dom::{self, Selector};
use crate::config::constants;

/// 提取出的聊天消息
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    /// 节点提供的 ID；没有时由作者、时间戳和当前时间合成，
    /// 合成的 ID 在重复提取同一节点时并不稳定
    pub id: String,
    pub text: String,
    pub author: String,
    pub observed_at: DateTime<Utc>,
    /// 页面上显示的时间戳文本
    pub timestamp_label: Option<String>,
}

/// 消息提取器
pub struct MessageExtractor {
    message: Vec<Selector>,
    message_descendants: Vec<Selector>,
    text: Vec<Selector>,
    author: Vec<Selector>,
    timestamp: Vec<Selector>,
}

impl MessageExtractor {
    pub fn new() -> Self {
        Self {
            message: dom::compile_selectors(constants::MESSAGE_SELECTORS),
            message_descendants: dom::compile_selectors(constants::MESSAGE_DESCENDANT_SELECTORS),
            text: dom::compile_selectors(constants::TEXT_SELECTORS),
            author: dom::compile_selectors(constants::AUTHOR_SELECTORS),
            timestamp: dom::compile_selectors(constants::TIMESTAMP_SELECTORS),
        }
    }

    /// 节点自身或其后代具有消息结构时视为聊天消息
    pub fn is_chat_message(&self, node: &Handle) -> bool {
        if !dom::is_element(node) {
            return false;
        }

        if self.message.iter().any(|selector| selector.matches(node)) {
            return true;
        }

        self.message_descendants
            .iter()
            .any(|selector| selector.find_first(node).is_some())
    }

    /// 节点自身匹配消息选择器
    pub fn is_message_root(&self, node: &Handle) -> bool {
        self.message.iter().any(|selector| selector.matches(node))
    }

    /// 在节点后代中查找消息节点
    pub fn find_messages(&self, node: &Handle) -> Vec<Handle> {
        dom::descendants(node)
            .into_iter()
            .filter(|candidate| self.is_message_root(candidate))
            .collect()
    }

    /// 提取消息；没有非空文本时返回 `None`
    pub fn extract(&self, node: &Handle, now: DateTime<Utc>) -> Option<ChatMessage> {
        let text = self.extract_text(node)?;

        let author = first_text(node, &self.author)
            .unwrap_or_else(|| constants::UNKNOWN_AUTHOR.to_string());
        let timestamp_label = first_text(node, &self.timestamp);

        let id = dom::get_node_attr(node, "data-a-user")
            .or_else(|| dom::get_node_attr(node, "data-message-id"))
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| {
                let timestamp = timestamp_label.clone().unwrap_or_else(|| now.to_rfc3339());
                format!("{}_{}_{}", author, timestamp, Utc::now().timestamp_millis())
            });

        Some(ChatMessage {
            id,
            text,
            author,
            observed_at: now,
            timestamp_label,
        })
    }

    fn extract_text(&self, node: &Handle) -> Option<String> {
        if let Some(text) = first_text(node, &self.text) {
            return Some(text);
        }

        // 回退：第一个既不是作者也不是时间戳的 span
        dom::descendants(node)
            .into_iter()
            .filter(|candidate| dom::get_node_name(candidate) == Some("span"))
            .filter(|candidate| {
                !dom::has_class(candidate, constants::AUTHOR_CLASS)
                    && !dom::has_class(candidate, constants::TIMESTAMP_CLASS)
            })
            .map(|candidate| dom::text_content(&candidate).trim().to_string())
            .find(|text| !text.is_empty())
    }
}

impl Default for MessageExtractor {
    fn default() -> Self {
        Self::new()
    }
}

/// 按优先级返回第一个非空文本
fn first_text(node: &Handle, selectors: &[Selector]) -> Option<String> {
    selectors
        .iter()
        .filter_map(|selector| selector.find_first(node))
        .map(|found| dom::text_content(&found).trim().to_string())
        .find(|text| !text.is_empty())
}
