//! 单条聊天消息的处理流程
//!
//! 判定 → 宽限期 → 去重 → 提取 → 资格过滤 → 请求翻译 → 显示

use std::rc::Rc;

use chrono::Utc;
use markup5ever_rcdom::Handle;
use tracing::{debug, error, warn};

use super::dom;
use super::extractor::MessageExtractor;
use super::grace::GracePeriodGate;
use super::render::DisplayRenderer;
use crate::channel::RequestChannel;
use crate::config::constants;
use crate::error::{notices, ChatlingoError};
use crate::notice::NoticeBoard;
use crate::pipeline::{is_translatable, should_translate, Criteria};
use crate::protocol::{ErrorReport, Request, Response, TranslationRequest};
use crate::settings::SettingsCache;

/// 处理结果
#[derive(Debug, Clone, PartialEq)]
pub enum ProcessOutcome {
    NotAMessage,
    /// 宽限期内到达或之前已被标记
    Suppressed,
    AlreadyProcessed,
    /// 没有可用的文本
    Empty,
    /// 扩展未启用，未发送请求
    Disabled,
    /// 不满足翻译条件
    Ineligible,
    Translated { from_cache: bool },
    Failed(ChatlingoError),
}

/// 消息处理器
pub struct MessageProcessor {
    extractor: MessageExtractor,
    renderer: DisplayRenderer,
    gate: Rc<GracePeriodGate>,
    settings: SettingsCache,
    channel: Rc<RequestChannel>,
    notices: Rc<NoticeBoard>,
    page_url: Option<String>,
}

impl MessageProcessor {
    pub fn new(
        gate: Rc<GracePeriodGate>,
        settings: SettingsCache,
        channel: Rc<RequestChannel>,
        notices: Rc<NoticeBoard>,
    ) -> Self {
        Self {
            extractor: MessageExtractor::new(),
            renderer: DisplayRenderer::new(),
            gate,
            settings,
            channel,
            notices,
            page_url: None,
        }
    }

    /// 错误报告中附带的页面地址
    pub fn with_page_url(mut self, url: impl Into<String>) -> Self {
        self.page_url = Some(url.into());
        self
    }

    pub fn extractor(&self) -> &MessageExtractor {
        &self.extractor
    }

    pub fn gate(&self) -> &GracePeriodGate {
        &self.gate
    }

    pub fn settings(&self) -> &SettingsCache {
        &self.settings
    }

    /// 处理一个消息节点，先经过宽限期判定
    ///
    /// 失败不会向上传播，只体现在返回值、提示和错误报告中
    pub async fn process(&self, node: Handle) -> ProcessOutcome {
        if !self.extractor.is_chat_message(&node) {
            return ProcessOutcome::NotAMessage;
        }

        if !self.gate.admit(&node).is_admitted() {
            return ProcessOutcome::Suppressed;
        }

        self.process_admitted(node).await
    }

    /// 处理已通过宽限期判定的节点
    pub async fn process_admitted(&self, node: Handle) -> ProcessOutcome {
        if !self.extractor.is_chat_message(&node) {
            return ProcessOutcome::NotAMessage;
        }

        if has_flag(&node, constants::PROCESSED_ATTR)
            || has_flag(&node, constants::PROCESSING_ATTR)
        {
            return ProcessOutcome::AlreadyProcessed;
        }

        // 在第一次等待之前占用节点，重复投递的同一节点会在上面被拦下
        set_flag(&node, constants::PROCESSING_ATTR, true);

        let Some(message) = self.extractor.extract(&node, Utc::now()) else {
            debug!("消息没有可翻译的文本");
            set_flag(&node, constants::PROCESSING_ATTR, false);
            return ProcessOutcome::Empty;
        };

        let settings = self.settings.get().await;
        if !settings.extension_state.is_enabled() {
            set_flag(&node, constants::PROCESSING_ATTR, false);
            return ProcessOutcome::Disabled;
        }

        if !is_translatable(&message.text)
            || !should_translate(&message.text, &Criteria::from(&settings))
        {
            debug!(message_id = %message.id, "消息不满足翻译条件");
            set_flag(&node, constants::PROCESSING_ATTR, false);
            set_flag(&node, constants::PROCESSED_ATTR, true);
            return ProcessOutcome::Ineligible;
        }

        let request = Request::TranslationRequest(TranslationRequest {
            text: message.text.clone(),
            message_id: message.id.clone(),
            author: Some(message.author.clone()),
            timestamp: Some(message.observed_at),
        });

        let outcome = match self.channel.send(request).await {
            Ok(Response::TranslationResponse(response)) => match response.into_result() {
                Ok(translated) => {
                    self.renderer
                        .display(&node, &translated.text, &settings.display_style);
                    debug!(
                        message_id = %message.id,
                        from_cache = translated.from_cache,
                        "译文已显示"
                    );
                    ProcessOutcome::Translated {
                        from_cache: translated.from_cache,
                    }
                }
                Err(e) => {
                    warn!(message_id = %message.id, "翻译失败: {}", e);
                    self.notices.show(e.user_message());
                    ProcessOutcome::Failed(e)
                }
            },
            Ok(other) => {
                let e = ChatlingoError::MalformedResponse(format!(
                    "意外的响应类型: {}",
                    other.kind()
                ));
                self.notices.show(notices::GENERIC);
                ProcessOutcome::Failed(e)
            }
            // 通道层已显示提示
            Err(e) => ProcessOutcome::Failed(e),
        };

        set_flag(&node, constants::PROCESSING_ATTR, false);
        match &outcome {
            ProcessOutcome::Failed(ChatlingoError::Disconnected(_)) => {
                // 通道恢复后允许重新处理
                set_flag(&node, constants::PROCESSED_ATTR, false);
                error!(message_id = %message.id, "通道已断开，消息未处理");
            }
            ProcessOutcome::Failed(e) => {
                set_flag(&node, constants::PROCESSED_ATTR, true);
                self.report(e, "process_chat_message");
            }
            _ => set_flag(&node, constants::PROCESSED_ATTR, true),
        }

        outcome
    }

    /// 发送错误报告，不等待响应
    pub fn report(&self, error: &ChatlingoError, context: &str) {
        self.channel.notify(Request::ErrorReport(ErrorReport {
            message: error.to_string(),
            context: context.to_string(),
            timestamp: Utc::now(),
            url: self.page_url.clone(),
        }));
    }

    /// 本次变更中需要处理的消息节点
    ///
    /// 节点本身是消息时返回自身；包含消息节点的批次返回其中每一条；
    /// 两者都不是时才按后代结构判断节点本身
    pub fn candidates(&self, node: &Handle) -> Vec<Handle> {
        if self.extractor.is_message_root(node) {
            return vec![node.clone()];
        }

        let nested = self.extractor.find_messages(node);
        if !nested.is_empty() {
            return nested;
        }

        if self.extractor.is_chat_message(node) {
            vec![node.clone()]
        } else {
            Vec::new()
        }
    }
}

fn has_flag(node: &Handle, attr: &str) -> bool {
    dom::get_node_attr(node, attr).as_deref() == Some("true")
}

fn set_flag(node: &Handle, attr: &str, on: bool) {
    dom::set_node_attr(node, attr, on.then(|| "true".to_string()));
}
