//! 运行时装配
//!
//! 在一个显式构造的上下文中连接后台服务、请求通道和内容侧流水线。
//! 所有组件只在当前线程上使用，需要在 `tokio::task::LocalSet` 中运行。

use std::cell::RefCell;
use std::rc::Rc;

use markup5ever_rcdom::RcDom;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::background::TranslationService;
use crate::channel::{Envelope, LocalTransport, RequestChannel};
use crate::config::RuntimeConfig;
use crate::content::dom::{self, Selector};
use crate::content::navigation::{rearm_on_navigation, NavigationSource};
use crate::content::{
    discover_container, find_container, GracePeriodGate, MessageProcessor, MutationBatch,
    MutationFeed, MutationWatcher, WatchSummary,
};
use crate::error::{helpers, ChatlingoError, ChatlingoResult};
use crate::notice::NoticeBoard;
use crate::secret::SecretVault;
use crate::settings::{SettingsCache, SettingsStore};
use crate::translator::RemoteTranslator;

/// 回放结果
#[derive(Debug, Clone)]
pub struct ReplayReport {
    pub summary: WatchSummary,
    pub html: String,
}

/// 运行时上下文
pub struct ChatRuntime {
    config: RuntimeConfig,
    settings: Rc<dyn SettingsStore>,
    service: Rc<TranslationService>,
    notices: Rc<NoticeBoard>,
    channel: Rc<RequestChannel>,
    processor: Rc<MessageProcessor>,
    requests: RefCell<Option<mpsc::UnboundedReceiver<Envelope>>>,
}

impl ChatRuntime {
    /// 装配所有组件并初始化后台服务
    pub async fn new(
        config: RuntimeConfig,
        settings: Rc<dyn SettingsStore>,
        vault: Rc<dyn SecretVault>,
        translator: Rc<dyn RemoteTranslator>,
        page_url: Option<String>,
    ) -> ChatlingoResult<Self> {
        config.validate()?;

        let service = Rc::new(TranslationService::new(Rc::clone(&settings), vault, translator));
        service.initialize().await?;

        let (transport, requests) = LocalTransport::pair();
        let notices = Rc::new(NoticeBoard::new(config.notice.display()));
        let channel = Rc::new(RequestChannel::new(
            Rc::new(transport),
            config.channel,
            Rc::clone(&notices),
        ));
        let gate = Rc::new(GracePeriodGate::new(config.grace));
        let mut processor = MessageProcessor::new(
            gate,
            SettingsCache::new(Rc::clone(&settings), config.settings_freshness()),
            Rc::clone(&channel),
            Rc::clone(&notices),
        );
        if let Some(url) = page_url {
            processor = processor.with_page_url(url);
        }

        Ok(Self {
            config,
            settings,
            service,
            notices,
            channel,
            processor: Rc::new(processor),
            requests: RefCell::new(Some(requests)),
        })
    }

    pub fn service(&self) -> &Rc<TranslationService> {
        &self.service
    }

    pub fn channel(&self) -> &Rc<RequestChannel> {
        &self.channel
    }

    pub fn notices(&self) -> &Rc<NoticeBoard> {
        &self.notices
    }

    pub fn processor(&self) -> &Rc<MessageProcessor> {
        &self.processor
    }

    /// 在本地任务中启动后台服务，只能调用一次
    pub fn spawn_background(&self) -> ChatlingoResult<JoinHandle<()>> {
        let requests = self
            .requests
            .borrow_mut()
            .take()
            .ok_or_else(|| helpers::internal_error("后台服务已启动"))?;

        Ok(tokio::task::spawn_local(Rc::clone(&self.service).serve(requests)))
    }

    /// 每次导航重新布防宽限期
    pub async fn follow_navigation<S: NavigationSource>(&self, source: S) {
        rearm_on_navigation(source, self.processor.gate()).await;
    }

    /// 回放一份聊天页面快照
    ///
    /// 找到聊天容器后把其中的消息摘下，再按原顺序逐条作为变更批次重新插入，
    /// 走完整的处理流程。返回处理统计和带译文的页面。
    pub async fn replay(&self, page: &RcDom) -> ChatlingoResult<ReplayReport> {
        let background = self.spawn_background()?;

        match self.channel.check_connection().await {
            Some(status) => info!(
                state = ?status.state,
                has_api_key = status.has_api_key,
                "后台服务已就绪"
            ),
            None => warn!("后台服务无响应"),
        }

        let container =
            discover_container(|| find_container(&page.document), &self.config.discovery)
                .await
            .ok_or_else(|| ChatlingoError::InvalidInput("页面中没有聊天容器".to_string()))?;

        let messages = self.processor.extractor().find_messages(&container);
        let mut placements = Vec::with_capacity(messages.len());
        for message in messages {
            if let Some(parent) = dom::get_parent_node(&message) {
                dom::detach(&message);
                placements.push((parent, message));
            }
        }
        info!(count = placements.len(), "开始回放聊天消息");

        let state = self.settings.load().await?.extension_state;
        let watcher = MutationWatcher::new(Rc::clone(&self.processor), state);
        let (feed, batches) = MutationFeed::channel();
        for (parent, message) in placements {
            dom::append_child(&parent, message.clone());
            feed.push(MutationBatch::new(vec![message]));
        }
        drop(feed);

        let summary = watcher.run(batches, Some(self.settings.subscribe())).await;
        background.abort();

        if let Some(body) = Selector::parse("body")?.find_first(&page.document) {
            self.notices.render_into(&body)?;
        }

        Ok(ReplayReport {
            summary,
            html: dom::serialize_document(page)?,
        })
    }
}
