//! 聊天容器发现与变更监听
//!
//! 新增节点以批次形式推入队列，由单个消费者按到达顺序处理。
//! 宽限期判定在节点到达时同步完成，翻译请求则在批次之间并发进行。

use std::cell::Cell;
use std::rc::Rc;

use futures::stream::{FuturesUnordered, StreamExt};
use markup5ever_rcdom::Handle;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

use super::dom::{self, Selector};
use super::processor::{MessageProcessor, ProcessOutcome};
use crate::config::{constants, DiscoveryConfig};
use crate::settings::{ExtensionState, SettingsChanged};

/// 一批新增节点
#[derive(Debug, Clone, Default)]
pub struct MutationBatch {
    pub added: Vec<Handle>,
}

impl MutationBatch {
    pub fn new(added: Vec<Handle>) -> Self {
        Self { added }
    }
}

/// 推送变更批次的一端
#[derive(Clone)]
pub struct MutationFeed {
    sender: mpsc::UnboundedSender<MutationBatch>,
}

impl MutationFeed {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<MutationBatch>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }

    /// 推送一批节点；监听已结束时返回 false
    pub fn push(&self, batch: MutationBatch) -> bool {
        self.sender.send(batch).is_ok()
    }
}

/// 按选择器优先级查找聊天容器
pub fn find_container(root: &Handle) -> Option<Handle> {
    dom::compile_selectors(constants::CONTAINER_SELECTORS)
        .iter()
        .find_map(|selector| selector.find_first(root))
}

/// 按固定间隔轮询查找聊天容器，超过最大次数后放弃
pub async fn discover_container<F>(find: F, config: &DiscoveryConfig) -> Option<Handle>
where
    F: Fn() -> Option<Handle>,
{
    for attempt in 1..=config.max_attempts {
        if let Some(container) = find() {
            let existing = Selector::parse(".chat-line__message")
                .map(|selector| selector.find_all(&container).len())
                .unwrap_or(0);
            info!(attempt, existing, "找到聊天容器");
            return Some(container);
        }

        debug!(attempt, max_attempts = config.max_attempts, "未找到聊天容器");
        if attempt < config.max_attempts {
            tokio::time::sleep(config.interval()).await;
        }
    }

    warn!(
        max_attempts = config.max_attempts,
        "多次尝试后仍未找到聊天容器，放弃监听"
    );
    None
}

/// 监听统计
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WatchSummary {
    pub batches: usize,
    pub dropped_batches: usize,
    pub suppressed: usize,
    pub translated: usize,
    pub from_cache: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl WatchSummary {
    fn record(&mut self, outcome: &ProcessOutcome) {
        match outcome {
            ProcessOutcome::Translated { from_cache } => {
                self.translated += 1;
                if *from_cache {
                    self.from_cache += 1;
                }
            }
            ProcessOutcome::Suppressed => self.suppressed += 1,
            ProcessOutcome::Failed(_) => self.failed += 1,
            _ => self.skipped += 1,
        }
    }
}

/// 变更监听器
pub struct MutationWatcher {
    processor: Rc<MessageProcessor>,
    observing: Cell<bool>,
}

impl MutationWatcher {
    pub fn new(processor: Rc<MessageProcessor>, state: ExtensionState) -> Self {
        Self {
            processor,
            observing: Cell::new(state.is_enabled()),
        }
    }

    pub fn is_observing(&self) -> bool {
        self.observing.get()
    }

    /// 扩展启用时开始监听，禁用时停止
    pub fn on_state_change(&self, state: ExtensionState) {
        let observing = state.is_enabled();
        if observing != self.observing.replace(observing) {
            self.processor.settings().invalidate();
            if observing {
                info!("扩展已启用，开始监听聊天");
            } else {
                info!("扩展已禁用，停止监听聊天");
            }
        }
    }

    /// 处理批次直到发送端全部关闭且所有请求完成
    pub async fn run(
        &self,
        mut batches: mpsc::UnboundedReceiver<MutationBatch>,
        mut settings_changes: Option<broadcast::Receiver<SettingsChanged>>,
    ) -> WatchSummary {
        let mut summary = WatchSummary::default();
        let mut in_flight = FuturesUnordered::new();
        let mut feed_open = true;

        loop {
            if !feed_open && in_flight.is_empty() {
                break;
            }

            tokio::select! {
                batch = batches.recv(), if feed_open => match batch {
                    Some(batch) => {
                        summary.batches += 1;
                        if !self.observing.get() {
                            summary.dropped_batches += 1;
                            continue;
                        }
                        for node in self.admit_batch(&batch, &mut summary) {
                            in_flight.push(self.processor.process_admitted(node));
                        }
                    }
                    None => feed_open = false,
                },
                Some(outcome) = in_flight.next(), if !in_flight.is_empty() => {
                    summary.record(&outcome);
                }
                change = recv_change(&mut settings_changes), if settings_changes.is_some() => {
                    match change {
                        Some(change) => self.on_state_change(change.current.extension_state),
                        None => settings_changes = None,
                    }
                }
                else => break,
            }
        }

        info!(?summary, "聊天监听结束");
        summary
    }

    /// 在到达时完成宽限期判定，返回可以进入翻译流程的节点
    ///
    /// 之后的处理不再经过闸门，每个节点只计入一次
    fn admit_batch(&self, batch: &MutationBatch, summary: &mut WatchSummary) -> Vec<Handle> {
        let gate = self.processor.gate();
        batch
            .added
            .iter()
            .flat_map(|node| self.processor.candidates(node))
            .filter(|node| {
                let admitted = gate.admit(node).is_admitted();
                if !admitted {
                    summary.suppressed += 1;
                }
                admitted
            })
            .collect()
    }
}

async fn recv_change(
    receiver: &mut Option<broadcast::Receiver<SettingsChanged>>,
) -> Option<SettingsChanged> {
    let Some(receiver) = receiver.as_mut() else {
        return std::future::pending().await;
    };

    loop {
        match receiver.recv().await {
            Ok(change) => return Some(change),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "设置变更通知积压");
            }
            Err(broadcast::error::RecvError::Closed) => return None,
        }
    }
}
