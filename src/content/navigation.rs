//! 导航事件来源
//!
//! 宿主能推送导航事件时使用 [`NavigationEvents`]；否则用 [`UrlPoller`]
//! 按固定间隔比较页面地址

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::time::{interval, Interval, MissedTickBehavior};
use tracing::{debug, info};
use url::Url;

use super::grace::{ArmReason, GracePeriodGate};

/// 一次导航
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavigationEvent {
    pub url: String,
}

/// 导航事件来源
#[async_trait(?Send)]
pub trait NavigationSource {
    /// 等待下一次导航；来源结束时返回 `None`
    async fn next_navigation(&mut self) -> Option<NavigationEvent>;
}

/// 宿主推送的导航事件
pub struct NavigationEvents {
    receiver: mpsc::UnboundedReceiver<NavigationEvent>,
}

/// 推送导航事件的一端
#[derive(Clone)]
pub struct NavigationNotifier {
    sender: mpsc::UnboundedSender<NavigationEvent>,
}

impl NavigationEvents {
    pub fn channel() -> (NavigationNotifier, Self) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (NavigationNotifier { sender }, Self { receiver })
    }
}

impl NavigationNotifier {
    /// 推送导航事件；接收端已关闭时返回 false
    pub fn navigated(&self, url: impl Into<String>) -> bool {
        self.sender.send(NavigationEvent { url: url.into() }).is_ok()
    }
}

#[async_trait(?Send)]
impl NavigationSource for NavigationEvents {
    async fn next_navigation(&mut self) -> Option<NavigationEvent> {
        self.receiver.recv().await
    }
}

/// 按固定间隔轮询页面地址，地址变化时产生导航事件
pub struct UrlPoller<F> {
    current_url: F,
    last: String,
    ticker: Interval,
}

impl<F> UrlPoller<F>
where
    F: Fn() -> String,
{
    pub fn new(current_url: F, period: Duration) -> Self {
        let last = normalize(&current_url());
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        Self {
            current_url,
            last,
            ticker,
        }
    }
}

#[async_trait(?Send)]
impl<F> NavigationSource for UrlPoller<F>
where
    F: Fn() -> String,
{
    async fn next_navigation(&mut self) -> Option<NavigationEvent> {
        loop {
            self.ticker.tick().await;

            let url = normalize(&(self.current_url)());
            if url != self.last {
                debug!(from = %self.last, to = %url, "检测到页面地址变化");
                self.last = url.clone();
                return Some(NavigationEvent { url });
            }
        }
    }
}

/// 片段标识不算导航；无法解析的地址按原样比较
fn normalize(raw: &str) -> String {
    match Url::parse(raw.trim()) {
        Ok(mut url) => {
            url.set_fragment(None);
            url.to_string()
        }
        Err(_) => raw.trim().to_string(),
    }
}

/// 每次导航都重新布防宽限期，直到来源结束
pub async fn rearm_on_navigation<S>(mut source: S, gate: &GracePeriodGate)
where
    S: NavigationSource,
{
    while let Some(event) = source.next_navigation().await {
        info!(url = %event.url, "页面导航，重新开始宽限期");
        gate.arm(ArmReason::Navigation);
    }
}
