//! 宽限期闸门
//!
//! 页面加载和导航后会一次性插入大量历史消息。宽限期内观察到的消息节点
//! 会被打上持久标记，在其 DOM 生命周期内永远不会被翻译。
//!
//! 状态以截止时间为准，定时任务只负责在到期时切换状态并通知订阅者；
//! 重新布防总是先取消旧的定时任务。

use std::cell::RefCell;
use std::sync::Arc;
use std::time::Duration;

use markup5ever_rcdom::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info};

use super::dom;
use crate::config::{constants, GraceConfig};

/// 布防原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArmReason {
    InitialLoad,
    Navigation,
}

/// 宽限期状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GracePeriodState {
    pub active: bool,
    pub expires_at: Instant,
    pub armed_by: ArmReason,
}

/// 闸门判定结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    /// 宽限期内到达，已打标记
    Suppressed,
    /// 之前已被标记
    PreviouslySuppressed,
    Admitted,
}

impl GateDecision {
    pub fn is_admitted(self) -> bool {
        self == GateDecision::Admitted
    }
}

/// 宽限期闸门
pub struct GracePeriodGate {
    config: GraceConfig,
    state: Arc<watch::Sender<GracePeriodState>>,
    timer: RefCell<Option<JoinHandle<()>>>,
}

impl GracePeriodGate {
    /// 创建闸门并以初始加载时长布防
    pub fn new(config: GraceConfig) -> Self {
        let now = Instant::now();
        let (state, _) = watch::channel(GracePeriodState {
            active: true,
            expires_at: now,
            armed_by: ArmReason::InitialLoad,
        });

        let gate = Self {
            config,
            state: Arc::new(state),
            timer: RefCell::new(None),
        };
        gate.arm(ArmReason::InitialLoad);
        gate
    }

    fn duration_for(&self, reason: ArmReason) -> Duration {
        match reason {
            ArmReason::InitialLoad => self.config.initial(),
            ArmReason::Navigation => self.config.navigation(),
        }
    }

    /// 布防；未到期时重新计时，不叠加
    pub fn arm(&self, reason: ArmReason) {
        if let Some(previous) = self.timer.borrow_mut().take() {
            previous.abort();
        }

        let duration = self.duration_for(reason);
        let expires_at = Instant::now() + duration;
        self.state.send_replace(GracePeriodState {
            active: true,
            expires_at,
            armed_by: reason,
        });

        info!(?reason, duration_ms = duration.as_millis() as u64, "宽限期开始");

        // 没有运行时时只依赖截止时间判断
        if let Ok(runtime) = tokio::runtime::Handle::try_current() {
            let state = Arc::clone(&self.state);
            let handle = runtime.spawn(async move {
                tokio::time::sleep_until(expires_at).await;
                // 已被重新布防时截止时间不同
                let ended = state.send_if_modified(|current| {
                    if current.expires_at != expires_at || !current.active {
                        return false;
                    }
                    current.active = false;
                    true
                });
                if ended {
                    info!("宽限期结束，开始翻译新消息");
                }
            });
            *self.timer.borrow_mut() = Some(handle);
        }
    }

    /// 当前是否处于宽限期
    pub fn is_suppressing(&self) -> bool {
        let state = *self.state.borrow();
        state.active && Instant::now() < state.expires_at
    }

    pub fn state(&self) -> GracePeriodState {
        let mut state = *self.state.borrow();
        state.active = state.active && Instant::now() < state.expires_at;
        state
    }

    /// 订阅状态变化
    pub fn subscribe(&self) -> watch::Receiver<GracePeriodState> {
        self.state.subscribe()
    }

    /// 判定节点能否进入翻译流程
    ///
    /// 宽限期内观察到的节点被永久标记
    pub fn admit(&self, node: &Handle) -> GateDecision {
        if is_marked(node) {
            return GateDecision::PreviouslySuppressed;
        }

        if self.is_suppressing() {
            dom::set_node_attr(node, constants::GRACE_MARKER_ATTR, Some("true".to_string()));
            debug!("宽限期内的消息，跳过翻译");
            return GateDecision::Suppressed;
        }

        GateDecision::Admitted
    }
}

impl Default for GracePeriodGate {
    fn default() -> Self {
        Self::new(GraceConfig::default())
    }
}

impl Drop for GracePeriodGate {
    fn drop(&mut self) {
        if let Some(timer) = self.timer.get_mut().take() {
            timer.abort();
        }
    }
}

/// 节点是否带有宽限期标记
pub fn is_marked(node: &Handle) -> bool {
    dom::get_node_attr(node, constants::GRACE_MARKER_ATTR).as_deref() == Some("true")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message_node() -> (markup5ever_rcdom::RcDom, Handle) {
        let page = dom::parse_html(r#"<div class="chat-line__message"><span>hi</span></div>"#);
        let node = dom::Selector::parse(".chat-line__message")
            .unwrap()
            .find_first(&page.document)
            .unwrap();
        (page, node)
    }

    #[tokio::test(start_paused = true)]
    async fn test_initial_window_uses_initial_duration() {
        let gate = GracePeriodGate::default();
        assert!(gate.is_suppressing());
        assert_eq!(gate.state().armed_by, ArmReason::InitialLoad);

        tokio::time::advance(Duration::from_millis(7999)).await;
        assert!(gate.is_suppressing());

        tokio::time::advance(Duration::from_millis(2)).await;
        assert!(!gate.is_suppressing());
        assert!(!gate.state().active);
    }

    #[tokio::test(start_paused = true)]
    async fn test_navigation_rearm_uses_shorter_duration() {
        let gate = GracePeriodGate::default();
        tokio::time::advance(Duration::from_millis(9000)).await;
        assert!(!gate.is_suppressing());

        gate.arm(ArmReason::Navigation);
        assert!(gate.is_suppressing());
        assert_eq!(gate.state().armed_by, ArmReason::Navigation);

        tokio::time::advance(Duration::from_millis(5001)).await;
        assert!(!gate.is_suppressing());
    }

    #[tokio::test(start_paused = true)]
    async fn test_marker_is_durable() {
        let gate = GracePeriodGate::default();
        let (_page, node) = message_node();

        assert_eq!(gate.admit(&node), GateDecision::Suppressed);
        assert!(is_marked(&node));

        tokio::time::advance(Duration::from_millis(8001)).await;
        assert_eq!(gate.admit(&node), GateDecision::PreviouslySuppressed);

        let (_page, fresh) = message_node();
        assert_eq!(gate.admit(&fresh), GateDecision::Admitted);
        assert!(!is_marked(&fresh));
    }

    #[tokio::test(start_paused = true)]
    async fn test_expiry_timer_notifies_subscribers() {
        let gate = GracePeriodGate::new(GraceConfig {
            initial_ms: 100,
            navigation_ms: 100,
        });
        let mut changes = gate.subscribe();
        changes.borrow_and_update();

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(changes.has_changed().unwrap());
    }

    #[test]
    fn test_gate_without_runtime_falls_back_to_deadline() {
        let gate = GracePeriodGate::new(GraceConfig {
            initial_ms: 0,
            navigation_ms: 0,
        });
        assert!(!gate.is_suppressing());
    }
}
