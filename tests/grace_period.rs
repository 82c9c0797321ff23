//! 宽限期集成测试

mod common {
    include!("common/mod.rs");
}

use std::time::Duration;

use common::HtmlTestHelper;

use chatlingo::config::GraceConfig;
use chatlingo::content::grace::is_marked;
use chatlingo::content::navigation::rearm_on_navigation;
use chatlingo::content::{dom, ArmReason, GateDecision, GracePeriodGate, NavigationEvents};

const D: u64 = 8000;

fn message(id: &str) -> markup5ever_rcdom::Handle {
    let page = dom::parse_html(&HtmlTestHelper::chat_page(&[(id, "viewer", "Hello world")]));
    HtmlTestHelper::find(&page, ".chat-line__message")
        .pop()
        .expect("fixture should contain a message")
}

#[tokio::test(start_paused = true)]
async fn test_messages_during_initial_load_stay_suppressed() {
    let gate = GracePeriodGate::new(GraceConfig {
        initial_ms: D,
        navigation_ms: 5000,
    });

    let early = message("early");
    assert_eq!(gate.admit(&early), GateDecision::Suppressed);
    assert!(is_marked(&early));

    tokio::time::advance(Duration::from_millis(D + 1)).await;

    let late = message("late");
    assert_eq!(gate.admit(&late), GateDecision::Admitted);
    assert!(!is_marked(&late));

    // 标记是永久的
    assert_eq!(gate.admit(&early), GateDecision::PreviouslySuppressed);
}

#[tokio::test(start_paused = true)]
async fn test_navigation_restarts_the_window() {
    let gate = GracePeriodGate::new(GraceConfig {
        initial_ms: D,
        navigation_ms: D,
    });

    tokio::time::advance(Duration::from_millis(D - 1)).await;
    gate.arm(ArmReason::Navigation);

    // 重新计时而不是叠加：在 2D-2 仍在宽限期内
    tokio::time::advance(Duration::from_millis(D - 1)).await;
    assert!(gate.is_suppressing());
    assert_eq!(gate.admit(&message("during")), GateDecision::Suppressed);

    tokio::time::advance(Duration::from_millis(2)).await;
    assert!(!gate.is_suppressing());
    assert_eq!(gate.admit(&message("after")), GateDecision::Admitted);
    assert_eq!(gate.state().armed_by, ArmReason::Navigation);
}

#[tokio::test(start_paused = true)]
async fn test_navigation_events_rearm_the_gate() {
    let gate = GracePeriodGate::new(GraceConfig {
        initial_ms: 1000,
        navigation_ms: D,
    });
    tokio::time::advance(Duration::from_millis(1001)).await;
    assert!(!gate.is_suppressing());

    let (notifier, events) = NavigationEvents::channel();
    let observed = &gate;
    let drive = async move {
        assert!(notifier.navigated("https://www.twitch.tv/other"));
        for _ in 0..3 {
            tokio::task::yield_now().await;
        }
        let suppressing = observed.is_suppressing();
        drop(notifier);
        suppressing
    };

    let ((), suppressing) = tokio::join!(rearm_on_navigation(events, &gate), drive);

    assert!(suppressing, "导航后应重新进入宽限期");
    assert_eq!(gate.state().armed_by, ArmReason::Navigation);
}
