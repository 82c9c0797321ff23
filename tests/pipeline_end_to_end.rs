//! 翻译流程集成测试
//!
//! 从后台服务到页面回放的完整路径

mod common {
    include!("common/mod.rs");
}

use std::rc::Rc;

use common::{enabled_settings, FakeTranslator, HtmlTestHelper, TestEnvironment};

use chatlingo::config::RuntimeConfig;
use chatlingo::content::dom;
use chatlingo::protocol::{Request, Response, TranslationRequest};
use chatlingo::secret::MemoryVault;
use chatlingo::settings::{ExtensionState, MemorySettingsStore, SettingsStore, TranslationSettings};
use chatlingo::translator::{FailureKind, RemoteFailure};
use chatlingo::{ChatRuntime, ChatlingoError};

fn request(text: &str, id: &str) -> TranslationRequest {
    TranslationRequest {
        text: text.to_string(),
        message_id: id.to_string(),
        author: Some("viewer".to_string()),
        timestamp: None,
    }
}

#[tokio::test]
async fn test_translation_then_cache_hit() {
    let env = TestEnvironment::new(enabled_settings(), FakeTranslator::returning("こんにちは世界"));
    env.service.initialize().await.expect("service should initialize");

    let first = env
        .service
        .translate(&request("Hello world", "m1"))
        .await
        .expect("first translation should succeed");
    assert_eq!(first.text, "こんにちは世界");
    assert!(!first.from_cache, "第一次翻译不应来自缓存");

    let second = env
        .service
        .translate(&request("Hello world", "m2"))
        .await
        .expect("second translation should succeed");
    assert_eq!(second.text, "こんにちは世界");
    assert!(second.from_cache, "相同文本应命中缓存");

    assert_eq!(env.translator.calls.get(), 1, "远程翻译器只应被调用一次");
    assert_eq!(env.service.cache_len(), 1);
    assert_eq!(
        env.translator.seen_secrets.borrow().as_slice(),
        ["AIzaTestKey0123456789".to_string()]
    );
}

#[tokio::test]
async fn test_disabled_extension_is_rejected_without_remote_call() {
    let settings = TranslationSettings {
        extension_state: ExtensionState::Disabled,
        api_key_set: true,
        ..Default::default()
    };
    let env = TestEnvironment::new(settings, FakeTranslator::returning("unused"));

    let result = env.service.translate(&request("Hello world", "m1")).await;

    assert_eq!(result, Err(ChatlingoError::ExtensionDisabled));
    assert_eq!(env.translator.calls.get(), 0);
}

#[tokio::test]
async fn test_failure_response_carries_typed_error() {
    let env = TestEnvironment::new(
        enabled_settings(),
        FakeTranslator::failing(
            RemoteFailure::new(FailureKind::RateLimited, "quota").with_status(429),
        ),
    );

    let response = env
        .service
        .dispatch(Request::TranslationRequest(request("Hello world", "m1")))
        .await
        .expect("translation request should get a response");

    let Response::TranslationResponse(response) = response else {
        panic!("unexpected response kind");
    };
    assert!(!response.success);
    assert_eq!(response.message_id.as_deref(), Some("m1"));
    assert_eq!(response.into_result(), Err(ChatlingoError::RateLimited));

    // 失败不写入缓存
    assert_eq!(env.service.cache_len(), 0);
    assert_eq!(env.service.error_stats().total_errors, 1);
}

#[tokio::test]
async fn test_disabling_cache_through_settings_change_clears_it() {
    let env = TestEnvironment::new(enabled_settings(), FakeTranslator::returning("こんにちは世界"));
    env.service
        .translate(&request("Hello world", "m1"))
        .await
        .expect("translation should succeed");
    assert_eq!(env.service.cache_len(), 1);

    let mut settings = enabled_settings();
    settings.cache.enabled = false;
    let response = env.service.dispatch(Request::SettingsChange(settings)).await;

    assert!(matches!(response, Some(Response::SettingsChangeAck(ack)) if ack.success));
    assert_eq!(env.service.cache_len(), 0, "禁用缓存后应被清空");

    // 缓存禁用时每次都调用远程翻译器
    env.service
        .translate(&request("Hello world", "m2"))
        .await
        .expect("translation should succeed");
    assert_eq!(env.translator.calls.get(), 2);
    assert_eq!(env.service.cache_len(), 0);
}

#[tokio::test]
async fn test_extension_state_change_is_persisted() {
    let env = TestEnvironment::new(enabled_settings(), FakeTranslator::returning("unused"));

    let response = env
        .service
        .dispatch(Request::ExtensionStateChange {
            state: ExtensionState::Disabled,
        })
        .await;

    assert!(matches!(response, Some(Response::ExtensionStateChangeAck(ack)) if ack.success));
    assert_eq!(env.settings.snapshot().extension_state, ExtensionState::Disabled);

    let Some(Response::StatusResponse(status)) =
        env.service.dispatch(Request::StatusRequest).await
    else {
        panic!("status request should get a status response");
    };
    assert_eq!(status.state, ExtensionState::Disabled);
    assert!(status.has_api_key);
}

#[tokio::test]
async fn test_replay_annotates_foreign_messages_only() {
    let local = tokio::task::LocalSet::new();
    local
        .run_until(async {
            let html = HtmlTestHelper::chat_page(&[
                ("u1", "Alice", "Hello world"),
                ("u2", "Bob", "こんにちは"),
            ]);
            let page = dom::parse_html(&html);

            let mut config = RuntimeConfig::default();
            config.grace.initial_ms = 0;

            let translator = Rc::new(FakeTranslator::returning("こんにちは世界"));
            let settings: Rc<dyn SettingsStore> =
                Rc::new(MemorySettingsStore::new(enabled_settings()));
            let runtime = ChatRuntime::new(
                config,
                settings,
                Rc::new(MemoryVault::with_secret("AIzaTestKey0123456789")),
                translator.clone(),
                Some("https://www.twitch.tv/somechannel".to_string()),
            )
            .await
            .expect("runtime should build");

            let report = runtime.replay(&page).await.expect("replay should succeed");

            assert_eq!(report.summary.batches, 2);
            assert_eq!(report.summary.translated, 1, "只有英文消息需要翻译");
            assert_eq!(report.summary.skipped, 1, "日文消息应被跳过");
            assert_eq!(report.summary.failed, 0);
            assert_eq!(translator.calls.get(), 1);

            let annotations = HtmlTestHelper::find(&page, "div.chatlingo-translation");
            assert_eq!(annotations.len(), 1);
            assert!(dom::text_content(&annotations[0]).contains("こんにちは世界"));
            assert!(report.html.contains("こんにちは世界"));
            assert!(!report.html.contains("chatlingo-error"), "成功回放不应留下错误提示");
        })
        .await;
}

#[tokio::test]
async fn test_replay_without_chat_container_fails() {
    let local = tokio::task::LocalSet::new();
    local
        .run_until(async {
            let page = dom::parse_html("<html><body><p>no chat here</p></body></html>");

            let mut config = RuntimeConfig::default();
            config.grace.initial_ms = 0;
            config.discovery.max_attempts = 1;

            let runtime = ChatRuntime::new(
                config,
                Rc::new(MemorySettingsStore::new(enabled_settings())),
                Rc::new(MemoryVault::with_secret("AIzaTestKey0123456789")),
                Rc::new(FakeTranslator::returning("unused")),
                None,
            )
            .await
            .expect("runtime should build");

            let result = runtime.replay(&page).await;
            assert!(matches!(result, Err(ChatlingoError::InvalidInput(_))));
        })
        .await;
}
