// 集成测试公共模块
//
// 提供假翻译器、可编排的传输、提示记录器和聊天页面样例

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;

use async_trait::async_trait;
use markup5ever_rcdom::{Handle, RcDom};
use tokio::time::Instant;

use chatlingo::background::TranslationService;
use chatlingo::channel::{Transport, TransportError};
use chatlingo::content::dom;
use chatlingo::notice::NoticeSink;
use chatlingo::protocol::{Request, Response};
use chatlingo::secret::{MemoryVault, SecretHandle};
use chatlingo::settings::{ExtensionState, MemorySettingsStore, TranslationSettings};
use chatlingo::translator::{RemoteFailure, RemoteTranslator};

/// 记录调用次数的假翻译器
pub struct FakeTranslator {
    pub calls: Cell<usize>,
    pub seen_secrets: RefCell<Vec<String>>,
    outcome: Result<String, RemoteFailure>,
}

impl FakeTranslator {
    pub fn returning(text: &str) -> Self {
        Self {
            calls: Cell::new(0),
            seen_secrets: RefCell::new(Vec::new()),
            outcome: Ok(text.to_string()),
        }
    }

    pub fn failing(failure: RemoteFailure) -> Self {
        Self {
            calls: Cell::new(0),
            seen_secrets: RefCell::new(Vec::new()),
            outcome: Err(failure),
        }
    }
}

#[async_trait(?Send)]
impl RemoteTranslator for FakeTranslator {
    async fn translate(&self, _text: &str, secret: &SecretHandle) -> Result<String, RemoteFailure> {
        self.calls.set(self.calls.get() + 1);
        self.seen_secrets.borrow_mut().push(secret.expose().to_string());
        self.outcome.clone()
    }

    fn name(&self) -> &str {
        "fake"
    }
}

/// 传输的单次行为
#[derive(Debug, Clone)]
pub enum Step {
    /// 永不响应，由通道超时
    Hang,
    Fail,
    Disconnect,
    Respond(Response),
}

/// 按脚本逐次返回结果的传输；脚本用完后重复最后一步
pub struct ScriptedTransport {
    steps: RefCell<VecDeque<Step>>,
    last: RefCell<Step>,
    pub attempts: RefCell<Vec<Instant>>,
    pub posted: RefCell<Vec<Request>>,
}

impl ScriptedTransport {
    pub fn new(steps: Vec<Step>) -> Self {
        Self {
            steps: RefCell::new(steps.into()),
            last: RefCell::new(Step::Hang),
            attempts: RefCell::new(Vec::new()),
            posted: RefCell::new(Vec::new()),
        }
    }

    pub fn attempt_count(&self) -> usize {
        self.attempts.borrow().len()
    }
}

#[async_trait(?Send)]
impl Transport for ScriptedTransport {
    async fn send(&self, _request: Request) -> Result<Response, TransportError> {
        self.attempts.borrow_mut().push(Instant::now());

        let step = match self.steps.borrow_mut().pop_front() {
            Some(step) => {
                *self.last.borrow_mut() = step.clone();
                step
            }
            None => self.last.borrow().clone(),
        };

        match step {
            Step::Hang => std::future::pending().await,
            Step::Fail => Err(TransportError::Failed("Could not establish connection".to_string())),
            Step::Disconnect => Err(TransportError::Disconnected(
                "Extension context invalidated.".to_string(),
            )),
            Step::Respond(response) => Ok(response),
        }
    }

    fn post(&self, request: Request) -> Result<(), TransportError> {
        self.posted.borrow_mut().push(request);
        Ok(())
    }
}

/// 记录所有提示
#[derive(Default)]
pub struct RecordingSink {
    pub messages: RefCell<Vec<String>>,
}

impl NoticeSink for RecordingSink {
    fn notice_shown(&self, message: &str) {
        self.messages.borrow_mut().push(message.to_string());
    }
}

/// 后台服务测试环境
pub struct TestEnvironment {
    pub settings: Rc<MemorySettingsStore>,
    pub translator: Rc<FakeTranslator>,
    pub service: Rc<TranslationService>,
}

impl TestEnvironment {
    pub fn new(settings: TranslationSettings, translator: FakeTranslator) -> Self {
        let settings = Rc::new(MemorySettingsStore::new(settings));
        let translator = Rc::new(translator);
        let service = Rc::new(TranslationService::new(
            settings.clone(),
            Rc::new(MemoryVault::with_secret("AIzaTestKey0123456789")),
            translator.clone(),
        ));

        Self {
            settings,
            translator,
            service,
        }
    }
}

/// 已启用、已设置密钥的设置
pub fn enabled_settings() -> TranslationSettings {
    TranslationSettings {
        extension_state: ExtensionState::Enabled,
        api_key_set: true,
        ..Default::default()
    }
}

/// 聊天页面样例
pub struct HtmlTestHelper;

impl HtmlTestHelper {
    /// 一条聊天消息的标记
    pub fn message(id: &str, author: &str, text: &str) -> String {
        format!(
            r#"<div class="chat-line__message" data-a-user="{id}">
                 <span class="chat-line__timestamp">21:04</span>
                 <span class="chat-author__display-name">{author}</span>
                 <span class="text-fragment">{text}</span>
               </div>"#
        )
    }

    /// 含聊天容器的完整页面
    pub fn chat_page(messages: &[(&str, &str, &str)]) -> String {
        let lines: String = messages
            .iter()
            .map(|(id, author, text)| Self::message(id, author, text))
            .collect();

        format!(
            r#"<!DOCTYPE html><html><head><title>chat</title></head><body>
               <div class="stream-chat">
                 <div class="chat-scrollable-area__message-container">{lines}</div>
               </div>
               </body></html>"#
        )
    }

    pub fn find(page: &RcDom, selector: &str) -> Vec<Handle> {
        dom::Selector::parse(selector)
            .expect("selector should parse")
            .find_all(&page.document)
    }
}
