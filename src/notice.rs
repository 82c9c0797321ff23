//! 用户提示
//!
//! 所有到达用户的失败都通过同一个提示板显示：新提示替换旧提示，
//! 超过显示时长后自动消失

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::Duration;

use tokio::time::Instant;

use crate::config::constants;
use crate::content::dom;
use crate::error::ChatlingoResult;

/// 提示元素的 class
pub const NOTICE_CLASS: &str = "chatlingo-error";

/// 一条提示
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub message: String,
    pub shown_at: Instant,
    pub expires_at: Instant,
}

/// 提示输出端
pub trait NoticeSink {
    fn notice_shown(&self, message: &str);
}

/// 提示板
pub struct NoticeBoard {
    display: Duration,
    current: RefCell<Option<Notice>>,
    sinks: RefCell<Vec<Rc<dyn NoticeSink>>>,
    shown: Cell<usize>,
}

impl NoticeBoard {
    pub fn new(display: Duration) -> Self {
        Self {
            display,
            current: RefCell::new(None),
            sinks: RefCell::new(Vec::new()),
            shown: Cell::new(0),
        }
    }

    pub fn add_sink(&self, sink: Rc<dyn NoticeSink>) {
        self.sinks.borrow_mut().push(sink);
    }

    /// 显示提示，替换当前提示
    pub fn show(&self, message: &str) {
        let now = Instant::now();
        tracing::warn!(notice = message, "显示用户提示");

        *self.current.borrow_mut() = Some(Notice {
            message: message.to_string(),
            shown_at: now,
            expires_at: now + self.display,
        });
        self.shown.set(self.shown.get() + 1);

        let sinks = self.sinks.borrow().clone();
        for sink in sinks {
            sink.notice_shown(message);
        }
    }

    /// 当前仍在显示的提示
    pub fn current(&self) -> Option<Notice> {
        let mut current = self.current.borrow_mut();
        if current
            .as_ref()
            .is_some_and(|notice| Instant::now() >= notice.expires_at)
        {
            *current = None;
        }
        current.clone()
    }

    pub fn dismiss(&self) {
        self.current.borrow_mut().take();
    }

    /// 累计显示过的提示数
    pub fn shown_count(&self) -> usize {
        self.shown.get()
    }

    /// 把当前提示同步到页面：移除旧元素，若仍有提示则追加新元素
    pub fn render_into(&self, body: &markup5ever_rcdom::Handle) -> ChatlingoResult<()> {
        let selector = dom::Selector::parse(&format!("div.{}", NOTICE_CLASS))?;
        for existing in selector.find_all(body) {
            dom::detach(&existing);
        }

        if let Some(notice) = self.current() {
            let element = dom::create_element(
                "div",
                &[
                    ("class", NOTICE_CLASS),
                    (
                        "style",
                        "position: fixed; top: 20px; right: 20px; background-color: #f8d7da; \
                         color: #721c24; padding: 10px; border-radius: 5px; z-index: 9999;",
                    ),
                ],
            );
            dom::set_text_content(&element, &format!("Chatlingo: {}", notice.message));
            dom::append_child(body, element);
        }

        Ok(())
    }
}

impl Default for NoticeBoard {
    fn default() -> Self {
        Self::new(constants::NOTICE_DISPLAY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::notices;

    struct Recorder(RefCell<Vec<String>>);

    impl NoticeSink for Recorder {
        fn notice_shown(&self, message: &str) {
            self.0.borrow_mut().push(message.to_string());
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_notice_replaces_and_expires() {
        let board = NoticeBoard::new(Duration::from_millis(5000));
        board.show(notices::TIMEOUT);
        tokio::time::advance(Duration::from_millis(3000)).await;
        board.show(notices::RELOAD_REQUIRED);

        assert_eq!(board.current().unwrap().message, notices::RELOAD_REQUIRED);
        assert_eq!(board.shown_count(), 2);

        // 替换后的提示从自己的显示时间开始计时
        tokio::time::advance(Duration::from_millis(4000)).await;
        assert!(board.current().is_some());

        tokio::time::advance(Duration::from_millis(1000)).await;
        assert!(board.current().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_sinks_receive_notices() {
        let board = NoticeBoard::default();
        let recorder = Rc::new(Recorder(RefCell::new(Vec::new())));
        board.add_sink(recorder.clone());

        board.show(notices::GENERIC);
        assert_eq!(*recorder.0.borrow(), vec![notices::GENERIC.to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_render_keeps_single_notice_element() {
        let page = dom::parse_html("<body><p>chat</p></body>");
        let body = dom::Selector::parse("body").unwrap().find_first(&page.document).unwrap();
        let board = NoticeBoard::default();

        board.show(notices::TIMEOUT);
        board.render_into(&body).unwrap();
        board.show(notices::GENERIC);
        board.render_into(&body).unwrap();

        let shown = dom::Selector::parse("div.chatlingo-error").unwrap().find_all(&body);
        assert_eq!(shown.len(), 1);
        assert!(dom::text_content(&shown[0]).ends_with(notices::GENERIC));

        board.dismiss();
        board.render_into(&body).unwrap();
        assert!(dom::Selector::parse("div.chatlingo-error").unwrap().find_first(&body).is_none());
    }
}
