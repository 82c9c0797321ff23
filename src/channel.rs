//! 请求/响应通道
//!
//! 内容侧通过 [`RequestChannel`] 向后台发送请求。每次尝试都有独立的超时，
//! 超时和一般传输错误按固定间隔重试；通道断开时立即失败并提示重新加载。

use std::rc::Rc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, warn};

use crate::config::{constants, ChannelPolicy};
use crate::error::{notices, ChatlingoError, ChatlingoResult};
use crate::notice::NoticeBoard;
use crate::protocol::{Request, Response, StatusReport};

/// 传输层错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// 宿主通道已不存在，重试无济于事
    #[error("通道已断开: {0}")]
    Disconnected(String),

    #[error("传输失败: {0}")]
    Failed(String),
}

/// 底层传输
#[async_trait(?Send)]
pub trait Transport {
    /// 发送请求并等待唯一的响应
    async fn send(&self, request: Request) -> Result<Response, TransportError>;

    /// 发送无需响应的请求
    fn post(&self, request: Request) -> Result<(), TransportError>;
}

/// 带重试的请求通道
pub struct RequestChannel {
    transport: Rc<dyn Transport>,
    policy: ChannelPolicy,
    notices: Rc<NoticeBoard>,
}

impl RequestChannel {
    pub fn new(
        transport: Rc<dyn Transport>,
        policy: ChannelPolicy,
        notices: Rc<NoticeBoard>,
    ) -> Self {
        Self {
            transport,
            policy,
            notices,
        }
    }

    pub fn policy(&self) -> &ChannelPolicy {
        &self.policy
    }

    /// 发送请求，成功返回响应，失败返回终态错误
    ///
    /// 每个终态失败都会显示一条提示
    pub async fn send(&self, request: Request) -> ChatlingoResult<Response> {
        let max_attempts = self.policy.max_attempts();
        let kind = request.kind();
        let mut attempt = 0;

        loop {
            attempt += 1;
            debug!(kind, attempt, "发送请求");

            let outcome =
                tokio::time::timeout(self.policy.timeout(), self.transport.send(request.clone()))
                    .await;
            let failure = match outcome {
                Ok(Ok(response)) => return Ok(response),
                Ok(Err(TransportError::Disconnected(reason))) => {
                    error!(kind, "通道已断开，需要重新加载: {}", reason);
                    self.notices.show(notices::RELOAD_REQUIRED);
                    return Err(ChatlingoError::Disconnected(reason));
                }
                Ok(Err(TransportError::Failed(reason))) => ChatlingoError::Transport(reason),
                Err(_) => ChatlingoError::Timeout(format!(
                    "{} 在 {}ms 内未响应",
                    kind, self.policy.timeout_ms
                )),
            };

            if attempt >= max_attempts {
                error!(kind, attempts = attempt, "请求最终失败: {}", failure);
                self.notices.show(failure.user_message());
                return Err(failure);
            }

            warn!(
                kind,
                "请求失败，{}ms 后重试 ({}/{}): {}",
                self.policy.retry_delay_ms,
                attempt,
                max_attempts - 1,
                failure
            );
            tokio::time::sleep(self.policy.retry_delay()).await;
        }
    }

    /// 发送无需响应的请求，失败只记录日志
    pub fn notify(&self, request: Request) {
        if let Err(e) = self.transport.post(request) {
            debug!("通知发送失败: {}", e);
        }
    }

    /// 查询后台状态，单次尝试并限定在连接检查超时内
    pub async fn check_connection(&self) -> Option<StatusReport> {
        let status = self.transport.send(Request::StatusRequest);
        match tokio::time::timeout(constants::CONNECTION_CHECK_TIMEOUT, status).await {
            Ok(Ok(Response::StatusResponse(status))) => Some(status),
            Ok(Ok(other)) => {
                warn!("状态请求收到意外响应: {}", other.kind());
                None
            }
            Ok(Err(e)) => {
                warn!("后台连接检查失败: {}", e);
                None
            }
            Err(_) => {
                warn!("后台连接检查超时");
                None
            }
        }
    }
}

/// 进程内信封：请求与可选的回复端
pub struct Envelope {
    pub request: Request,
    pub reply: Option<oneshot::Sender<Response>>,
}

impl Envelope {
    /// 回复请求；对方已放弃等待时忽略
    pub fn respond(self, response: Response) {
        if let Some(reply) = self.reply {
            if reply.send(response).is_err() {
                debug!("请求方已放弃等待响应");
            }
        }
    }
}

/// 基于 tokio 通道的进程内传输
#[derive(Clone)]
pub struct LocalTransport {
    sender: mpsc::UnboundedSender<Envelope>,
}

impl LocalTransport {
    /// 创建传输及后台侧的接收端
    pub fn pair() -> (Self, mpsc::UnboundedReceiver<Envelope>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

#[async_trait(?Send)]
impl Transport for LocalTransport {
    async fn send(&self, request: Request) -> Result<Response, TransportError> {
        let (reply, response) = oneshot::channel();
        self.sender
            .send(Envelope {
                request,
                reply: Some(reply),
            })
            .map_err(|_| TransportError::Disconnected("后台接收端已关闭".to_string()))?;

        response
            .await
            .map_err(|_| TransportError::Failed("响应前回复端已关闭".to_string()))
    }

    fn post(&self, request: Request) -> Result<(), TransportError> {
        self.sender
            .send(Envelope { request, reply: None })
            .map_err(|_| TransportError::Disconnected("后台接收端已关闭".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::time::Duration;

    use crate::protocol::Ack;
    use crate::settings::{ExtensionState, TranslationMode};

    fn status() -> StatusReport {
        StatusReport {
            state: ExtensionState::Enabled,
            has_api_key: true,
            translation_mode: TranslationMode::NonNative,
            cache_size: 0,
            cache_enabled: true,
        }
    }

    /// 前几次失败、之后成功的传输
    struct FlakyTransport {
        failures: usize,
        calls: Cell<usize>,
    }

    #[async_trait(?Send)]
    impl Transport for FlakyTransport {
        async fn send(&self, _request: Request) -> Result<Response, TransportError> {
            self.calls.set(self.calls.get() + 1);
            if self.calls.get() <= self.failures {
                Err(TransportError::Failed("port closed".to_string()))
            } else {
                Ok(Response::SettingsChangeAck(Ack::ok()))
            }
        }

        fn post(&self, _request: Request) -> Result<(), TransportError> {
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_transport_failure_recovers_within_budget() {
        let transport = Rc::new(FlakyTransport {
            failures: 2,
            calls: Cell::new(0),
        });
        let notices = Rc::new(NoticeBoard::default());
        let channel =
            RequestChannel::new(transport.clone(), ChannelPolicy::default(), notices.clone());

        let started = tokio::time::Instant::now();
        let response = channel.send(Request::StatusRequest).await.unwrap();

        assert_eq!(response, Response::SettingsChangeAck(Ack::ok()));
        assert_eq!(transport.calls.get(), 3);
        assert_eq!(started.elapsed(), Duration::from_millis(2000));
        assert_eq!(notices.shown_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_transport_failure_shows_notice() {
        let transport = Rc::new(FlakyTransport {
            failures: usize::MAX,
            calls: Cell::new(0),
        });
        let notices = Rc::new(NoticeBoard::default());
        let channel =
            RequestChannel::new(transport.clone(), ChannelPolicy::default(), notices.clone());

        let err = channel.send(Request::StatusRequest).await.unwrap_err();
        assert!(matches!(err, ChatlingoError::Transport(_)));
        assert_eq!(transport.calls.get(), 4);
        assert_eq!(notices.current().unwrap().message, notices::CHANNEL_FAILED);
    }

    #[tokio::test]
    async fn test_local_transport_round_trip() {
        let (transport, mut receiver) = LocalTransport::pair();

        let server = async {
            let envelope = receiver.recv().await.unwrap();
            assert_eq!(envelope.request, Request::StatusRequest);
            envelope.respond(Response::StatusResponse(status()));
        };
        let (response, ()) = tokio::join!(transport.send(Request::StatusRequest), server);

        assert_eq!(response.unwrap(), Response::StatusResponse(status()));
    }

    #[tokio::test]
    async fn test_local_transport_reports_disconnect() {
        let (transport, receiver) = LocalTransport::pair();
        drop(receiver);

        let err = transport.send(Request::StatusRequest).await.unwrap_err();
        assert!(matches!(err, TransportError::Disconnected(_)));
        assert!(transport.post(Request::StatusRequest).is_err());
    }

    #[tokio::test]
    async fn test_dropped_reply_is_a_generic_failure() {
        let (transport, mut receiver) = LocalTransport::pair();

        let server = async {
            let envelope = receiver.recv().await.unwrap();
            drop(envelope);
        };
        let (response, ()) = tokio::join!(transport.send(Request::StatusRequest), server);

        assert!(matches!(response.unwrap_err(), TransportError::Failed(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_check_connection_times_out() {
        struct Silent;

        #[async_trait(?Send)]
        impl Transport for Silent {
            async fn send(&self, _request: Request) -> Result<Response, TransportError> {
                std::future::pending().await
            }

            fn post(&self, _request: Request) -> Result<(), TransportError> {
                Ok(())
            }
        }

        let channel = RequestChannel::new(
            Rc::new(Silent),
            ChannelPolicy::default(),
            Rc::new(NoticeBoard::default()),
        );
        assert!(channel.check_connection().await.is_none());
    }
}
