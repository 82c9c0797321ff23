//! 后台翻译服务
//!
//! 接收内容侧的请求，按消息类型分发：翻译请求经过缓存和远程翻译器，
//! 设置类请求写入设置提供者并调整缓存

use std::cell::RefCell;
use std::rc::Rc;

use chrono::Utc;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};

use crate::channel::Envelope;
use crate::error::{helpers, ChatlingoError, ChatlingoResult, ErrorStats};
use crate::protocol::{
    Ack, ErrorReport, Request, Response, StatusReport, TranslatedText, TranslationRequest,
    TranslationResponse,
};
use crate::secret::SecretVault;
use crate::settings::{ExtensionState, SettingsStore, TranslationSettings};
use crate::storage::{CacheStats, TranslationCache};
use crate::translator::RemoteTranslator;

/// 后台翻译服务
pub struct TranslationService {
    settings: Rc<dyn SettingsStore>,
    vault: Rc<dyn SecretVault>,
    translator: Rc<dyn RemoteTranslator>,
    cache: RefCell<TranslationCache>,
    errors: RefCell<ErrorStats>,
}

impl TranslationService {
    pub fn new(
        settings: Rc<dyn SettingsStore>,
        vault: Rc<dyn SecretVault>,
        translator: Rc<dyn RemoteTranslator>,
    ) -> Self {
        Self {
            settings,
            vault,
            translator,
            cache: RefCell::new(TranslationCache::default()),
            errors: RefCell::new(ErrorStats::default()),
        }
    }

    /// 按当前设置初始化缓存
    pub async fn initialize(&self) -> ChatlingoResult<()> {
        let settings = self.settings.load().await?;
        *self.cache.borrow_mut() = TranslationCache::from_policy(&settings.cache);

        info!(
            translator = self.translator.name(),
            cache_enabled = settings.cache.enabled,
            max_size = settings.cache.max_size,
            "后台翻译服务已初始化"
        );
        Ok(())
    }

    /// 分发请求；错误报告没有响应
    pub async fn dispatch(&self, request: Request) -> Option<Response> {
        debug!(kind = request.kind(), "收到请求");

        match request {
            Request::TranslationRequest(request) => {
                let response = match self.translate(&request).await {
                    Ok(translated) => TranslationResponse::success(
                        &request,
                        translated.text,
                        translated.from_cache,
                    ),
                    Err(e) => {
                        self.errors.borrow_mut().record_error(&e);
                        TranslationResponse::failure(
                            Some(request.message_id.clone()).filter(|id| !id.is_empty()),
                            Some(request.text.clone()).filter(|text| !text.is_empty()),
                            &e,
                        )
                    }
                };
                Some(Response::TranslationResponse(response))
            }
            Request::SettingsChange(settings) => {
                let result = self.change_settings(settings).await;
                Some(Response::SettingsChangeAck(Ack::from(result)))
            }
            Request::ExtensionStateChange { state } => {
                let result = self.change_extension_state(state).await;
                Some(Response::ExtensionStateChangeAck(Ack::from(result)))
            }
            Request::ApiKeyChange { api_key } => {
                let result = self.change_api_key(api_key).await;
                Some(Response::ApiKeyChangeAck(Ack::from(result)))
            }
            Request::StatusRequest => Some(Response::StatusResponse(self.status().await)),
            Request::ErrorReport(report) => {
                self.record_report(&report);
                None
            }
        }
    }

    /// 翻译一条消息
    ///
    /// 命中缓存时不调用远程翻译器；失败不会写入缓存
    pub async fn translate(&self, request: &TranslationRequest) -> ChatlingoResult<TranslatedText> {
        if request.text.trim().is_empty() {
            return helpers::log_error(helpers::validation_error("缺少消息文本"));
        }
        if request.message_id.trim().is_empty() {
            return helpers::log_error(helpers::validation_error("缺少消息ID"));
        }

        let settings = self.settings.load().await?;
        if !settings.extension_state.is_enabled() {
            debug!(message_id = %request.message_id, "扩展未启用，拒绝翻译请求");
            return Err(ChatlingoError::ExtensionDisabled);
        }
        if !settings.api_key_set {
            return helpers::log_error(ChatlingoError::MissingCredential);
        }

        if settings.cache.enabled {
            if let Some(entry) = self.cache.borrow_mut().lookup(&request.text, Utc::now()) {
                debug!(message_id = %request.message_id, "缓存命中");
                return Ok(TranslatedText {
                    text: entry.translated_text,
                    from_cache: true,
                });
            }
        }

        let Some(mut secret) = self.vault.get().await? else {
            warn!("设置标记已有密钥，但保管库中没有密钥");
            return Err(ChatlingoError::MissingCredential);
        };

        let result = self.translator.translate(&request.text, &secret).await;
        secret.wipe();

        match result {
            Ok(translated_text) => {
                if settings.cache.enabled {
                    self.cache.borrow_mut().insert(
                        request.text.clone(),
                        translated_text.clone(),
                        Utc::now(),
                    );
                }
                info!(
                    message_id = %request.message_id,
                    translator = self.translator.name(),
                    "翻译完成"
                );
                Ok(TranslatedText {
                    text: translated_text,
                    from_cache: false,
                })
            }
            Err(failure) => {
                warn!(message_id = %request.message_id, "翻译失败: {}", failure);
                Err(failure.into())
            }
        }
    }

    async fn change_settings(&self, settings: TranslationSettings) -> ChatlingoResult<()> {
        let previous = self.settings.load().await?;
        self.settings.store(settings.clone()).await?;
        self.apply_settings_change(&previous, &settings);
        Ok(())
    }

    async fn change_extension_state(&self, state: ExtensionState) -> ChatlingoResult<()> {
        let mut settings = self.settings.load().await?;
        settings.extension_state = state;
        self.settings.store(settings).await?;
        info!(?state, "扩展状态已更新");
        Ok(())
    }

    /// 保存新密钥并同步密钥标记；凭据变化时清空缓存
    async fn change_api_key(&self, api_key: Option<String>) -> ChatlingoResult<()> {
        self.vault.set(api_key).await?;
        let has_key = self.vault.has().await?;

        let mut settings = self.settings.load().await?;
        settings.api_key_set = has_key;
        self.settings.store(settings).await?;

        self.cache.borrow_mut().clear();
        info!(has_key, "API密钥已更新，缓存已清空");
        Ok(())
    }

    /// 根据新旧设置调整缓存
    pub fn apply_settings_change(
        &self,
        previous: &TranslationSettings,
        current: &TranslationSettings,
    ) {
        let mut cache = self.cache.borrow_mut();

        if previous.cache.enabled && !current.cache.enabled {
            cache.clear();
            info!("缓存已禁用并清空");
            return;
        }

        if previous.cache != current.cache {
            let evicted = cache.reconfigure(&current.cache);
            info!(
                max_size = current.cache.max_size,
                evicted, "缓存策略已更新"
            );
        }
    }

    async fn status(&self) -> StatusReport {
        let settings = match self.settings.load().await {
            Ok(settings) => settings,
            Err(e) => {
                warn!("读取设置失败: {}", e);
                TranslationSettings {
                    extension_state: ExtensionState::Error,
                    ..Default::default()
                }
            }
        };
        let has_api_key = self.vault.has().await.unwrap_or(settings.api_key_set);

        StatusReport {
            state: settings.extension_state,
            has_api_key,
            translation_mode: settings.mode,
            cache_size: self.cache.borrow().len(),
            cache_enabled: settings.cache.enabled,
        }
    }

    fn record_report(&self, report: &ErrorReport) {
        error!(
            context = %report.context,
            url = report.url.as_deref().unwrap_or("-"),
            timestamp = %report.timestamp,
            "内容侧错误报告: {}",
            report.message
        );
    }

    pub fn cache_len(&self) -> usize {
        self.cache.borrow().len()
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.borrow().get_stats()
    }

    pub fn error_stats(&self) -> ErrorStats {
        self.errors.borrow().clone()
    }

    /// 处理请求直到所有发送端关闭
    ///
    /// 每个请求在独立的本地任务中处理；同时监听设置变更以调整缓存。
    /// 必须在 `LocalSet` 中运行。
    pub async fn serve(self: Rc<Self>, mut requests: mpsc::UnboundedReceiver<Envelope>) {
        let mut changes = self.settings.subscribe();
        let mut watching_settings = true;

        loop {
            tokio::select! {
                envelope = requests.recv() => {
                    let Some(envelope) = envelope else {
                        info!("所有请求发送端已关闭，后台服务退出");
                        break;
                    };
                    let service = Rc::clone(&self);
                    tokio::task::spawn_local(async move {
                        if let Some(response) = service.dispatch(envelope.request.clone()).await {
                            envelope.respond(response);
                        }
                    });
                }
                change = changes.recv(), if watching_settings => match change {
                    Ok(change) => self.apply_settings_change(&change.previous, &change.current),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "设置变更通知积压，按当前设置重建缓存策略");
                        if let Ok(settings) = self.settings.load().await {
                            let mut cache = self.cache.borrow_mut();
                            if settings.cache.enabled {
                                cache.reconfigure(&settings.cache);
                            } else {
                                cache.clear();
                            }
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        watching_settings = false;
                    }
                },
            }
        }
    }
}
