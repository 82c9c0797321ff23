//! 密钥保管接口
//!
//! 加密存储由外部实现，核心只通过 `has`/`get`/`set` 访问。
//! 取出的密钥包装在 [`SecretHandle`] 中，只在一次翻译调用期间存在于内存。

use std::cell::RefCell;
use std::fmt;
use std::sync::atomic::{compiler_fence, Ordering};

use async_trait::async_trait;

use crate::error::ChatlingoResult;

/// 一次调用期间持有的密钥，释放时清零
pub struct SecretHandle {
    value: String,
}

impl SecretHandle {
    pub fn new(value: String) -> Self {
        Self { value }
    }

    pub fn expose(&self) -> &str {
        &self.value
    }

    /// 立即清除密钥
    pub fn wipe(&mut self) {
        let mut bytes = std::mem::take(&mut self.value).into_bytes();
        bytes.fill(0);
        std::hint::black_box(&bytes);
        compiler_fence(Ordering::SeqCst);
    }

    pub fn is_wiped(&self) -> bool {
        self.value.is_empty()
    }
}

impl Drop for SecretHandle {
    fn drop(&mut self) {
        self.wipe();
    }
}

impl fmt::Debug for SecretHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretHandle([REDACTED])")
    }
}

/// 密钥保管库
#[async_trait(?Send)]
pub trait SecretVault {
    async fn has(&self) -> ChatlingoResult<bool>;

    async fn get(&self) -> ChatlingoResult<Option<SecretHandle>>;

    /// 传入 `None` 删除密钥
    async fn set(&self, secret: Option<String>) -> ChatlingoResult<()>;
}

/// 内存保管库，用于命令行和测试
#[derive(Default)]
pub struct MemoryVault {
    secret: RefCell<Option<String>>,
}

impl MemoryVault {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_secret(secret: impl Into<String>) -> Self {
        Self {
            secret: RefCell::new(Some(secret.into())),
        }
    }
}

#[async_trait(?Send)]
impl SecretVault for MemoryVault {
    async fn has(&self) -> ChatlingoResult<bool> {
        Ok(self.secret.borrow().is_some())
    }

    async fn get(&self) -> ChatlingoResult<Option<SecretHandle>> {
        Ok(self.secret.borrow().clone().map(SecretHandle::new))
    }

    async fn set(&self, secret: Option<String>) -> ChatlingoResult<()> {
        let secret = secret.filter(|s| !s.trim().is_empty());
        if let Some(previous) = self.secret.replace(secret) {
            drop(SecretHandle::new(previous));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handle_wipes_and_redacts() {
        let mut handle = SecretHandle::new("AIza-secret".to_string());
        assert_eq!(handle.expose(), "AIza-secret");
        assert_eq!(format!("{:?}", handle), "SecretHandle([REDACTED])");

        handle.wipe();
        assert!(handle.is_wiped());
        assert_eq!(handle.expose(), "");
    }

    #[tokio::test]
    async fn test_memory_vault() {
        let vault = MemoryVault::new();
        assert!(!vault.has().await.unwrap());
        assert!(vault.get().await.unwrap().is_none());

        vault.set(Some("key".to_string())).await.unwrap();
        assert!(vault.has().await.unwrap());
        assert_eq!(vault.get().await.unwrap().unwrap().expose(), "key");

        // 空白密钥等同于删除
        vault.set(Some("  ".to_string())).await.unwrap();
        assert!(!vault.has().await.unwrap());
    }
}
