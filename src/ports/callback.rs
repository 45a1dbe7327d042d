use crate::domain::status::StatusMessage;
use crate::error::Result;
use async_trait::async_trait;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait StatusCallbackPort: Send + Sync {
    /// Deliver one status update. Callers treat failures as non-fatal.
    async fn send(&self, callback_url: &str, message: StatusMessage) -> Result<()>;
}
