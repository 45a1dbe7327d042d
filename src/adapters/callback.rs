use crate::config::API_TIMEOUT;
use crate::domain::status::StatusMessage;
use crate::error::{Error, Result};
use crate::ports::callback::StatusCallbackPort;
use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;

/// Posts status updates as JSON to the caller's callback URL.
#[derive(Clone, Debug)]
pub struct CallbackClient {
    client: Client,
}

impl CallbackClient {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .timeout(API_TIMEOUT)
            .build()
            .map_err(|e| Error::Callback(format!("building http client: {}", e)))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl StatusCallbackPort for CallbackClient {
    async fn send(&self, callback_url: &str, message: StatusMessage) -> Result<()> {
        debug!(url = %callback_url, status = ?message.status, "sending status callback");
        let response = self
            .client
            .post(callback_url)
            .json(&message)
            .send()
            .await
            .map_err(|e| Error::Callback(format!("POST {}: {}", callback_url, e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Callback(format!(
                "POST {} returned {}",
                callback_url, status
            )));
        }
        Ok(())
    }
}
