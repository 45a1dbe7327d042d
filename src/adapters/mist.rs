//! Media server (Mist) API client.

use crate::config::API_TIMEOUT;
use crate::domain::media::{SourceStreamInfo, StreamMeta};
use crate::error::{Error, Result};
use crate::ports::media_server::MediaServerPort;
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::{debug, instrument, warn};
use url::form_urlencoded;

#[derive(Clone, Debug)]
pub struct MistClient {
    client: Client,
    api_url: String,
    http_url: String,
}

/// Reply to a command post. Mist reports failures in-band.
#[derive(Debug, Deserialize)]
struct CommandReply {
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct StreamInfoReply {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    meta: StreamMeta,
}

impl MistClient {
    pub fn new(api_url: impl Into<String>, http_url: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(API_TIMEOUT)
            .build()
            .map_err(|e| Error::MediaServer(format!("building http client: {}", e)))?;
        Ok(Self {
            client,
            api_url: api_url.into(),
            http_url: http_url.into().trim_end_matches('/').to_string(),
        })
    }

    async fn send_command(&self, command: Value) -> Result<()> {
        let payload = command_payload(&command)?;
        debug!(url = %self.api_url, %payload, "sending media server command");

        let response = self
            .client
            .post(&self.api_url)
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(payload)
            .send()
            .await
            .map_err(|e| Error::MediaServer(format!("POST {}: {}", self.api_url, e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| Error::MediaServer(format!("reading reply from {}: {}", self.api_url, e)))?;
        if !status.is_success() {
            return Err(Error::MediaServer(format!(
                "POST {} returned {}: {}",
                self.api_url, status, body
            )));
        }

        let reply: CommandReply = serde_json::from_str(&body).map_err(|e| {
            warn!(url = %self.api_url, error = %e, %body, "undecodable media server reply");
            Error::MediaServer(format!("decoding reply from {}: {}", self.api_url, e))
        })?;
        match reply.error {
            Some(error) => Err(Error::MediaServer(error)),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl MediaServerPort for MistClient {
    #[instrument(skip(self))]
    async fn add_stream(&self, stream_name: &str, source_url: &str) -> Result<()> {
        self.send_command(add_stream_command(stream_name, source_url))
            .await
    }

    #[instrument(skip(self))]
    async fn push_start(&self, stream_name: &str, target: &str) -> Result<()> {
        self.send_command(push_start_command(stream_name, target))
            .await
    }

    #[instrument(skip(self))]
    async fn delete_stream(&self, stream_name: &str) -> Result<()> {
        self.send_command(delete_stream_command(stream_name)).await
    }

    #[instrument(skip(self))]
    async fn stream_info(&self, stream_name: &str) -> Result<SourceStreamInfo> {
        let url = format!("{}/json_{}.js", self.http_url, stream_name);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::MediaServer(format!("GET {}: {}", url, e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::MediaServer(format!("GET {} returned {}", url, status)));
        }

        let reply: StreamInfoReply = response
            .json()
            .await
            .map_err(|e| Error::MediaServer(format!("decoding stream info from {}: {}", url, e)))?;
        if let Some(error) = reply.error {
            return Err(Error::MediaServer(format!(
                "stream info for {}: {}",
                stream_name, error
            )));
        }
        Ok(SourceStreamInfo { meta: reply.meta })
    }
}

fn keyed(key: &str, value: Value) -> Value {
    let mut map = Map::new();
    map.insert(key.to_string(), value);
    Value::Object(map)
}

fn add_stream_command(stream_name: &str, source_url: &str) -> Value {
    keyed(
        "addstream",
        keyed(stream_name, json!({ "source": source_url })),
    )
}

fn push_start_command(stream_name: &str, target: &str) -> Value {
    keyed(
        "push_start",
        json!({ "stream": stream_name, "target": target }),
    )
}

fn delete_stream_command(stream_name: &str) -> Value {
    keyed("deletestream", keyed(stream_name, Value::Null))
}

fn command_payload(command: &Value) -> Result<String> {
    let command = serde_json::to_string(command)?;
    Ok(form_urlencoded::Serializer::new(String::new())
        .append_pair("command", &command)
        .finish())
}
