//! Segment submission to the transcoding engine.
//!
//! One POST per segment; the engine answers with a `multipart/mixed` body
//! holding one part per rendition.

use crate::config::TRANSCODE_TIMEOUT;
use crate::domain::jobs::{RenditionSegment, TranscodeResult};
use crate::domain::media::EncodedProfile;
use crate::error::{Error, Result};
use bytes::Bytes;
use futures::Stream;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::{Body, Client};
use serde::Serialize;
use tracing::debug;
use url::Url;

pub const TRANSCODE_CONFIG_HEADER: &str = "Livepeer-Transcode-Configuration";
pub const RENDITION_NAME_HEADER: &str = "Rendition-Name";
pub const RENDITION_URI_MEDIA_TYPE: &str = "application/vnd+livepeer.uri";

const MAX_ERROR_BODY_CHARS: usize = 10_000;
const TIMEOUT_MULTIPLIER: u32 = 10;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TranscodeConfiguration<'a> {
    profiles: &'a [EncodedProfile],
    timeout_multiplier: u32,
}

#[derive(Clone, Debug)]
pub struct BroadcasterClient {
    client: Client,
    base_url: Url,
    access_token: Option<String>,
}

impl BroadcasterClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(TRANSCODE_TIMEOUT)
            .build()
            .map_err(|e| Error::protocol(format!("building http client: {}", e)))?;
        Self::with_client(client, base_url)
    }

    pub fn with_client(client: Client, base_url: &str) -> Result<Self> {
        let base_url = Url::parse(base_url).map_err(|e| {
            Error::protocol(format!("error parsing broadcaster URL {:?}: {}", base_url, e))
        })?;
        Ok(Self {
            client,
            base_url,
            access_token: None,
        })
    }

    /// Sent as bearer credentials, for engines that are not the local one.
    pub fn with_access_token(mut self, token: Option<String>) -> Self {
        self.access_token = token.filter(|t| !t.is_empty());
        self
    }

    pub async fn transcode_segment(
        &self,
        segment: Body,
        sequence_number: i64,
        profiles: &[EncodedProfile],
        duration_millis: i64,
        manifest_id: &str,
    ) -> Result<TranscodeResult> {
        let request_url = self
            .base_url
            .join(&format!("live/{}/{}.ts", manifest_id, sequence_number))
            .map_err(|e| {
                Error::protocol(format!(
                    "appending stream to broadcaster url {}: {}",
                    self.base_url, e
                ))
            })?;

        let config = serde_json::to_string(&TranscodeConfiguration {
            profiles,
            timeout_multiplier: TIMEOUT_MULTIPLIER,
        })
        .map_err(|e| Error::protocol(format!("profiles json encode failed: {}", e)))?;

        let mut request = self
            .client
            .post(request_url.clone())
            .header(CONTENT_TYPE, "video/mp2t")
            .header(ACCEPT, "multipart/mixed")
            .header("Content-Duration", duration_millis.to_string())
            .header(TRANSCODE_CONFIG_HEADER, config)
            .body(segment);
        if let Some(token) = &self.access_token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| Error::protocol(format!("http do({}): {}", request_url, e)))?;

        let status = response.status();
        if !status.is_success() {
            // The engine often explains itself in the body; a failed read leaves it empty.
            let body = response.text().await.unwrap_or_default();
            return Err(Error::protocol(format!(
                "http POST({}) returned {}. Response Body: {}",
                request_url,
                status,
                truncate_body(&body)
            )));
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        let media_type: mime::Mime = content_type.parse().map_err(|e| {
            Error::protocol(format!(
                "http POST({}) ParseMediaType({}): {}",
                request_url, content_type, e
            ))
        })?;
        if media_type.essence_str() != "multipart/mixed" {
            return Err(Error::protocol(format!(
                "http POST({}) mediaType == {}",
                request_url,
                media_type.essence_str()
            )));
        }
        let boundary = media_type
            .get_param(mime::BOUNDARY)
            .map(|b| b.as_str().to_string())
            .ok_or_else(|| {
                Error::protocol(format!("http POST({}) multipart without boundary", request_url))
            })?;

        let result = decode_multipart(response.bytes_stream(), boundary).await?;
        debug!(
            url = %request_url,
            renditions = result.renditions.len(),
            "segment transcoded"
        );
        Ok(result)
    }
}

fn truncate_body(body: &str) -> String {
    if body.chars().count() <= MAX_ERROR_BODY_CHARS {
        return body.to_string();
    }
    let mut truncated: String = body.chars().take(MAX_ERROR_BODY_CHARS).collect();
    truncated.push_str("<truncated>");
    truncated
}

/// Decodes a `multipart/mixed` body into renditions, keeping part order.
pub async fn decode_multipart<S, E>(stream: S, boundary: String) -> Result<TranscodeResult>
where
    S: Stream<Item = std::result::Result<Bytes, E>> + Send + 'static,
    E: Into<Box<dyn std::error::Error + Send + Sync>> + 'static,
{
    let mut multipart = multer::Multipart::new(stream, boundary);
    let mut result = TranscodeResult::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| Error::protocol(format!("multipart next part: {}", e)))?
    {
        let name = field
            .headers()
            .get(RENDITION_NAME_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        let media_type = field
            .content_type()
            .map(|m| m.essence_str().to_string())
            .ok_or_else(|| {
                Error::protocol(format!(
                    "multipart part {:?} has no valid content type",
                    name
                ))
            })?;
        let body = field
            .bytes()
            .await
            .map_err(|e| Error::protocol(format!("multipart read part {:?}: {}", name, e)))?;

        if media_type == RENDITION_URI_MEDIA_TYPE {
            let url = String::from_utf8(body.to_vec()).map_err(|e| {
                Error::protocol(format!("multipart part {:?} has a non-utf8 uri: {}", name, e))
            })?;
            result.renditions.push(RenditionSegment::Reference { name, url });
        } else {
            result.renditions.push(RenditionSegment::Inline {
                name,
                data: body.to_vec(),
            });
        }
    }
    Ok(result)
}
