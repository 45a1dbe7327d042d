use crate::domain::media::SourceStreamInfo;
use crate::error::Result;
use async_trait::async_trait;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MediaServerPort: Send + Sync {
    /// Register a stream that pulls from `source_url`.
    async fn add_stream(&self, stream_name: &str, source_url: &str) -> Result<()>;

    /// Start pushing a stream to `target` (segmenting output).
    async fn push_start(&self, stream_name: &str, target: &str) -> Result<()>;

    /// Remove a stream and its trigger registration.
    async fn delete_stream(&self, stream_name: &str) -> Result<()>;

    /// Per-track metadata of the stream source.
    async fn stream_info(&self, stream_name: &str) -> Result<SourceStreamInfo>;
}
