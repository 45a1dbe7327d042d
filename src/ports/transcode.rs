use crate::domain::jobs::{OutputVideo, TranscodeSegmentRequest};
use crate::error::Result;
use async_trait::async_trait;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TranscodePort: Send + Sync {
    /// Transcode every source segment of a stream and write its manifests.
    async fn run(
        &self,
        request: TranscodeSegmentRequest,
        stream_name: &str,
        duration_millis: i64,
    ) -> Result<Vec<OutputVideo>>;
}
