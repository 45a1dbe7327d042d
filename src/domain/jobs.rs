use crate::domain::media::SourceStreamInfo;
use serde::{Deserialize, Serialize};

/// A stream the media server is currently segmenting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamJob {
    pub stream_name: String,
    pub callback_url: String,
    pub source_file: String,
    pub access_token: Option<String>,
    pub transcode_api_url: Option<String>,
    pub upload_url: String,
}

/// Body of an upload request: where to pull the source from, where to write
/// and whom to tell.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct UploadVodRequest {
    pub url: String,
    pub callback_url: String,
    #[serde(default)]
    pub output_locations: Vec<OutputLocation>,
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub transcode_api_url: Option<String>,
    #[serde(default)]
    pub segment_size_secs: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct OutputLocation {
    #[serde(rename = "type", default)]
    pub kind: String,
    pub url: String,
}

/// A stream in the transcoding phase and the targets still being written.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PushJob {
    pub callback_url: String,
    pub source: String,
    pub destinations: Vec<String>,
}

impl PushJob {
    pub fn new(callback_url: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            callback_url: callback_url.into(),
            source: source.into(),
            destinations: Vec::new(),
        }
    }
}

/// Everything one transcode run needs. Built once per stream, never mutated.
#[derive(Debug, Clone, PartialEq)]
pub struct TranscodeSegmentRequest {
    pub source_file: String,
    pub callback_url: String,
    pub access_token: Option<String>,
    pub transcode_api_url: Option<String>,
    pub source_stream_info: SourceStreamInfo,
    pub upload_url: String,
}

impl TranscodeSegmentRequest {
    pub fn from_job(job: &StreamJob, source_stream_info: SourceStreamInfo) -> Self {
        Self {
            source_file: job.source_file.clone(),
            callback_url: job.callback_url.clone(),
            access_token: job.access_token.clone(),
            transcode_api_url: job.transcode_api_url.clone(),
            source_stream_info,
            upload_url: job.upload_url.clone(),
        }
    }
}

/// One rendition returned for a submitted segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenditionSegment {
    /// Media bytes returned inline in the response part.
    Inline { name: String, data: Vec<u8> },
    /// The engine stored the media itself and returned where.
    Reference { name: String, url: String },
}

impl RenditionSegment {
    pub fn name(&self) -> &str {
        match self {
            RenditionSegment::Inline { name, .. } | RenditionSegment::Reference { name, .. } => {
                name
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TranscodeResult {
    pub renditions: Vec<RenditionSegment>,
}

/// Where a finished run wrote its output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutputVideo {
    #[serde(rename = "type")]
    pub kind: String,
    pub manifest: String,
}
