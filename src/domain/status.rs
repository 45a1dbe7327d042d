//! Status updates reported to the caller's callback URL.

use crate::domain::jobs::OutputVideo;
use crate::domain::media::InputVideo;
use serde::Serialize;
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum TranscodeStatus {
    Preparing,
    PreparingCompleted,
    Completed,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusMessage {
    pub status: TranscodeStatus,
    pub completion_ratio: f32,
    pub timestamp: i64,
    #[serde(rename = "type")]
    pub kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub retriable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_spec: Option<InputVideo>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub outputs: Vec<OutputVideo>,
}

impl StatusMessage {
    pub fn progress(status: TranscodeStatus, completion_ratio: f32) -> Self {
        Self {
            status,
            completion_ratio,
            timestamp: now_millis(),
            kind: "video",
            error: None,
            retriable: false,
            video_spec: None,
            outputs: Vec::new(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            error: Some(message.into()),
            ..Self::progress(TranscodeStatus::Error, 1.0)
        }
    }

    pub fn completed(input: InputVideo, outputs: Vec<OutputVideo>) -> Self {
        Self {
            video_spec: Some(input),
            outputs,
            ..Self::progress(TranscodeStatus::Completed, 1.0)
        }
    }
}

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default()
}
