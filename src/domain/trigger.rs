//! Media server trigger payloads.

use crate::error::{Error, Result};
use std::str::FromStr;

pub const RECORDING_END: &str = "RECORDING_END";

/// Stream names given to segmenting-phase streams.
pub const SEGMENTING_PREFIX: &str = "catalyst_vod_";

/// Stream names given to transcoding-phase streams.
pub const TRANSCODING_PREFIX: &str = "tr_src_";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pipeline {
    Segmenting,
    Transcoding,
    Unrelated,
}

impl Pipeline {
    pub fn for_stream(stream_name: &str) -> Self {
        if stream_name.starts_with(SEGMENTING_PREFIX) {
            Pipeline::Segmenting
        } else if stream_name.starts_with(TRANSCODING_PREFIX) {
            Pipeline::Transcoding
        } else {
            Pipeline::Unrelated
        }
    }
}

/// Sent whenever an output to file finishes writing.
///
/// The wire format is ten lines separated by `\n`, no trailing newline
/// required. Note that `writing_duration_secs` is how long the write took,
/// not the length of the media.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordingEndPayload {
    pub stream_name: String,
    pub written_filepath: String,
    pub output_protocol: String,
    pub written_bytes: i64,
    pub writing_duration_secs: i64,
    pub connection_start_time_unix: i64,
    pub connection_end_time_unix: i64,
    pub stream_media_duration_millis: i64,
    pub first_media_timestamp_millis: i64,
    pub last_media_timestamp_millis: i64,
}

impl RecordingEndPayload {
    pub fn parse(payload: &str) -> Result<Self> {
        let lines: Vec<&str> = payload.strip_suffix('\n').unwrap_or(payload).split('\n').collect();
        if lines.len() != 10 {
            return Err(Error::PayloadFieldCount {
                got: lines.len(),
                payload: payload.to_string(),
            });
        }

        Ok(Self {
            stream_name: lines[0].to_string(),
            written_filepath: lines[1].to_string(),
            output_protocol: lines[2].to_string(),
            written_bytes: number(&lines, 3)?,
            writing_duration_secs: number(&lines, 4)?,
            connection_start_time_unix: number(&lines, 5)?,
            connection_end_time_unix: number(&lines, 6)?,
            stream_media_duration_millis: number(&lines, 7)?,
            first_media_timestamp_millis: number(&lines, 8)?,
            last_media_timestamp_millis: number(&lines, 9)?,
        })
    }
}

impl FromStr for RecordingEndPayload {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

fn number(lines: &[&str], line: usize) -> Result<i64> {
    lines[line].parse::<i64>().map_err(|source| Error::PayloadNumber {
        line,
        contents: lines[line].to_string(),
        source,
    })
}
