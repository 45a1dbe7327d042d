//! Source media description and output profile selection.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

const MIN_VIDEO_BITRATE: i64 = 100_000;
const ABSOLUTE_MIN_VIDEO_BITRATE: i64 = 5_000;

/// Track metadata as reported by the media server (`json_{stream}.js`).
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SourceStreamInfo {
    #[serde(default)]
    pub meta: StreamMeta,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct StreamMeta {
    /// Keyed by track name, e.g. `video_H264_1`. Ordered so iteration is stable.
    #[serde(default)]
    pub tracks: BTreeMap<String, TrackInfo>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct TrackInfo {
    #[serde(rename = "type")]
    pub kind: String,
    pub codec: String,
    pub firstms: i64,
    pub lastms: i64,
    pub width: i64,
    pub height: i64,
    /// Bytes per second.
    pub bps: i64,
    /// Frames per kilosecond.
    pub fpks: i64,
    pub channels: i64,
    pub rate: i64,
    pub size: i64,
}

impl SourceStreamInfo {
    /// Length of the source video in milliseconds, taken from the video track's
    /// last timestamp. Zero when no video track is present.
    pub fn video_length_millis(&self) -> i64 {
        self.meta
            .tracks
            .iter()
            .filter(|(name, _)| name.contains("video"))
            .map(|(_, track)| track.lastms)
            .last()
            .unwrap_or(0)
    }

    /// Rebuilds the input description reported back to the caller.
    pub fn to_input_video(&self, duration_millis: i64, size_bytes: i64) -> InputVideo {
        InputVideo {
            format: "mp4".to_string(),
            duration: duration_millis as f64 / 1000.0,
            size_bytes,
            tracks: self
                .meta
                .tracks
                .values()
                .map(|track| InputTrack {
                    kind: track.kind.clone(),
                    codec: track.codec.clone(),
                    bitrate: track.bps * 8,
                    duration_sec: (track.lastms - track.firstms) as f64 / 1000.0,
                    start_time_sec: track.firstms as f64 / 1000.0,
                    width: track.width,
                    height: track.height,
                    fps: track.fpks as f64 / 1000.0,
                    channels: track.channels,
                    sample_rate: track.rate,
                    sample_bits: track.size,
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct InputVideo {
    pub format: String,
    pub duration: f64,
    pub size_bytes: i64,
    pub tracks: Vec<InputTrack>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct InputTrack {
    #[serde(rename = "type")]
    pub kind: String,
    pub codec: String,
    pub bitrate: i64,
    pub duration_sec: f64,
    pub start_time_sec: f64,
    pub width: i64,
    pub height: i64,
    pub fps: f64,
    pub channels: i64,
    pub sample_rate: i64,
    pub sample_bits: i64,
}

impl InputVideo {
    pub fn video_track(&self) -> Option<&InputTrack> {
        self.tracks.iter().find(|t| t.kind == "video")
    }
}

/// One output rendition requested from the transcoding engine.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EncodedProfile {
    pub name: String,
    pub width: i64,
    pub height: i64,
    pub bitrate: i64,
    pub fps: u32,
}

fn ladder() -> [EncodedProfile; 3] {
    [
        EncodedProfile {
            name: "360p0".to_string(),
            width: 640,
            height: 360,
            bitrate: 1_000_000,
            fps: 0,
        },
        EncodedProfile {
            name: "720p0".to_string(),
            width: 1280,
            height: 720,
            bitrate: 4_000_000,
            fps: 0,
        },
        EncodedProfile {
            name: "1080p0".to_string(),
            width: 1920,
            height: 1080,
            bitrate: 5_000_000,
            fps: 0,
        },
    ]
}

/// Picks the renditions to produce for an input: every ladder entry strictly
/// below the source in height and bitrate, then the source quality itself.
pub fn playback_profiles(input: &InputVideo) -> Result<Vec<EncodedProfile>> {
    let video = input
        .video_track()
        .ok_or_else(|| Error::validation("no video track found in input video"))?;

    let mut profiles: Vec<EncodedProfile> = ladder()
        .into_iter()
        .filter(|p| p.height < video.height && p.bitrate < video.bitrate)
        .collect();

    if profiles.is_empty() {
        profiles.push(low_bitrate_profile(video));
    }

    profiles.push(EncodedProfile {
        name: format!("{}p0", video.height),
        width: video.width,
        height: video.height,
        bitrate: video.bitrate,
        fps: 0,
    });
    Ok(profiles)
}

fn low_bitrate_profile(video: &InputTrack) -> EncodedProfile {
    let mut bitrate = video.bitrate / 2;
    if bitrate < MIN_VIDEO_BITRATE && video.bitrate > MIN_VIDEO_BITRATE {
        bitrate = MIN_VIDEO_BITRATE;
    } else if bitrate < ABSOLUTE_MIN_VIDEO_BITRATE {
        bitrate = ABSOLUTE_MIN_VIDEO_BITRATE;
    }
    EncodedProfile {
        name: "low-bitrate".to_string(),
        width: video.width,
        height: video.height,
        bitrate,
        fps: 0,
    }
}
