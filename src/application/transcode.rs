//! One transcode run: every source segment of a stream through the engine,
//! rendition media written next to the source, manifests on top.

use crate::adapters::broadcaster::BroadcasterClient;
use crate::config::{API_TIMEOUT, MANIFEST_NAME, SEGMENTING_SUBDIR};
use crate::domain::hls::{
    check_rendition_name, generate_manifests, read_media_playlist, source_segment_urls,
    RenditionStats, SourceSegment,
};
use crate::domain::jobs::{OutputVideo, RenditionSegment, TranscodeSegmentRequest};
use crate::domain::media::{playback_profiles, EncodedProfile};
use crate::error::{Error, Result};
use crate::ports::transcode::TranscodePort;
use async_trait::async_trait;
use futures::{stream, StreamExt, TryStreamExt};
use reqwest::{Body, Client};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio_util::io::ReaderStream;
use tracing::{debug, info};
use url::Url;
use uuid::Uuid;

pub const OUTPUT_KIND: &str = "object_store";

pub struct TranscodeService {
    client: Client,
    default_broadcaster: BroadcasterClient,
    parallel_jobs: usize,
}

/// What one segment produced, per rendition.
struct SegmentOutput {
    duration_millis: i64,
    renditions: Vec<(String, u64)>,
}

impl TranscodeService {
    pub fn new(broadcaster_url: &str, parallel_jobs: usize) -> Result<Self> {
        let client = Client::builder()
            .timeout(API_TIMEOUT)
            .build()
            .map_err(|e| Error::protocol(format!("building http client: {}", e)))?;
        Ok(Self {
            client,
            default_broadcaster: BroadcasterClient::new(broadcaster_url)?,
            parallel_jobs: parallel_jobs.max(1),
        })
    }

    fn broadcaster_for(&self, request: &TranscodeSegmentRequest) -> Result<BroadcasterClient> {
        match request.transcode_api_url.as_deref().filter(|u| !u.is_empty()) {
            Some(url) => Ok(BroadcasterClient::new(url)?
                .with_access_token(request.access_token.clone())),
            None => Ok(self.default_broadcaster.clone()),
        }
    }

    async fn open_segment(&self, location: &str) -> Result<Body> {
        match Url::parse(location) {
            Ok(url) if url.scheme() == "http" || url.scheme() == "https" => {
                let response = self
                    .client
                    .get(url.clone())
                    .send()
                    .await
                    .and_then(|r| r.error_for_status())
                    .map_err(|e| Error::protocol(format!("fetching segment {}: {}", url, e)))?;
                Ok(Body::wrap_stream(response.bytes_stream()))
            }
            Ok(url) if url.scheme() == "file" => {
                let path = url
                    .to_file_path()
                    .map_err(|_| Error::UnsupportedLocation(location.to_string()))?;
                open_file(&path).await
            }
            Ok(_) => Err(Error::UnsupportedLocation(location.to_string())),
            Err(_) => open_file(Path::new(location)).await,
        }
    }

    async fn rendition_bytes(&self, rendition: RenditionSegment) -> Result<(String, Vec<u8>)> {
        match rendition {
            RenditionSegment::Inline { name, data } => Ok((name, data)),
            RenditionSegment::Reference { name, url } => {
                let data = self
                    .client
                    .get(&url)
                    .send()
                    .await
                    .and_then(|r| r.error_for_status())
                    .map_err(|e| Error::protocol(format!("fetching rendition {}: {}", url, e)))?
                    .bytes()
                    .await
                    .map_err(|e| Error::protocol(format!("reading rendition {}: {}", url, e)))?;
                Ok((name, data.to_vec()))
            }
        }
    }

    async fn transcode_segment(
        &self,
        broadcaster: &BroadcasterClient,
        segment: &SourceSegment,
        sequence_number: usize,
        profiles: &[EncodedProfile],
        manifest_id: &str,
        output_dir: &Path,
    ) -> Result<SegmentOutput> {
        let body = self.open_segment(&segment.location).await?;
        let result = broadcaster
            .transcode_segment(
                body,
                sequence_number as i64,
                profiles,
                segment.duration_millis,
                manifest_id,
            )
            .await?;

        let mut renditions = Vec::with_capacity(result.renditions.len());
        for rendition in result.renditions {
            check_rendition_name(rendition.name())?;
            let (name, data) = self.rendition_bytes(rendition).await?;
            let dir = output_dir.join(&name);
            fs::create_dir_all(&dir).await?;
            fs::write(dir.join(&segment.file_name), &data).await?;
            renditions.push((name, data.len() as u64));
        }

        debug!(
            segment = %segment.location,
            sequence_number,
            renditions = renditions.len(),
            "segment written"
        );
        Ok(SegmentOutput {
            duration_millis: segment.duration_millis,
            renditions,
        })
    }
}

#[async_trait]
impl TranscodePort for TranscodeService {
    async fn run(
        &self,
        request: TranscodeSegmentRequest,
        stream_name: &str,
        duration_millis: i64,
    ) -> Result<Vec<OutputVideo>> {
        let output_dir = local_path(&request.upload_url)?;
        let source_manifest = output_dir.join(SEGMENTING_SUBDIR).join(MANIFEST_NAME);
        let playlist = read_media_playlist(&source_manifest).await?;
        let segments = source_segment_urls(&source_manifest.to_string_lossy(), &playlist)?;
        if segments.is_empty() {
            return Err(Error::Manifest(format!(
                "source manifest {} has no segments",
                source_manifest.display()
            )));
        }

        let input = request
            .source_stream_info
            .to_input_video(duration_millis, 0);
        let profiles = playback_profiles(&input)?;
        let source_fps = input.video_track().map(|t| t.fps).unwrap_or_default();
        let broadcaster = self.broadcaster_for(&request)?;
        let manifest_id = Uuid::new_v4().to_string();

        info!(
            stream_name,
            manifest_id = %manifest_id,
            segments = segments.len(),
            profiles = profiles.len(),
            "starting transcode"
        );

        let outputs: Vec<SegmentOutput> = stream::iter(segments.iter().enumerate())
            .map(|(seq, segment)| {
                self.transcode_segment(
                    &broadcaster,
                    segment,
                    seq,
                    &profiles,
                    &manifest_id,
                    &output_dir,
                )
            })
            .buffered(self.parallel_jobs)
            .try_collect()
            .await?;

        let stats = rendition_stats(&outputs, &profiles, source_fps);
        if stats.is_empty() {
            return Err(Error::protocol("transcoding engine returned no renditions"));
        }
        let master = generate_manifests(&playlist, &output_dir, &stats).await?;

        info!(stream_name, manifest = %master.display(), "transcode finished");
        Ok(vec![OutputVideo {
            kind: OUTPUT_KIND.to_string(),
            manifest: master.to_string_lossy().into_owned(),
        }])
    }
}

async fn open_file(path: &Path) -> Result<Body> {
    let file = fs::File::open(path).await?;
    Ok(Body::wrap_stream(ReaderStream::new(file)))
}

/// Output targets are local directories, given as a path or a `file://` URL.
pub fn local_path(location: &str) -> Result<PathBuf> {
    match Url::parse(location) {
        Ok(url) if url.scheme() == "file" => url
            .to_file_path()
            .map_err(|_| Error::UnsupportedLocation(location.to_string())),
        Ok(_) => Err(Error::UnsupportedLocation(location.to_string())),
        Err(_) if !location.is_empty() => Ok(PathBuf::from(location)),
        Err(_) => Err(Error::UnsupportedLocation(location.to_string())),
    }
}

/// Totals bytes and durations per rendition across all segments. Renditions
/// keep profile order; names the engine returned that were not requested
/// follow in the order first seen.
fn rendition_stats(
    outputs: &[SegmentOutput],
    profiles: &[EncodedProfile],
    source_fps: f64,
) -> Vec<RenditionStats> {
    let mut names: Vec<&str> = Vec::new();
    for profile in profiles {
        names.push(&profile.name);
    }
    for output in outputs {
        for (name, _) in &output.renditions {
            if !names.contains(&name.as_str()) {
                names.push(name);
            }
        }
    }

    names
        .into_iter()
        .filter_map(|name| {
            let mut bytes = 0u64;
            let mut millis = 0i64;
            let mut seen = false;
            for output in outputs {
                for (rendition, size) in &output.renditions {
                    if rendition == name {
                        bytes += size;
                        millis += output.duration_millis;
                        seen = true;
                    }
                }
            }
            if !seen {
                return None;
            }

            let profile = profiles.iter().find(|p| p.name == name);
            let bits_per_second = if millis > 0 {
                bytes * 8 * 1000 / millis as u64
            } else {
                0
            };
            let fps = match profile {
                Some(p) if p.fps > 0 => p.fps as f64,
                _ => source_fps,
            };
            Some(RenditionStats {
                name: name.to_string(),
                fps,
                width: profile.map(|p| p.width).unwrap_or_default(),
                height: profile.map(|p| p.height).unwrap_or_default(),
                bits_per_second,
            })
        })
        .collect()
}
