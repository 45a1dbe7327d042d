//! Drives a stream from segmenting to transcoding to a final callback.
//!
//! The media server tells us through triggers when it has finished writing a
//! stream's segments. The trigger handler does the quick bookkeeping inline
//! and hands the transcode run to a background task, so the media server is
//! never kept waiting on the transcoding engine.

use crate::application::transcode::local_path;
use crate::config::{MANIFEST_NAME, MAX_SEGMENT_SIZE_SECS, SEGMENTING_SUBDIR};
use crate::domain::cache::JobCache;
use crate::domain::jobs::{OutputVideo, PushJob, StreamJob, TranscodeSegmentRequest, UploadVodRequest};
use crate::domain::status::{StatusMessage, TranscodeStatus};
use crate::domain::trigger::{Pipeline, RecordingEndPayload, SEGMENTING_PREFIX};
use crate::error::{Error, Result};
use crate::ports::callback::StatusCallbackPort;
use crate::ports::media_server::MediaServerPort;
use crate::ports::transcode::TranscodePort;
use parking_lot::Mutex;
use serde::Serialize;
use futures::FutureExt;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Largest accepted gap between the source video length and what was segmented.
pub const DURATION_TOLERANCE_MILLIS: u64 = 500;

/// A failure that was logged and recorded but did not stop the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NonFatalError {
    StreamCleanup { stream_name: String, message: String },
    Callback { status: TranscodeStatus, message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerOutcome {
    /// Not a segmenting-phase stream.
    Ignored,
    /// No segmenting job is stored under this name.
    UnknownStream,
    /// A transcode run was started in the background.
    Launched,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TriggerReport {
    pub outcome: TriggerOutcome,
    pub non_fatal: Vec<NonFatalError>,
}

impl TriggerReport {
    fn new(outcome: TriggerOutcome) -> Self {
        Self {
            outcome,
            non_fatal: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RunOutcome {
    Completed {
        outputs: Vec<OutputVideo>,
    },
    Failed {
        error: String,
    },
    /// Source and segmented lengths disagree; no callback is sent.
    DurationMismatch {
        source_millis: i64,
        segmented_millis: i64,
    },
    /// Track metadata could not be fetched; no callback is sent.
    StreamInfoUnavailable {
        error: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunReport {
    pub stream_name: String,
    #[serde(flatten)]
    pub outcome: RunOutcome,
    pub non_fatal: Vec<NonFatalError>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RunState {
    Running,
    Finished(RunReport),
}

enum RunEntry {
    Running(JoinHandle<RunReport>),
    Finished(RunReport),
}

/// Finished reports kept for status queries before the oldest are dropped.
pub const RETAINED_RUNS: usize = 256;

#[derive(Default)]
struct Runs {
    entries: HashMap<String, RunEntry>,
    /// Names of finished entries, oldest first.
    finished: VecDeque<String>,
}

impl Runs {
    fn finish(&mut self, stream_name: &str, report: RunReport, capacity: usize) {
        self.finished.retain(|name| name != stream_name);
        self.finished.push_back(stream_name.to_string());
        self.entries
            .insert(stream_name.to_string(), RunEntry::Finished(report));
        while self.finished.len() > capacity {
            if let Some(oldest) = self.finished.pop_front() {
                self.entries.remove(&oldest);
            }
        }
    }

    /// Settles runs whose task has ended but that nobody has polled yet.
    fn retire_finished(&mut self, capacity: usize) {
        let done: Vec<String> = self
            .entries
            .iter()
            .filter_map(|(name, entry)| match entry {
                RunEntry::Running(handle) if handle.is_finished() => Some(name.clone()),
                _ => None,
            })
            .collect();

        for name in done {
            let Some(RunEntry::Running(mut handle)) = self.entries.remove(&name) else {
                continue;
            };
            match (&mut handle).now_or_never() {
                Some(joined) => {
                    let report = report_from(&name, joined);
                    self.finish(&name, report, capacity);
                }
                None => {
                    self.entries.insert(name, RunEntry::Running(handle));
                }
            }
        }
    }
}

fn report_from(
    stream_name: &str,
    joined: std::result::Result<RunReport, JoinError>,
) -> RunReport {
    joined.unwrap_or_else(|e| RunReport {
        stream_name: stream_name.to_string(),
        outcome: RunOutcome::Failed {
            error: format!("transcode task ended abnormally: {}", e),
        },
        non_fatal: Vec::new(),
    })
}

/// Background transcode runs, keyed by stream name.
///
/// Running entries are always kept. Finished reports are bounded: past
/// `capacity`, the oldest finished report is dropped.
pub struct RunRegistry {
    capacity: usize,
    runs: Mutex<Runs>,
}

impl Default for RunRegistry {
    fn default() -> Self {
        Self::with_capacity(RETAINED_RUNS)
    }
}

impl RunRegistry {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            runs: Mutex::new(Runs::default()),
        }
    }

    fn insert(&self, stream_name: &str, handle: JoinHandle<RunReport>) {
        let mut runs = self.runs.lock();
        runs.retire_finished(self.capacity);
        runs.finished.retain(|name| name != stream_name);
        runs.entries
            .insert(stream_name.to_string(), RunEntry::Running(handle));
    }

    /// Number of tracked runs, running and finished.
    pub fn len(&self) -> usize {
        self.runs.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_running(&self, stream_name: &str) -> bool {
        matches!(
            self.runs.lock().entries.get(stream_name),
            Some(RunEntry::Running(handle)) if !handle.is_finished()
        )
    }

    /// Current state of a run without waiting on it.
    pub async fn state(&self, stream_name: &str) -> Option<RunState> {
        let handle = {
            let mut runs = self.runs.lock();
            let finished = match runs.entries.get(stream_name)? {
                RunEntry::Finished(report) => return Some(RunState::Finished(report.clone())),
                RunEntry::Running(handle) => handle.is_finished(),
            };
            if !finished {
                return Some(RunState::Running);
            }
            match runs.entries.remove(stream_name) {
                Some(RunEntry::Running(handle)) => handle,
                _ => return None,
            }
        };
        let report = self.settle(stream_name, handle).await;
        Some(RunState::Finished(report))
    }

    /// Waits for a run to finish and returns its report.
    pub async fn wait(&self, stream_name: &str) -> Option<RunReport> {
        let handle = {
            let mut runs = self.runs.lock();
            match runs.entries.get(stream_name)? {
                RunEntry::Finished(report) => return Some(report.clone()),
                RunEntry::Running(_) => {}
            }
            match runs.entries.remove(stream_name) {
                Some(RunEntry::Running(handle)) => handle,
                _ => return None,
            }
        };
        Some(self.settle(stream_name, handle).await)
    }

    async fn settle(&self, stream_name: &str, handle: JoinHandle<RunReport>) -> RunReport {
        let report = report_from(stream_name, handle.await);
        self.runs
            .lock()
            .finish(stream_name, report.clone(), self.capacity);
        report
    }
}

pub struct PipelineController<M, C, T> {
    media_server: Arc<M>,
    callbacks: Arc<C>,
    transcoder: Arc<T>,
    cache: Arc<JobCache>,
    runs: Arc<RunRegistry>,
    segment_size_secs: u32,
}

impl<M, C, T> Clone for PipelineController<M, C, T> {
    fn clone(&self) -> Self {
        Self {
            media_server: self.media_server.clone(),
            callbacks: self.callbacks.clone(),
            transcoder: self.transcoder.clone(),
            cache: self.cache.clone(),
            runs: self.runs.clone(),
            segment_size_secs: self.segment_size_secs,
        }
    }
}

impl<M, C, T> PipelineController<M, C, T>
where
    M: MediaServerPort + 'static,
    C: StatusCallbackPort + 'static,
    T: TranscodePort + 'static,
{
    pub fn new(
        media_server: M,
        callbacks: C,
        transcoder: T,
        cache: Arc<JobCache>,
        segment_size_secs: u32,
    ) -> Self {
        Self {
            media_server: Arc::new(media_server),
            callbacks: Arc::new(callbacks),
            transcoder: Arc::new(transcoder),
            cache,
            runs: Arc::new(RunRegistry::default()),
            segment_size_secs,
        }
    }

    pub fn cache(&self) -> &JobCache {
        &self.cache
    }

    pub fn runs(&self) -> &RunRegistry {
        &self.runs
    }

    /// Starts segmenting an uploaded source and returns the stream name the
    /// media server will report it under.
    pub async fn start_segmenting(&self, request: UploadVodRequest) -> Result<String> {
        if request.url.is_empty() {
            return Err(Error::validation("missing source url"));
        }
        if request.callback_url.is_empty() {
            return Err(Error::validation("missing callback_url"));
        }
        let output = request
            .output_locations
            .first()
            .ok_or_else(|| Error::validation("at least one output location is required"))?;
        local_path(&output.url)
            .map_err(|e| Error::validation(format!("output location: {}", e)))?;
        let segment_size_secs = match request.segment_size_secs {
            Some(0) => return Err(Error::validation("segment_size_secs must be positive")),
            Some(secs) if secs > MAX_SEGMENT_SIZE_SECS => {
                return Err(Error::validation(format!(
                    "segment_size_secs must be at most {}",
                    MAX_SEGMENT_SIZE_SECS
                )))
            }
            Some(secs) => secs,
            None => self.segment_size_secs,
        };

        let stream_name = format!("{}{}", SEGMENTING_PREFIX, Uuid::new_v4().simple());
        let upload_url = output.url.trim_end_matches('/').to_string();
        let job = StreamJob {
            stream_name: stream_name.clone(),
            callback_url: request.callback_url.clone(),
            source_file: request.url.clone(),
            access_token: request.access_token.clone(),
            transcode_api_url: request.transcode_api_url.clone(),
            upload_url: upload_url.clone(),
        };
        self.cache.segmenting.store(&stream_name, job);

        let target = format!(
            "{}/{}/$currentMediaTime.ts?m3u8={}&split={}",
            upload_url, SEGMENTING_SUBDIR, MANIFEST_NAME, segment_size_secs
        );
        let started = async {
            self.media_server
                .add_stream(&stream_name, &request.url)
                .await?;
            self.media_server.push_start(&stream_name, &target).await
        }
        .await;
        if let Err(e) = started {
            error!(stream_name = %stream_name, error = %e, "failed to start segmenting");
            self.cache.segmenting.remove(&stream_name);
            return Err(e);
        }

        if let Err(e) = self
            .callbacks
            .send(
                &request.callback_url,
                StatusMessage::progress(TranscodeStatus::Preparing, 0.0),
            )
            .await
        {
            warn!(stream_name = %stream_name, error = %e, "failed to send preparing callback");
        }

        info!(stream_name = %stream_name, source = %request.url, %target, "segmenting started");
        Ok(stream_name)
    }

    /// Handles a RECORDING_END trigger. Only malformed payloads are errors.
    pub async fn handle_recording_end(&self, raw_payload: &str) -> Result<TriggerReport> {
        let payload = RecordingEndPayload::parse(raw_payload)?;
        let stream_name = payload.stream_name.clone();

        if Pipeline::for_stream(&stream_name) != Pipeline::Segmenting {
            debug!(stream_name = %stream_name, "ignoring RECORDING_END outside the segmenting phase");
            return Ok(TriggerReport::new(TriggerOutcome::Ignored));
        }

        let job = match self.cache.segmenting.take(&stream_name) {
            Ok(job) => job,
            Err(e) => {
                warn!(stream_name = %stream_name, error = %e, "RECORDING_END for unknown stream");
                return Ok(TriggerReport::new(TriggerOutcome::UnknownStream));
            }
        };

        let mut report = TriggerReport::new(TriggerOutcome::Launched);
        if let Err(e) = self.media_server.delete_stream(&stream_name).await {
            warn!(stream_name = %stream_name, error = %e, "failed to delete segmenting stream");
            report.non_fatal.push(NonFatalError::StreamCleanup {
                stream_name: stream_name.clone(),
                message: e.to_string(),
            });
        }

        let status = TranscodeStatus::PreparingCompleted;
        if let Err(e) = self
            .callbacks
            .send(&job.callback_url, StatusMessage::progress(status, 1.0))
            .await
        {
            warn!(stream_name = %stream_name, error = %e, "failed to send preparing-completed callback");
            report.non_fatal.push(NonFatalError::Callback {
                status,
                message: e.to_string(),
            });
        }

        let this = self.clone();
        let handle = tokio::spawn(async move { this.run_transcode(job, payload).await });
        self.runs.insert(&stream_name, handle);
        Ok(report)
    }

    async fn run_transcode(&self, job: StreamJob, payload: RecordingEndPayload) -> RunReport {
        let stream_name = job.stream_name.clone();
        let mut report = RunReport {
            stream_name: stream_name.clone(),
            outcome: RunOutcome::Failed {
                error: String::new(),
            },
            non_fatal: Vec::new(),
        };

        let info = match self.media_server.stream_info(&stream_name).await {
            Ok(info) => info,
            Err(e) => {
                error!(stream_name = %stream_name, error = %e, "failed to fetch source stream info");
                report.outcome = RunOutcome::StreamInfoUnavailable {
                    error: e.to_string(),
                };
                return report;
            }
        };

        let source_millis = info.video_length_millis();
        let segmented_millis = payload.stream_media_duration_millis;
        if source_millis.abs_diff(segmented_millis) > DURATION_TOLERANCE_MILLIS {
            // No callback here; the caller hears nothing for this stream.
            error!(
                stream_name = %stream_name,
                source_millis, segmented_millis, "source and segmented durations differ"
            );
            report.outcome = RunOutcome::DurationMismatch {
                source_millis,
                segmented_millis,
            };
            return report;
        }

        self.cache
            .transcoding
            .store(&stream_name, PushJob::new(&job.callback_url, &job.source_file));
        self.cache
            .transcoding
            .add_destination(&stream_name, &job.upload_url);

        let request = TranscodeSegmentRequest::from_job(&job, info.clone());
        let result = self
            .transcoder
            .run(request, &stream_name, segmented_millis)
            .await;

        if self
            .cache
            .transcoding
            .remove_push_destination(&stream_name, &job.upload_url)
        {
            self.cache.transcoding.remove(&stream_name);
        }

        let message = match result {
            Ok(outputs) => {
                info!(stream_name = %stream_name, outputs = outputs.len(), "transcode completed");
                let input = info.to_input_video(segmented_millis, payload.written_bytes);
                report.outcome = RunOutcome::Completed {
                    outputs: outputs.clone(),
                };
                StatusMessage::completed(input, outputs)
            }
            Err(e) => {
                error!(stream_name = %stream_name, error = %e, "transcode failed");
                report.outcome = RunOutcome::Failed {
                    error: e.to_string(),
                };
                StatusMessage::error(format!("Transcoding Failed: {}", e))
            }
        };

        let status = message.status;
        if let Err(e) = self.callbacks.send(&job.callback_url, message).await {
            warn!(stream_name = %stream_name, error = %e, "failed to send final callback");
            report.non_fatal.push(NonFatalError::Callback {
                status,
                message: e.to_string(),
            });
        }
        report
    }
}
