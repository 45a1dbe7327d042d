//! Per-stream job state shared between trigger handlers and background runs.
//!
//! Each phase has its own lock. Locks only ever guard a map access and are
//! never held across I/O; readers get copies, not references into the map.

use crate::domain::jobs::{PushJob, StreamJob};
use crate::error::{Error, Result};
use parking_lot::Mutex;
use std::collections::HashMap;

#[derive(Debug, Default)]
pub struct JobCache {
    pub segmenting: SegmentingCache,
    pub transcoding: TranscodingCache,
}

impl JobCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[derive(Debug, Default)]
pub struct SegmentingCache {
    jobs: Mutex<HashMap<String, StreamJob>>,
}

impl SegmentingCache {
    pub fn store(&self, stream_name: &str, job: StreamJob) {
        self.jobs.lock().insert(stream_name.to_string(), job);
    }

    pub fn get(&self, stream_name: &str) -> Result<StreamJob> {
        self.jobs
            .lock()
            .get(stream_name)
            .cloned()
            .ok_or_else(|| Error::CacheMiss(stream_name.to_string()))
    }

    /// Removes and returns the job under a single lock, so only one caller
    /// can ever claim it.
    pub fn take(&self, stream_name: &str) -> Result<StreamJob> {
        self.jobs
            .lock()
            .remove(stream_name)
            .ok_or_else(|| Error::CacheMiss(stream_name.to_string()))
    }

    pub fn remove(&self, stream_name: &str) {
        self.jobs.lock().remove(stream_name);
    }
}

#[derive(Debug, Default)]
pub struct TranscodingCache {
    pushes: Mutex<HashMap<String, PushJob>>,
}

impl TranscodingCache {
    pub fn store(&self, stream_name: &str, job: PushJob) {
        self.pushes.lock().insert(stream_name.to_string(), job);
    }

    pub fn get(&self, stream_name: &str) -> Result<PushJob> {
        self.pushes
            .lock()
            .get(stream_name)
            .cloned()
            .ok_or_else(|| Error::CacheMiss(stream_name.to_string()))
    }

    /// Appends to an existing job. A destination for an unknown stream is dropped.
    pub fn add_destination(&self, stream_name: &str, destination: &str) {
        if let Some(job) = self.pushes.lock().get_mut(stream_name) {
            if !job.destinations.iter().any(|d| d == destination) {
                job.destinations.push(destination.to_string());
            }
        }
    }

    /// Returns true when the job has no destinations left, so the caller can
    /// evict it. Unknown streams report false.
    pub fn remove_push_destination(&self, stream_name: &str, destination: &str) -> bool {
        let mut pushes = self.pushes.lock();
        match pushes.get_mut(stream_name) {
            Some(job) => {
                if let Some(pos) = job.destinations.iter().position(|d| d == destination) {
                    job.destinations.swap_remove(pos);
                }
                job.destinations.is_empty()
            }
            None => false,
        }
    }

    pub fn remove(&self, stream_name: &str) {
        self.pushes.lock().remove(stream_name);
    }
}
