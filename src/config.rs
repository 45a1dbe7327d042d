//! Configuration loaded from the environment.

use std::env;
use std::time::Duration;

/// The transcoding engine retries internally, so a single generous timeout is used.
pub const TRANSCODE_TIMEOUT: Duration = Duration::from_secs(3 * 60);

/// Media server API and status callback calls.
pub const API_TIMEOUT: Duration = Duration::from_secs(10);

/// Segment size requested from the media server when none is given.
pub const DEFAULT_SEGMENT_SIZE_SECS: u32 = 10;

/// Largest segment size a caller may request.
pub const MAX_SEGMENT_SIZE_SECS: u32 = 20;

/// Subdirectory of the upload target that holds the source segments.
pub const SEGMENTING_SUBDIR: &str = "source";

/// Manifest name used for the segmented source and for every output manifest.
pub const MANIFEST_NAME: &str = "index.m3u8";

#[derive(Clone, Debug)]
pub struct Config {
    /// HTTP server bind address
    pub addr: String,
    /// HTTP server port
    pub port: String,
    /// Media server command API (form-encoded `command=` posts)
    pub mist_api_url: String,
    /// Media server HTTP output, serves `json_{stream}.js`
    pub mist_http_url: String,
    /// Default transcoding engine base URL
    pub broadcaster_url: String,
    /// How many segments of one run are in flight at once
    pub transcoding_parallel_jobs: usize,
    /// Segment size requested when an upload does not name one
    pub segment_size_secs: u32,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        dotenv::dotenv().ok();

        Self {
            addr: env::var("ADDR").unwrap_or_else(|_| String::from("127.0.0.1")),
            port: env::var("PORT").unwrap_or_else(|_| String::from("4949")),
            mist_api_url: env::var("MIST_API_URL")
                .unwrap_or_else(|_| String::from("http://127.0.0.1:4242/api2")),
            mist_http_url: env::var("MIST_HTTP_URL")
                .unwrap_or_else(|_| String::from("http://127.0.0.1:8080")),
            broadcaster_url: env::var("BROADCASTER_URL")
                .unwrap_or_else(|_| String::from("http://127.0.0.1:8935")),
            transcoding_parallel_jobs: env::var("TRANSCODING_PARALLEL_JOBS")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|n: &usize| *n > 0)
                .unwrap_or(2),
            segment_size_secs: env::var("SEGMENT_SIZE_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|n: &u32| *n > 0 && *n <= MAX_SEGMENT_SIZE_SECS)
                .unwrap_or(DEFAULT_SEGMENT_SIZE_SECS),
        }
    }
}
