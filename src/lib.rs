//! Vodline - VOD segmenting and transcoding pipeline
//!
//! Hexagonal Architecture:
//! - domain/: Pure pipeline logic (job cache, trigger payloads, profiles, hls)
//! - ports/: Trait definitions for the media server, callbacks and transcoding
//! - adapters/: Concrete HTTP clients and the inbound axum router
//! - application/: Pipeline controller and transcode runs
//! - config: Environment configuration

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod error;
pub mod ports;

pub use error::{Error, Result};
