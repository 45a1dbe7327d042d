//! Domain layer - Pipeline state, wire formats and manifest assembly.

pub mod cache;
pub mod hls;
pub mod jobs;
pub mod media;
pub mod status;
pub mod trigger;
