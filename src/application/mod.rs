//! Application layer - Services that drive the pipeline through ports.

pub mod pipeline;
pub mod transcode;
