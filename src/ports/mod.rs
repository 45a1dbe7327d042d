//! Ports - Traits for the external collaborators of the pipeline.

pub mod callback;
pub mod media_server;
pub mod transcode;
