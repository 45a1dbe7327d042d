//! Adapters - Concrete implementations of ports, plus the inbound HTTP layer.

pub mod broadcaster;
pub mod callback;
pub mod http;
pub mod mist;
