//! Common infrastructure shared by the netsec crates
//!
//! This crate provides:
//! - Logging bootstrap via `env_logger`, with helpers for trust-decision events
//! - SHA-256 certificate fingerprints used as store aliases and log identifiers

pub mod fingerprint;
pub mod logging;

pub use fingerprint::{sha256_fingerprint, short_fingerprint};
pub use logging::LoggingTransformer;
