//! Structured logging bootstrap
//!
//! Library code in the workspace logs through `tracing` with its `log` feature
//! enabled, so installing an `env_logger` backend here is enough to see
//! trust decisions. Levels are controlled with `RUST_LOG`, for example
//! `RUST_LOG=netsec_trust=debug`.

use log::{debug, info, warn};
use std::sync::Once;

use crate::fingerprint::short_fingerprint;

static INIT_LOGGER: Once = Once::new();

/// Logging setup and shared log lines for trust decisions
pub struct LoggingTransformer;

impl LoggingTransformer {
    /// Initialize logging (call once at application startup)
    pub fn init() {
        INIT_LOGGER.call_once(|| {
            env_logger::Builder::from_default_env()
                .format_timestamp_micros()
                .init();

            info!("netsec logging initialized");
        });
    }

    /// Initialize logging for tests; safe to call from every test
    pub fn init_test() {
        let _ = env_logger::Builder::from_default_env()
            .is_test(true)
            .try_init();
    }

    /// Log the outcome of a chain evaluation, identifying the leaf by fingerprint
    pub fn log_decision(validator: &str, host: Option<&str>, leaf_der: &[u8], accepted: bool) {
        let host = host.unwrap_or("<unknown>");
        let leaf = short_fingerprint(leaf_der);

        if accepted {
            debug!("{validator}: accepted chain for {host} (leaf: {leaf})");
        } else {
            debug!("{validator}: rejected chain for {host} (leaf: {leaf})");
        }
    }

    /// Log a write to a memorization store
    pub fn log_memorization(host: &str, leaf_der: &[u8], persistent: bool) {
        let leaf = short_fingerprint(leaf_der);
        let tier = if persistent { "persistent" } else { "transient" };

        info!("Memorized chain for {host} in {tier} store (leaf: {leaf})");
    }

    /// Log a presented chain that differs from what a host has memorized
    pub fn log_mismatch(host: &str, leaf_der: &[u8]) {
        warn!(
            "Certificate for {host} does not match memorized chain (leaf: {})",
            short_fingerprint(leaf_der)
        );
    }
}
