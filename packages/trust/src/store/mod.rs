//! Certificate storage
//!
//! - `cert_store`: in-memory set of trusted certificates
//! - `keystore`: encrypted per-host keystore files
//! - `memorizing`: per-host persistent and transient tiers with TOFU
//! - `cache`: bounded LRU of memorizing stores keyed by host

pub mod cache;
pub mod cert_store;
pub mod keystore;
pub mod memorizing;

pub use cache::{HostKeyedStoreCache, DEFAULT_CACHE_SIZE};
pub use cert_store::CertificateStore;
pub use keystore::KeystoreFile;
pub use memorizing::{MemorizingStore, StoreState};
