//! # Netsec Trust
//!
//! Pluggable TLS trust decisions for HTTPS clients.
//!
//! ## Features
//!
//! - **Composition**: combine validators under AND/OR logic with [`CompositeTrustEngine`]
//! - **Pinning**: trust specific certificates or private CAs with [`PinnedValidator`]
//! - **Memorization**: trust-on-first-use with per-host persistent and transient stores
//! - **Domain scoping**: restrict memorization with [`DomainMatchRule`] expressions
//! - **rustls integration**: [`TrustEngineVerifier`] plugs the engine into a `ClientConfig`
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use netsec_trust::{MemorizationOptions, TrustEngineBuilder};
//!
//! # fn main() -> netsec_trust::Result<()> {
//! let builder = TrustEngineBuilder::new()
//!     .use_default()
//!     .or()
//!     .memorize(MemorizationOptions::new("./memo", "sekrit").no_tofu())?;
//!
//! let engine = builder.build();
//! let scope = engine.on_before_handshake("example.com");
//! # let chain = netsec_trust::CertificateChain::default();
//! match scope.validate(&chain, "ECDHE_RSA") {
//!     Ok(_trusted) => {}
//!     Err(rejection) if rejection.is_memorization() => {
//!         // ask the user, then approve the chain carried by the rejection
//!         if let Some(memo) = builder.memorizer() {
//!             memo.memorize_rejection(&rejection)?;
//!         }
//!     }
//!     Err(other) => return Err(other),
//! }
//! # Ok(())
//! # }
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::return_self_not_must_use)]

pub mod builder;
pub mod chain;
pub mod composite;
pub mod config;
pub mod domain_rule;
pub mod error;
pub mod store;
pub mod tls;
pub mod validator;

pub use builder::TrustEngineBuilder;
pub use chain::CertificateChain;
pub use composite::{CompositeTrustEngine, HandshakeScope, MatchMode, ObserverHandle};
pub use config::{
    ApplicationConfig, ConfigSource, ConfigValidator, DomainPattern, JsonConfigSource,
    NetworkSecurityConfig, TrustAnchors,
};
pub use domain_rule::DomainMatchRule;
pub use error::{Result, TrustDecision, TrustError};
pub use store::{
    CertificateStore, HostKeyedStoreCache, KeystoreFile, MemorizingStore, StoreState,
    DEFAULT_CACHE_SIZE,
};
pub use tls::{TrustEngineVerifier, TrustedConnector};
pub use validator::{
    CertChainObserver, ChainValidator, DenyAllValidator, LoggingChainObserver,
    MemorizationOptions, MemorizingValidator, PinnedValidator, SystemDefaultValidator,
    ValidatorKind,
};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::{
        CertificateChain, ChainValidator, CompositeTrustEngine, DomainMatchRule,
        MemorizationOptions, MemorizingValidator, Result, TrustDecision, TrustEngineBuilder,
        TrustError,
    };
}
