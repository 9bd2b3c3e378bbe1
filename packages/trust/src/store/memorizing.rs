//! Per-host memorization with persistent and transient tiers

use std::sync::{Mutex, MutexGuard};

use netsec_common::LoggingTransformer;

use crate::chain::CertificateChain;
use crate::error::{Result, TrustDecision, TrustError};
use crate::store::cert_store::CertificateStore;
use crate::store::keystore::KeystoreFile;

/// Memorization state of a host
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreState {
    /// Nothing memorized in either tier
    Empty,
    /// At least one tier holds certificates
    Learned,
}

#[derive(Debug)]
struct StoreTiers {
    persistent: CertificateStore,
    transient: CertificateStore,
}

/// Memorized certificates for one host
///
/// The persistent tier mirrors the host's keystore file and is the source of
/// truth across restarts. The transient tier only lives in memory. Every
/// operation, including validation, takes the same lock because validation
/// can write on first use.
#[derive(Debug)]
pub struct MemorizingStore {
    host: String,
    keystore: KeystoreFile,
    tiers: Mutex<StoreTiers>,
}

impl MemorizingStore {
    /// Open the store for `host`, loading its keystore file if present
    pub fn open(host: impl Into<String>, keystore: KeystoreFile) -> Result<Self> {
        let host = host.into();
        let persistent = CertificateStore::from_certificates(keystore.load()?);

        tracing::debug!(
            "Opened memorization store for {host} ({} persistent certificates)",
            persistent.len()
        );

        Ok(Self {
            host,
            keystore,
            tiers: Mutex::new(StoreTiers {
                persistent,
                transient: CertificateStore::new(),
            }),
        })
    }

    /// Host this store belongs to
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Backing keystore file
    pub fn keystore(&self) -> &KeystoreFile {
        &self.keystore
    }

    /// Current memorization state
    pub fn state(&self) -> Result<StoreState> {
        let tiers = self.lock()?;
        Ok(if tiers.persistent.is_empty() && tiers.transient.is_empty() {
            StoreState::Empty
        } else {
            StoreState::Learned
        })
    }

    /// Validate `chain` against memorized certificates
    ///
    /// With nothing memorized, `trust_on_first_use` decides between
    /// persisting the chain and rejecting it as not memorized. With
    /// something memorized, a chain matching neither tier is a mismatch.
    pub fn check_server_trusted(
        &self,
        chain: &CertificateChain,
        _auth_type: &str,
        trust_on_first_use: bool,
    ) -> TrustDecision {
        let leaf = chain
            .leaf()
            .ok_or_else(|| TrustError::not_trusted("empty certificate chain"))?;

        let mut tiers = self.lock()?;

        let persistent = tiers.persistent.validates(chain, None);
        if persistent.is_ok() {
            return Ok(chain.clone());
        }

        let transient = tiers.transient.validates(chain, None);
        if transient.is_ok() {
            return Ok(chain.clone());
        }

        if tiers.persistent.is_empty() && tiers.transient.is_empty() {
            if !trust_on_first_use {
                return Err(TrustError::NotMemorized {
                    chain: chain.clone(),
                    host: self.host.clone(),
                });
            }

            self.persist(&mut tiers, chain)?;
            tracing::info!("Trusted first certificate seen for {}", self.host);
            return Ok(chain.clone());
        }

        LoggingTransformer::log_mismatch(&self.host, leaf.as_ref());

        let cause = if tiers.persistent.is_empty() {
            transient
        } else {
            persistent
        };
        Err(TrustError::MemorizationMismatch {
            chain: chain.clone(),
            host: self.host.clone(),
            cause: Box::new(cause.err().unwrap_or_else(|| {
                TrustError::not_trusted("chain does not match memorized certificates")
            })),
        })
    }

    /// Trust `chain` permanently, writing it to the keystore file
    pub fn memorize(&self, chain: &CertificateChain) -> Result<()> {
        let mut tiers = self.lock()?;
        self.persist(&mut tiers, chain)
    }

    /// Trust `chain` until the process ends or this store is discarded
    pub fn memorize_for_now(&self, chain: &CertificateChain) -> Result<()> {
        let mut tiers = self.lock()?;
        tiers.transient.insert_chain(chain);

        if let Some(leaf) = chain.leaf() {
            LoggingTransformer::log_memorization(&self.host, leaf.as_ref(), false);
        }
        Ok(())
    }

    /// Forget the transient tier and, if `clear_persistent`, the keystore file
    ///
    /// Without `clear_persistent` the persistent tier is reloaded from disk.
    pub fn clear(&self, clear_persistent: bool) -> Result<()> {
        let mut tiers = self.lock()?;
        tiers.transient.clear();

        if clear_persistent {
            self.keystore.delete()?;
            tiers.persistent.clear();
            tracing::info!("Cleared persistent memorization for {}", self.host);
        } else {
            tiers.persistent = CertificateStore::from_certificates(self.keystore.load()?);
        }
        Ok(())
    }

    /// Drop the in-memory transient tier; used on cache eviction
    pub(crate) fn discard_transient(&self) {
        match self.tiers.lock() {
            Ok(mut tiers) => tiers.transient.clear(),
            Err(poisoned) => poisoned.into_inner().transient.clear(),
        }
    }

    fn persist(&self, tiers: &mut StoreTiers, chain: &CertificateChain) -> Result<()> {
        let mut updated = tiers.persistent.clone();
        updated.insert_chain(chain);

        // Disk is updated before memory
        self.keystore.save(&updated.certificates())?;
        tiers.persistent = updated;

        if let Some(leaf) = chain.leaf() {
            LoggingTransformer::log_memorization(&self.host, leaf.as_ref(), true);
        }
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, StoreTiers>> {
        self.tiers
            .lock()
            .map_err(|_| TrustError::poisoned("memorization store"))
    }
}
