//! Validator that trusts nothing

use super::{ChainValidator, ValidatorKind};
use crate::chain::CertificateChain;
use crate::error::{Result, TrustDecision, TrustError};

/// Rejects every chain
///
/// Placed in an OR group it has no effect; in an AND group it blocks all
/// traffic, which is useful for hosts that must never be contacted.
#[derive(Debug, Default, Clone, Copy)]
pub struct DenyAllValidator;

impl ChainValidator for DenyAllValidator {
    fn check_server_trusted(
        &self,
        _chain: &CertificateChain,
        _auth_type: &str,
        host: Option<&str>,
    ) -> TrustDecision {
        Err(TrustError::not_trusted(format!(
            "all certificates denied for {}",
            host.unwrap_or("<unknown>")
        )))
    }

    fn check_client_trusted(&self, _chain: &CertificateChain, _auth_type: &str) -> Result<()> {
        Err(TrustError::not_trusted("all client certificates denied"))
    }

    fn kind(&self) -> ValidatorKind {
        ValidatorKind::DenyAll
    }
}
