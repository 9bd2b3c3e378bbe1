//! AND/OR composition of validators
//!
//! The composite is itself a [`ChainValidator`], which is how grouping
//! works: once two or more children exist, switching mode wraps the current
//! group as a single child of a new composite instead of reinterpreting it.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use rustls::pki_types::CertificateDer;

use crate::chain::CertificateChain;
use crate::error::{Result, TrustDecision, TrustError};
use crate::validator::{CertChainObserver, ChainValidator, ValidatorKind};

static NEXT_OBSERVER_ID: AtomicU64 = AtomicU64::new(1);

/// How child decisions combine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MatchMode {
    /// Every child must accept
    All,
    /// One accepting child is enough
    #[default]
    Any,
}

/// Identifies a registered observer for later removal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverHandle(u64);

#[derive(Clone)]
struct RegisteredObserver {
    handle: ObserverHandle,
    observer: Arc<dyn CertChainObserver>,
}

/// Validators combined under AND or OR logic
///
/// - AND: children run in order, the first rejection is returned and later
///   children are not consulted. The accepted chain is the one returned by
///   the last child.
/// - OR: children run in order, the first acceptance wins. If all reject,
///   the first rejection is returned.
///
/// An empty AND group accepts; an empty OR group rejects. Children that do
/// not [apply](ChainValidator::applies_to) to the host are skipped, and a
/// non-empty group in which no child applies rejects in either mode.
/// Observers see every chain before any child runs.
#[derive(Clone, Default)]
pub struct CompositeTrustEngine {
    validators: Vec<Arc<dyn ChainValidator>>,
    mode: MatchMode,
    observers: Vec<RegisteredObserver>,
}

impl fmt::Debug for CompositeTrustEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompositeTrustEngine")
            .field("mode", &self.mode)
            .field("validators", &self.validators)
            .field("observers", &self.observers.len())
            .finish()
    }
}

impl CompositeTrustEngine {
    /// Create an empty engine in `mode`
    pub fn new(mode: MatchMode) -> Self {
        Self {
            validators: Vec::new(),
            mode,
            observers: Vec::new(),
        }
    }

    /// Append a child validator
    pub fn add<V: ChainValidator + 'static>(&mut self, validator: V) {
        self.validators.push(Arc::new(validator));
    }

    /// Append a child validator shared with other owners
    pub fn add_shared(&mut self, validator: Arc<dyn ChainValidator>) {
        self.validators.push(validator);
    }

    /// Number of direct children
    pub fn size(&self) -> usize {
        self.validators.len()
    }

    /// True when there are no children
    pub fn is_empty(&self) -> bool {
        self.validators.is_empty()
    }

    /// Current combination mode
    pub fn mode(&self) -> MatchMode {
        self.mode
    }

    /// Direct children, in evaluation order
    pub fn validators(&self) -> &[Arc<dyn ChainValidator>] {
        &self.validators
    }

    /// Change the mode in place
    ///
    /// Fails once two or more children exist, as that would silently
    /// regroup them; use [`Self::and`] or [`Self::or`] instead.
    pub fn set_mode(&mut self, mode: MatchMode) -> Result<()> {
        if self.mode != mode && self.validators.len() > 1 {
            return Err(TrustError::Configuration(format!(
                "cannot switch a group of {} validators from {:?} to {mode:?}",
                self.validators.len(),
                self.mode
            )));
        }
        self.mode = mode;
        Ok(())
    }

    /// Continue in AND mode
    ///
    /// With fewer than two children the mode flips in place; otherwise the
    /// current group becomes the single child of a new AND engine.
    pub fn and(self) -> Self {
        self.switch(MatchMode::All)
    }

    /// Continue in OR mode, with the same grouping rule as [`Self::and`]
    pub fn or(self) -> Self {
        self.switch(MatchMode::Any)
    }

    fn switch(mut self, mode: MatchMode) -> Self {
        if self.mode == mode {
            return self;
        }

        if self.validators.len() < 2 {
            self.mode = mode;
            return self;
        }

        let observers = std::mem::take(&mut self.observers);
        let group: Arc<dyn ChainValidator> = Arc::new(self);
        Self {
            validators: vec![group],
            mode,
            observers,
        }
    }

    /// Register an observer called with every chain before validation
    pub fn add_observer(&mut self, observer: Arc<dyn CertChainObserver>) -> ObserverHandle {
        let handle = ObserverHandle(NEXT_OBSERVER_ID.fetch_add(1, Ordering::Relaxed));
        self.observers.push(RegisteredObserver { handle, observer });
        handle
    }

    /// Unregister an observer; returns whether it was registered
    pub fn remove_observer(&mut self, handle: ObserverHandle) -> bool {
        let before = self.observers.len();
        self.observers.retain(|registered| registered.handle != handle);
        self.observers.len() != before
    }

    /// Whether any observer is registered
    pub fn has_observers(&self) -> bool {
        !self.observers.is_empty()
    }

    /// Open a request scope carrying the hostname of the connection
    pub fn on_before_handshake(&self, hostname: impl Into<String>) -> HandshakeScope<'_> {
        HandshakeScope {
            engine: self,
            hostname: hostname.into(),
        }
    }

    /// Validate a server chain presented for `host`
    pub fn validate(
        &self,
        chain: &CertificateChain,
        auth_type: &str,
        host: Option<&str>,
    ) -> TrustDecision {
        for registered in &self.observers {
            registered.observer.on_chain(chain, host);
        }

        match self.mode {
            MatchMode::All => self.validate_all(chain, auth_type, host),
            MatchMode::Any => self.validate_any(chain, auth_type, host),
        }
    }

    fn validate_all(
        &self,
        chain: &CertificateChain,
        auth_type: &str,
        host: Option<&str>,
    ) -> TrustDecision {
        let mut trusted = chain.clone();
        let mut applied = false;
        for validator in self.applicable(host) {
            trusted = validator.check_server_trusted(chain, auth_type, host)?;
            applied = true;
        }

        if !applied && !self.validators.is_empty() {
            return Err(not_applicable(host));
        }
        Ok(trusted)
    }

    fn validate_any(
        &self,
        chain: &CertificateChain,
        auth_type: &str,
        host: Option<&str>,
    ) -> TrustDecision {
        let mut first_rejection = None;

        for validator in self.applicable(host) {
            match validator.check_server_trusted(chain, auth_type, host) {
                Ok(trusted) => return Ok(trusted),
                Err(rejection) => {
                    tracing::trace!("{:?} rejected chain: {rejection}", validator.kind());
                    first_rejection.get_or_insert(rejection);
                }
            }
        }

        Err(first_rejection.unwrap_or_else(|| {
            if self.validators.is_empty() {
                TrustError::not_trusted("no validators configured")
            } else {
                not_applicable(host)
            }
        }))
    }

    fn applicable<'a>(
        &'a self,
        host: Option<&'a str>,
    ) -> impl Iterator<Item = &'a Arc<dyn ChainValidator>> + 'a {
        self.validators.iter().filter(move |validator| {
            let applies = validator.applies_to(host);
            if !applies {
                tracing::trace!("{:?} does not apply to {host:?}, skipped", validator.kind());
            }
            applies
        })
    }

    /// Validate a client chain with the same AND/OR rules
    pub fn validate_client(&self, chain: &CertificateChain, auth_type: &str) -> Result<()> {
        match self.mode {
            MatchMode::All => self
                .validators
                .iter()
                .try_for_each(|validator| validator.check_client_trusted(chain, auth_type)),
            MatchMode::Any => {
                let mut first_rejection = None;
                for validator in &self.validators {
                    match validator.check_client_trusted(chain, auth_type) {
                        Ok(()) => return Ok(()),
                        Err(rejection) => {
                            first_rejection.get_or_insert(rejection);
                        }
                    }
                }
                Err(first_rejection
                    .unwrap_or_else(|| TrustError::not_trusted("no validators configured")))
            }
        }
    }
}

impl ChainValidator for CompositeTrustEngine {
    fn check_server_trusted(
        &self,
        chain: &CertificateChain,
        auth_type: &str,
        host: Option<&str>,
    ) -> TrustDecision {
        self.validate(chain, auth_type, host)
    }

    fn check_client_trusted(&self, chain: &CertificateChain, auth_type: &str) -> Result<()> {
        self.validate_client(chain, auth_type)
    }

    fn is_user_added_certificate(&self, cert: &CertificateDer<'_>) -> bool {
        match self.mode {
            MatchMode::All => {
                !self.validators.is_empty()
                    && self
                        .validators
                        .iter()
                        .all(|validator| validator.is_user_added_certificate(cert))
            }
            MatchMode::Any => self
                .validators
                .iter()
                .any(|validator| validator.is_user_added_certificate(cert)),
        }
    }

    /// Union of the children's issuers, without duplicates
    fn accepted_issuers(&self) -> Vec<CertificateDer<'static>> {
        let mut issuers: Vec<CertificateDer<'static>> = Vec::new();
        for issuer in self
            .validators
            .iter()
            .flat_map(|validator| validator.accepted_issuers())
        {
            if !issuers.contains(&issuer) {
                issuers.push(issuer);
            }
        }
        issuers
    }

    /// A non-empty group applies when at least one child does
    fn applies_to(&self, host: Option<&str>) -> bool {
        self.validators.is_empty()
            || self
                .validators
                .iter()
                .any(|validator| validator.applies_to(host))
    }

    fn contains_kind(&self, kind: ValidatorKind) -> bool {
        kind == ValidatorKind::Composite
            || self
                .validators
                .iter()
                .any(|validator| validator.contains_kind(kind))
    }

    fn kind(&self) -> ValidatorKind {
        ValidatorKind::Composite
    }
}

fn not_applicable(host: Option<&str>) -> TrustError {
    TrustError::not_trusted(format!(
        "no validator applies to {}",
        host.unwrap_or("<unknown host>")
    ))
}

/// Validation context for one handshake
///
/// Carries the hostname explicitly so concurrent handshakes never see each
/// other's context.
#[derive(Debug)]
pub struct HandshakeScope<'a> {
    engine: &'a CompositeTrustEngine,
    hostname: String,
}

impl HandshakeScope<'_> {
    /// Hostname of the connection
    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    /// Validate the server chain for this scope's hostname
    pub fn validate(&self, chain: &CertificateChain, auth_type: &str) -> TrustDecision {
        self.engine.validate(chain, auth_type, Some(&self.hostname))
    }
}
