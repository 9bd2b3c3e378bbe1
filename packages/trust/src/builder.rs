//! Fluent construction of trust engines
//!
//! The builder starts in AND mode. `and()` and `or()` follow the composite's
//! grouping rule, so `a.or().b.and().c` reads as `(a OR b) AND c`.

use std::sync::Arc;

use crate::composite::{CompositeTrustEngine, MatchMode};
use crate::config::{ApplicationConfig, ConfigSource};
use crate::error::{Result, TrustError};
use crate::validator::{
    CertChainObserver, ChainValidator, DenyAllValidator, MemorizationOptions, MemorizingValidator,
    SystemDefaultValidator, ValidatorKind,
};

/// Builder for [`CompositeTrustEngine`]
///
/// [`build`](Self::build) takes a shallow copy: every engine built from the
/// same builder shares the same validator instances, so memorization done
/// through one engine is seen by the others. Validators added after a build
/// only appear in later builds.
#[derive(Debug)]
pub struct TrustEngineBuilder {
    engine: CompositeTrustEngine,
    memorizer: Option<Arc<MemorizingValidator>>,
    has_memorizer: bool,
    app_config: Option<ApplicationConfig>,
}

impl Default for TrustEngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TrustEngineBuilder {
    /// Start with an empty AND group
    pub fn new() -> Self {
        Self {
            engine: CompositeTrustEngine::new(MatchMode::All),
            memorizer: None,
            has_memorizer: false,
            app_config: None,
        }
    }

    /// Add a validator to the current group
    pub fn add<V: ChainValidator + 'static>(self, validator: V) -> Result<Self> {
        self.add_shared(Arc::new(validator))
    }

    /// Add a validator that is also held elsewhere
    ///
    /// Groups are searched too: a composite that already holds a memorizer
    /// counts as one.
    pub fn add_shared(mut self, validator: Arc<dyn ChainValidator>) -> Result<Self> {
        if validator.contains_kind(ValidatorKind::Memorizing) {
            self.claim_memorizer()?;
        }
        self.engine.add_shared(validator);
        Ok(self)
    }

    /// Add a memorizing validator and keep it reachable through [`Self::memorizer`]
    pub fn add_memorizing(mut self, memorizer: Arc<MemorizingValidator>) -> Result<Self> {
        self.claim_memorizer()?;
        self.engine.add_shared(Arc::clone(&memorizer) as Arc<dyn ChainValidator>);
        self.memorizer = Some(memorizer);
        Ok(self)
    }

    /// Create a memorizing validator from `options` and add it
    pub fn memorize(self, options: MemorizationOptions) -> Result<Self> {
        if self.has_memorizer {
            return Err(already_memorizing());
        }
        let memorizer = Arc::new(MemorizingValidator::new(options)?);
        self.add_memorizing(memorizer)
    }

    /// Continue in AND mode
    pub fn and(self) -> Self {
        Self {
            engine: self.engine.and(),
            ..self
        }
    }

    /// Continue in OR mode
    pub fn or(self) -> Self {
        Self {
            engine: self.engine.or(),
            ..self
        }
    }

    /// Add the platform trust roots
    pub fn use_default(mut self) -> Self {
        self.engine.add(SystemDefaultValidator::from_platform());
        self
    }

    /// Add a validator that rejects everything
    pub fn deny_all(mut self) -> Self {
        self.engine.add(DenyAllValidator);
        self
    }

    /// Add the trust anchors described by `source`
    ///
    /// The configuration also answers [`Self::is_cleartext_traffic_permitted`].
    pub fn with_config(mut self, source: &dyn ConfigSource) -> Result<Self> {
        let config = ApplicationConfig::from_source(source)?;
        self.engine.add(config.validator()?);
        self.app_config = Some(config);
        Ok(self)
    }

    /// Register a diagnostic observer for every chain
    pub fn with_cert_chain_observer<O: CertChainObserver + 'static>(mut self, observer: O) -> Self {
        self.engine.add_observer(Arc::new(observer));
        self
    }

    /// Whether cleartext traffic is allowed, for `host` or by default
    ///
    /// Without a configuration everything is allowed.
    pub fn is_cleartext_traffic_permitted(&self, host: Option<&str>) -> bool {
        match (&self.app_config, host) {
            (None, _) => true,
            (Some(config), Some(host)) => config.is_cleartext_traffic_permitted_for(host),
            (Some(config), None) => config.is_cleartext_traffic_permitted(),
        }
    }

    /// Number of validators in the top-level group
    pub fn size(&self) -> usize {
        self.engine.size()
    }

    /// The memorizing validator, if one was attached with `memorize` or `add_memorizing`
    pub fn memorizer(&self) -> Option<&Arc<MemorizingValidator>> {
        self.memorizer.as_ref()
    }

    /// Configuration loaded by [`Self::with_config`]
    pub fn application_config(&self) -> Option<&ApplicationConfig> {
        self.app_config.as_ref()
    }

    /// Produce an engine from the current state
    pub fn build(&self) -> Arc<CompositeTrustEngine> {
        Arc::new(self.engine.clone())
    }

    fn claim_memorizer(&mut self) -> Result<()> {
        if self.has_memorizer {
            return Err(already_memorizing());
        }
        self.has_memorizer = true;
        Ok(())
    }
}

fn already_memorizing() -> TrustError {
    TrustError::Configuration("a memorizing validator is already attached".to_string())
}
