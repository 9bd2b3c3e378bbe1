//! Boolean hostname predicates
//!
//! Rules are immutable trees: leaves match a hostname against a glob or
//! regular expression, inner nodes combine children with AND, OR and NOT.
//! Evaluation is pure and safe to share across threads.

use regex::Regex;

use crate::error::{Result, TrustError};

/// Predicate over hostnames, used to scope memorization
#[derive(Debug, Clone)]
pub enum DomainMatchRule {
    /// Whole-hostname regular expression match
    Pattern(Regex),
    /// Negation of the inner rule
    Not(Box<DomainMatchRule>),
    /// Every rule must match; empty matches everything
    AllOf(Vec<DomainMatchRule>),
    /// Some rule must match; empty matches nothing
    AnyOf(Vec<DomainMatchRule>),
}

impl DomainMatchRule {
    /// Match a glob where `*` stands for any run of characters
    ///
    /// Everything else is literal and the whole hostname must match, so
    /// `*.example.com` matches `www.example.com` but not `example.com`.
    /// Matching ignores ASCII case.
    pub fn is(glob: &str) -> Result<Self> {
        let pattern = regex::escape(glob).replace(r"\*", ".*");
        compile(&format!("(?i)^(?:{pattern})$"), glob)
    }

    /// Match a regular expression against the whole hostname
    pub fn is_pattern(regex: &str) -> Result<Self> {
        compile(&format!("^(?:{regex})$"), regex)
    }

    /// Negate `rule`
    pub fn not(rule: DomainMatchRule) -> Self {
        Self::Not(Box::new(rule))
    }

    /// All of `rules` must match
    pub fn all_of(rules: impl IntoIterator<Item = DomainMatchRule>) -> Self {
        Self::AllOf(rules.into_iter().collect())
    }

    /// Any of `rules` must match
    pub fn any_of(rules: impl IntoIterator<Item = DomainMatchRule>) -> Self {
        Self::AnyOf(rules.into_iter().collect())
    }

    /// Match any of `globs`
    pub fn whitelist<I, S>(globs: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        globs
            .into_iter()
            .map(|glob| Self::is(glob.as_ref()))
            .collect::<Result<Vec<_>>>()
            .map(Self::AnyOf)
    }

    /// Match none of `globs`
    pub fn blacklist<I, S>(globs: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        globs
            .into_iter()
            .map(|glob| Self::is(glob.as_ref()).map(Self::not))
            .collect::<Result<Vec<_>>>()
            .map(Self::AllOf)
    }

    /// Evaluate the rule for `host`
    pub fn matches(&self, host: &str) -> bool {
        match self {
            Self::Pattern(regex) => regex.is_match(host),
            Self::Not(rule) => !rule.matches(host),
            Self::AllOf(rules) => rules.iter().all(|rule| rule.matches(host)),
            Self::AnyOf(rules) => rules.iter().any(|rule| rule.matches(host)),
        }
    }
}

fn compile(pattern: &str, source: &str) -> Result<DomainMatchRule> {
    Regex::new(pattern)
        .map(DomainMatchRule::Pattern)
        .map_err(|e| TrustError::Configuration(format!("invalid domain rule {source:?}: {e}")))
}
