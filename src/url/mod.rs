//! URL handling module for Sumi-Swarm
//!
//! This module provides URL canonicalization, domain extraction, domain
//! pattern matching and the allow/deny domain policy applied to every task.

mod domain;
mod matcher;
mod normalize;

pub use domain::{extract_domain, origin_domain};
pub use matcher::matches_domain;
pub use normalize::{canonicalize, canonicalize_relative};

use serde::{Deserialize, Serialize};

/// Outcome of checking a domain against a [`DomainPolicy`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PolicyDecision {
    /// Domain may be crawled
    Allowed,
    /// Domain matches the deny-list
    Denied,
    /// Allow-list is non-empty and the domain is not on it
    NotAllowed,
}

impl PolicyDecision {
    /// Returns true if the domain may be crawled
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed)
    }
}

/// Allow/deny domain lists of a crawl job
///
/// The deny-list always wins. An empty allow-list allows every domain that
/// is not denied.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainPolicy {
    #[serde(default)]
    pub allow_domains: Vec<String>,
    #[serde(default)]
    pub deny_domains: Vec<String>,
}

impl DomainPolicy {
    pub fn new(allow_domains: Vec<String>, deny_domains: Vec<String>) -> Self {
        Self {
            allow_domains,
            deny_domains,
        }
    }

    /// Classifies a (lowercase) domain
    ///
    /// # Examples
    ///
    /// ```
    /// use sumi_swarm::url::{DomainPolicy, PolicyDecision};
    ///
    /// let policy = DomainPolicy::new(vec![], vec!["ads.test".to_string()]);
    /// assert_eq!(policy.decide("a.test"), PolicyDecision::Allowed);
    /// assert_eq!(policy.decide("cdn.ads.test"), PolicyDecision::Denied);
    /// ```
    pub fn decide(&self, domain: &str) -> PolicyDecision {
        if self
            .deny_domains
            .iter()
            .any(|pattern| matches_domain(pattern, domain))
        {
            return PolicyDecision::Denied;
        }

        if !self.allow_domains.is_empty()
            && !self
                .allow_domains
                .iter()
                .any(|pattern| matches_domain(pattern, domain))
        {
            return PolicyDecision::NotAllowed;
        }

        PolicyDecision::Allowed
    }

    /// Returns true if the domain may be crawled
    pub fn permits(&self, domain: &str) -> bool {
        self.decide(domain).is_allowed()
    }
}
