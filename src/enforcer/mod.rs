//! Firewall enforcement: atomic ipset replacement and preflight checks.

mod ipset;
mod preflight;

use async_trait::async_trait;

pub use ipset::{IpsetBackend, DEFAULT_IPSET_BIN, STAGING_SUFFIX};

use crate::error::GuardError;

#[cfg(test)]
use mockall::automock;

/// Names of the live sets managed by the daemon, one per address family
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetNames {
    pub ipv4: String,
    pub ipv6: String,
}

impl SetNames {
    pub fn new(ipv4: impl Into<String>, ipv6: impl Into<String>) -> Self {
        Self {
            ipv4: ipv4.into(),
            ipv6: ipv6.into(),
        }
    }

    /// Staging set used to build the next IPv4 membership
    pub fn ipv4_staging(&self) -> String {
        format!("{}{}", self.ipv4, STAGING_SUFFIX)
    }

    /// Staging set used to build the next IPv6 membership
    pub fn ipv6_staging(&self) -> String {
        format!("{}{}", self.ipv6, STAGING_SUFFIX)
    }
}

/// Replaces the membership of the live sets
#[cfg_attr(test, automock)]
#[async_trait]
pub trait SetReplacer: Send + Sync {
    /// Make the live sets contain exactly `ipv4` and `ipv6`.
    ///
    /// Observers of a live set see either its previous or its new complete
    /// membership, never anything in between.
    async fn replace(
        &self,
        ipv4: &[String],
        ipv6: &[String],
        sets: &SetNames,
    ) -> Result<(), GuardError>;
}

/// Verifies the firewall tool is usable before any work starts
#[cfg_attr(test, automock)]
#[async_trait]
pub trait PreflightCheck: Send + Sync {
    async fn check(&self) -> Result<(), GuardError>;
}
