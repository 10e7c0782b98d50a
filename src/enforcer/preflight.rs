//! Preflight check: is ipset present and usable by this process?

use async_trait::async_trait;
use tracing::debug;

use super::{IpsetBackend, PreflightCheck};
use crate::error::GuardError;

#[async_trait]
impl PreflightCheck for IpsetBackend {
    /// List set names; this needs both the binary and CAP_NET_ADMIN.
    async fn check(&self) -> Result<(), GuardError> {
        self.run(&["list", "-n"]).await.map_err(|f| {
            GuardError::Preflight(format!("ipset not available or permission denied: {}", f))
        })?;
        debug!("ipset preflight check passed");
        Ok(())
    }
}
