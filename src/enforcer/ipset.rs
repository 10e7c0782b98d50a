//! ipset backend: staged build, atomic swap, cleanup.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

use super::{SetNames, SetReplacer};
use crate::cmd_abstraction::{args_to_strings, CommandExecutor, RealCommandExecutor};
use crate::error::GuardError;

/// Default ipset program, resolved through `PATH`
pub const DEFAULT_IPSET_BIN: &str = "ipset";

/// Suffix appended to a live set name to form its staging set
pub const STAGING_SUFFIX: &str = "_tmp";

const SET_TYPE: &str = "hash:net";

#[derive(Debug, Clone, Copy)]
enum Family {
    V4,
    V6,
}

/// A single ipset invocation that did not succeed
#[derive(Debug)]
pub(super) struct OpFailure {
    pub op: String,
    pub output: String,
}

impl std::fmt::Display for OpFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.output.is_empty() {
            write!(f, "`{}` failed", self.op)
        } else {
            write!(f, "`{}` failed: {}", self.op, self.output)
        }
    }
}

/// ipset-backed set replacer and preflight checker
pub struct IpsetBackend {
    executor: Arc<dyn CommandExecutor>,
    binary: String,
}

impl IpsetBackend {
    /// Backend running the real `binary`
    pub fn new(binary: impl Into<String>) -> Self {
        Self::with_executor(Arc::new(RealCommandExecutor::new()), binary)
    }

    pub fn with_executor(executor: Arc<dyn CommandExecutor>, binary: impl Into<String>) -> Self {
        Self {
            executor,
            binary: binary.into(),
        }
    }

    /// Run one ipset command
    pub(super) async fn run(&self, args: &[&str]) -> Result<(), OpFailure> {
        let op = format!("{} {}", self.binary, args.join(" "));
        match self.executor.execute(&self.binary, &args_to_strings(args)).await {
            Ok(out) if out.success => Ok(()),
            Ok(out) => Err(OpFailure {
                op,
                output: out.output.trim().to_string(),
            }),
            Err(e) => Err(OpFailure {
                op,
                output: format!("{:#}", e),
            }),
        }
    }

    /// Run one step of a replacement, counting it on success
    async fn step(&self, completed: &mut usize, args: &[&str]) -> Result<(), GuardError> {
        self.run(args)
            .await
            .map_err(|f| GuardError::Replacement {
                op: f.op,
                output: f.output,
                completed: *completed,
            })?;
        *completed += 1;
        Ok(())
    }

    async fn create(&self, completed: &mut usize, name: &str, family: Family) -> Result<(), GuardError> {
        match family {
            Family::V4 => self.step(completed, &["create", name, SET_TYPE, "-exist"]).await,
            Family::V6 => {
                self.step(
                    completed,
                    &["create", name, SET_TYPE, "family", "inet6", "-exist"],
                )
                .await
            }
        }
    }

    /// Build `staging` from scratch so that it holds exactly `ranges`
    async fn stage(
        &self,
        completed: &mut usize,
        staging: &str,
        family: Family,
        ranges: &[String],
    ) -> Result<(), GuardError> {
        self.create(completed, staging, family).await?;
        // A crash in an earlier run may have left entries behind
        self.step(completed, &["flush", staging]).await?;
        for cidr in ranges {
            self.step(completed, &["add", staging, cidr.as_str(), "-exist"]).await?;
        }
        debug!(set = %staging, entries = ranges.len(), "staging set built");
        Ok(())
    }

    async fn destroy_staging(&self, staging: &str) {
        if let Err(f) = self.run(&["destroy", staging]).await {
            warn!(set = %staging, error = %f, "destroy staging set failed");
        }
    }
}

#[async_trait]
impl SetReplacer for IpsetBackend {
    async fn replace(
        &self,
        ipv4: &[String],
        ipv6: &[String],
        sets: &SetNames,
    ) -> Result<(), GuardError> {
        let tmp4 = sets.ipv4_staging();
        let tmp6 = sets.ipv6_staging();
        let mut completed = 0usize;

        self.stage(&mut completed, &tmp4, Family::V4, ipv4).await?;
        self.stage(&mut completed, &tmp6, Family::V6, ipv6).await?;

        // First run: the live sets must exist before they can be swapped
        self.create(&mut completed, &sets.ipv4, Family::V4).await?;
        self.create(&mut completed, &sets.ipv6, Family::V6).await?;

        self.step(&mut completed, &["swap", sets.ipv4.as_str(), tmp4.as_str()]).await?;
        self.step(&mut completed, &["swap", sets.ipv6.as_str(), tmp6.as_str()]).await?;

        // The staging sets now hold the previous generation
        self.destroy_staging(&tmp4).await;
        self.destroy_staging(&tmp6).await;

        debug!(
            ipv4_set = %sets.ipv4,
            ipv6_set = %sets.ipv6,
            operations = completed,
            "ipsets swapped"
        );
        Ok(())
    }
}
