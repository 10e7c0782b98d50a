//! Reconciliation loop.
//!
//! ```text
//! Starting ──preflight ok──▶ Running ──cancelled / once done──▶ Stopped
//!     │
//!     └──preflight error──▶ Failed
//! ```
//!
//! Each tick fetches the range list with the token from the last applied
//! update and, when it changed, replaces the live sets. Ticks run strictly
//! one after another: the next trigger is only awaited once the previous
//! tick has returned. Tick failures are logged and counted; only a failed
//! preflight is returned to the caller.

use std::time::Duration;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::enforcer::{PreflightCheck, SetNames, SetReplacer};
use crate::error::GuardError;
use crate::fetcher::{FetchOutcome, RangeFetcher};
use crate::stats::UpdateStats;

/// Interval used when none (or zero) is configured
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(30 * 60);

/// Run parameters for the daemon
#[derive(Debug, Clone)]
pub struct DaemonSettings {
    pub sets: SetNames,
    pub interval: Duration,
    /// Run a single tick and stop
    pub once: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DaemonState {
    Starting,
    Running,
    Stopped,
    Failed,
}

/// What a completed tick did
#[derive(Debug)]
pub enum TickOutcome {
    /// Source unchanged, sets left untouched
    Unchanged,
    /// Sets replaced with this many ranges
    Updated { ipv4: usize, ipv6: usize },
    /// Fetch or replacement failed; sets and token left as they were
    Failed(GuardError),
}

pub struct Daemon {
    fetcher: Box<dyn RangeFetcher>,
    replacer: Box<dyn SetReplacer>,
    preflight: Box<dyn PreflightCheck>,
    settings: DaemonSettings,
    state: DaemonState,
    token: String,
    stats: UpdateStats,
}

impl Daemon {
    pub fn new(
        mut settings: DaemonSettings,
        fetcher: Box<dyn RangeFetcher>,
        replacer: Box<dyn SetReplacer>,
        preflight: Box<dyn PreflightCheck>,
    ) -> Self {
        if settings.interval.is_zero() {
            settings.interval = DEFAULT_INTERVAL;
        }
        Self {
            fetcher,
            replacer,
            preflight,
            settings,
            state: DaemonState::Starting,
            token: String::new(),
            stats: UpdateStats::new(),
        }
    }

    pub fn state(&self) -> DaemonState {
        self.state
    }

    /// Token of the last applied range list (empty until the first update)
    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn stats(&self) -> &UpdateStats {
        &self.stats
    }

    /// Run preflight, then tick until `shutdown` is cancelled (or once).
    ///
    /// Returns an error only when the preflight check fails.
    pub async fn run(&mut self, shutdown: CancellationToken) -> Result<(), GuardError> {
        self.state = DaemonState::Starting;
        if let Err(e) = self.preflight.check().await {
            error!(error = %e, "preflight check failed");
            self.state = DaemonState::Failed;
            return Err(e);
        }

        info!(
            interval = ?self.settings.interval,
            ipset4 = %self.settings.sets.ipv4,
            ipset6 = %self.settings.sets.ipv6,
            once = self.settings.once,
            "cf-ip-guard daemon starting"
        );
        self.state = DaemonState::Running;

        if self.settings.once {
            if !shutdown.is_cancelled() {
                self.tick(&shutdown).await;
            }
            info!(
                success = self.stats.success,
                fail = self.stats.fail,
                last_etag = %self.stats.last_token,
                consecutive_fail = self.stats.consecutive_fail,
                "daemon once mode finished"
            );
            self.state = DaemonState::Stopped;
            return Ok(());
        }

        // First tick fires immediately; a late tick delays the schedule
        // instead of firing a burst.
        let mut ticker = time::interval(self.settings.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }
            if self.tick(&shutdown).await.is_some() {
                self.log_stats();
            }
        }

        info!("daemon stopped");
        self.state = DaemonState::Stopped;
        Ok(())
    }

    /// Run one fetch-then-maybe-replace cycle.
    ///
    /// Returns `None` if `shutdown` fired while the fetch was in flight; such
    /// a tick is not counted. Once replacement has begun it runs to the end.
    pub async fn tick(&mut self, shutdown: &CancellationToken) -> Option<TickOutcome> {
        let start = Instant::now();

        let fetched = tokio::select! {
            biased;
            _ = shutdown.cancelled() => None,
            result = self.fetcher.fetch(&self.token) => Some(result),
        };
        let Some(fetched) = fetched else {
            info!("update interrupted by shutdown");
            return None;
        };

        let outcome = match fetched {
            Ok(FetchOutcome::Unchanged { token }) => {
                self.stats.record_success(start.elapsed(), &token);
                info!(etag = %token, duration = ?self.stats.last_duration, "ipsets unchanged");
                TickOutcome::Unchanged
            }
            Ok(FetchOutcome::Changed(list)) => {
                info!(
                    ipv4 = list.ipv4.len(),
                    ipv6 = list.ipv6.len(),
                    etag = %list.token,
                    "fetched Cloudflare IPs"
                );
                match self
                    .replacer
                    .replace(&list.ipv4, &list.ipv6, &self.settings.sets)
                    .await
                {
                    Ok(()) => {
                        // A payload without a token keeps the last one we had
                        if !list.token.is_empty() {
                            self.token = list.token;
                        }
                        self.stats.record_success(start.elapsed(), &self.token);
                        info!(
                            ipv4 = list.ipv4.len(),
                            ipv6 = list.ipv6.len(),
                            etag = %self.token,
                            duration = ?self.stats.last_duration,
                            "ipsets updated successfully"
                        );
                        TickOutcome::Updated {
                            ipv4: list.ipv4.len(),
                            ipv6: list.ipv6.len(),
                        }
                    }
                    Err(e) => self.fail(start, e),
                }
            }
            Err(e) => self.fail(start, e),
        };
        Some(outcome)
    }

    fn fail(&mut self, start: Instant, err: GuardError) -> TickOutcome {
        self.stats.record_failure(start.elapsed());
        warn!(
            consecutive_fail = self.stats.consecutive_fail,
            error = %err,
            "ipset update failed"
        );
        TickOutcome::Failed(err)
    }

    fn log_stats(&self) {
        info!(
            success = self.stats.success,
            fail = self.stats.fail,
            last_duration = ?self.stats.last_duration,
            last_etag = %self.stats.last_token,
            last_update = %self.stats.last_update_display(),
            consecutive_fail = self.stats.consecutive_fail,
            "stats"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enforcer::{MockPreflightCheck, MockSetReplacer};
    use crate::fetcher::{MockRangeFetcher, RangeList};
    use async_trait::async_trait;

    fn settings(once: bool) -> DaemonSettings {
        DaemonSettings {
            sets: SetNames::new("cf4", "cf6"),
            interval: Duration::from_secs(60),
            once,
        }
    }

    fn daemon(
        once: bool,
        fetcher: impl RangeFetcher + 'static,
        replacer: MockSetReplacer,
        preflight: MockPreflightCheck,
    ) -> Daemon {
        Daemon::new(
            settings(once),
            Box::new(fetcher),
            Box::new(replacer),
            Box::new(preflight),
        )
    }

    fn preflight_ok() -> MockPreflightCheck {
        let mut preflight = MockPreflightCheck::new();
        preflight.expect_check().times(1).returning(|| Ok(()));
        preflight
    }

    fn no_replace() -> MockSetReplacer {
        let mut replacer = MockSetReplacer::new();
        replacer.expect_replace().times(0);
        replacer
    }

    fn changed(ipv4: &[&str], ipv6: &[&str], token: &str) -> FetchOutcome {
        FetchOutcome::Changed(RangeList {
            ipv4: ipv4.iter().map(|s| s.to_string()).collect(),
            ipv6: ipv6.iter().map(|s| s.to_string()).collect(),
            token: token.to_string(),
        })
    }

    #[tokio::test]
    async fn test_first_fetch_replaces_and_adopts_token() {
        let mut fetcher = MockRangeFetcher::new();
        fetcher
            .expect_fetch()
            .withf(|token| token.is_empty())
            .times(1)
            .returning(|_| Ok(changed(&["1.1.1.0/24"], &["2606:4700::/32"], "e1")));

        let mut replacer = MockSetReplacer::new();
        replacer
            .expect_replace()
            .withf(|v4, v6, sets| {
                v4 == ["1.1.1.0/24".to_string()]
                    && v6 == ["2606:4700::/32".to_string()]
                    && sets.ipv4 == "cf4"
                    && sets.ipv6 == "cf6"
            })
            .times(1)
            .returning(|_, _, _| Ok(()));

        let mut d = daemon(true, fetcher, replacer, preflight_ok());
        d.run(CancellationToken::new()).await.unwrap();

        assert_eq!(d.token(), "e1");
        assert_eq!(d.stats().success, 1);
        assert_eq!(d.stats().last_token, "e1");
        assert_eq!(d.state(), DaemonState::Stopped);
    }

    #[tokio::test]
    async fn test_unchanged_source_skips_replacer() {
        let mut fetcher = MockRangeFetcher::new();
        fetcher
            .expect_fetch()
            .withf(|token| token.is_empty())
            .times(1)
            .returning(|_| Ok(changed(&["1.1.1.0/24"], &["2606:4700::/32"], "e1")));
        fetcher
            .expect_fetch()
            .withf(|token| token == "e1")
            .times(1)
            .returning(|token| {
                Ok(FetchOutcome::Unchanged {
                    token: token.to_string(),
                })
            });

        let mut replacer = MockSetReplacer::new();
        replacer.expect_replace().times(1).returning(|_, _, _| Ok(()));

        let mut d = daemon(false, fetcher, replacer, MockPreflightCheck::new());
        let shutdown = CancellationToken::new();

        assert!(matches!(
            d.tick(&shutdown).await,
            Some(TickOutcome::Updated { ipv4: 1, ipv6: 1 })
        ));
        assert!(matches!(d.tick(&shutdown).await, Some(TickOutcome::Unchanged)));
        assert_eq!(d.token(), "e1");
        assert_eq!(d.stats().success, 2);
    }

    #[tokio::test]
    async fn test_bad_gateway_counts_failure_and_keeps_token() {
        let mut fetcher = MockRangeFetcher::new();
        fetcher
            .expect_fetch()
            .withf(|token| token.is_empty())
            .times(1)
            .returning(|_| Ok(changed(&["1.1.1.0/24"], &[], "e1")));
        fetcher
            .expect_fetch()
            .withf(|token| token == "e1")
            .times(1)
            .returning(|_| {
                Err(GuardError::SourceProtocol(
                    "unexpected status: 502 Bad Gateway".into(),
                ))
            });

        let mut replacer = MockSetReplacer::new();
        replacer.expect_replace().times(1).returning(|_, _, _| Ok(()));

        let mut d = daemon(false, fetcher, replacer, MockPreflightCheck::new());
        let shutdown = CancellationToken::new();

        d.tick(&shutdown).await;
        let before = d.stats().consecutive_fail;
        let outcome = d.tick(&shutdown).await;

        assert!(matches!(
            outcome,
            Some(TickOutcome::Failed(GuardError::SourceProtocol(_)))
        ));
        assert_eq!(d.stats().consecutive_fail, before + 1);
        assert_eq!(d.token(), "e1");
        assert_eq!(d.stats().completed_ticks(), 2);
    }

    #[tokio::test]
    async fn test_replace_failure_keeps_previous_token() {
        let mut fetcher = MockRangeFetcher::new();
        fetcher
            .expect_fetch()
            .withf(|token| token.is_empty())
            .times(1)
            .returning(|_| Ok(changed(&["1.1.1.0/24"], &[], "e1")));
        // e2 never gets applied, so the next fetch still asks relative to e1
        fetcher
            .expect_fetch()
            .withf(|token| token == "e1")
            .times(2)
            .returning(|_| Ok(changed(&["1.0.0.0/24"], &[], "e2")));

        let mut replacer = MockSetReplacer::new();
        let mut attempt = 0u32;
        replacer.expect_replace().times(3).returning(move |_, _, _| {
            attempt += 1;
            if attempt == 2 {
                Err(GuardError::Replacement {
                    op: "ipset swap cf4 cf4_tmp".into(),
                    output: "The set with the given name does not exist".into(),
                    completed: 5,
                })
            } else {
                Ok(())
            }
        });

        let mut d = daemon(false, fetcher, replacer, MockPreflightCheck::new());
        let shutdown = CancellationToken::new();

        d.tick(&shutdown).await;
        let failed = d.tick(&shutdown).await;
        assert!(matches!(
            failed,
            Some(TickOutcome::Failed(GuardError::Replacement { .. }))
        ));
        assert_eq!(d.token(), "e1");
        assert_eq!(d.stats().consecutive_fail, 1);

        d.tick(&shutdown).await;
        assert_eq!(d.token(), "e2");
        assert_eq!(d.stats().consecutive_fail, 0);
        assert_eq!(d.stats().success, 2);
        assert_eq!(d.stats().fail, 1);
    }

    #[tokio::test]
    async fn test_tokenless_payload_keeps_previous_token() {
        let mut fetcher = MockRangeFetcher::new();
        fetcher
            .expect_fetch()
            .withf(|token| token.is_empty())
            .times(1)
            .returning(|_| Ok(changed(&["1.1.1.0/24"], &[], "e1")));
        fetcher
            .expect_fetch()
            .withf(|token| token == "e1")
            .times(2)
            .returning(|_| Ok(changed(&["1.0.0.0/24"], &[], "")));

        let mut replacer = MockSetReplacer::new();
        replacer.expect_replace().times(3).returning(|_, _, _| Ok(()));

        let mut d = daemon(false, fetcher, replacer, MockPreflightCheck::new());
        let shutdown = CancellationToken::new();

        d.tick(&shutdown).await;
        assert!(matches!(
            d.tick(&shutdown).await,
            Some(TickOutcome::Updated { ipv4: 1, ipv6: 0 })
        ));
        assert_eq!(d.token(), "e1");
        assert_eq!(d.stats().last_token, d.token());

        // The next fetch is still conditional on e1
        d.tick(&shutdown).await;
        assert_eq!(d.stats().success, 3);
    }

    #[tokio::test]
    async fn test_preflight_failure_prevents_any_tick() {
        let mut fetcher = MockRangeFetcher::new();
        fetcher.expect_fetch().times(0);

        let mut preflight = MockPreflightCheck::new();
        preflight
            .expect_check()
            .times(1)
            .returning(|| Err(GuardError::Preflight("ipset not available".into())));

        let mut d = daemon(false, fetcher, no_replace(), preflight);
        let err = d.run(CancellationToken::new()).await.unwrap_err();

        assert!(matches!(err, GuardError::Preflight(_)));
        assert_eq!(d.state(), DaemonState::Failed);
        assert_eq!(d.stats().completed_ticks(), 0);
    }

    #[tokio::test]
    async fn test_once_mode_failure_is_not_escalated() {
        let mut fetcher = MockRangeFetcher::new();
        fetcher
            .expect_fetch()
            .times(1)
            .returning(|_| Err(GuardError::Transport("connection reset".into())));

        let mut d = daemon(true, fetcher, no_replace(), preflight_ok());
        d.run(CancellationToken::new()).await.unwrap();

        assert_eq!(d.stats().fail, 1);
        assert_eq!(d.stats().consecutive_fail, 1);
        assert_eq!(d.state(), DaemonState::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn test_periodic_ticks_until_cancelled() {
        let shutdown = CancellationToken::new();
        let trigger = shutdown.clone();
        let mut calls = 0u32;

        let mut fetcher = MockRangeFetcher::new();
        fetcher.expect_fetch().times(3).returning(move |token| {
            calls += 1;
            if calls == 3 {
                trigger.cancel();
            }
            Ok(FetchOutcome::Unchanged {
                token: token.to_string(),
            })
        });

        let mut d = daemon(false, fetcher, no_replace(), preflight_ok());
        let started = Instant::now();
        d.run(shutdown).await.unwrap();

        // Third tick fires two intervals after the immediate first one,
        // and runs to completion even though it cancelled mid-tick
        assert!(started.elapsed() >= Duration::from_secs(120));
        assert_eq!(d.stats().success, 3);
        assert_eq!(d.state(), DaemonState::Stopped);
    }

    #[tokio::test]
    async fn test_cancelled_before_start_runs_no_tick() {
        let shutdown = CancellationToken::new();
        shutdown.cancel();

        let mut fetcher = MockRangeFetcher::new();
        fetcher.expect_fetch().times(0);

        let mut d = daemon(false, fetcher, no_replace(), preflight_ok());
        d.run(shutdown).await.unwrap();

        assert_eq!(d.stats().completed_ticks(), 0);
        assert_eq!(d.state(), DaemonState::Stopped);
    }

    /// Fetcher whose request never completes
    struct HangingFetcher;

    #[async_trait]
    impl RangeFetcher for HangingFetcher {
        async fn fetch(&self, _previous_token: &str) -> Result<FetchOutcome, GuardError> {
            std::future::pending().await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_abandons_inflight_fetch() {
        let shutdown = CancellationToken::new();
        let trigger = shutdown.clone();
        tokio::spawn(async move {
            time::sleep(Duration::from_secs(1)).await;
            trigger.cancel();
        });

        let mut d = daemon(true, HangingFetcher, no_replace(), preflight_ok());
        d.run(shutdown).await.unwrap();

        assert_eq!(d.stats().completed_ticks(), 0);
        assert_eq!(d.token(), "");
        assert_eq!(d.state(), DaemonState::Stopped);
    }

    #[test]
    fn test_zero_interval_falls_back_to_default() {
        let mut s = settings(false);
        s.interval = Duration::ZERO;
        let d = Daemon::new(
            s,
            Box::new(MockRangeFetcher::new()),
            Box::new(MockSetReplacer::new()),
            Box::new(MockPreflightCheck::new()),
        );
        assert_eq!(d.settings.interval, DEFAULT_INTERVAL);
        assert_eq!(d.state(), DaemonState::Starting);
    }
}
