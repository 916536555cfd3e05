//! Idle host eviction loop
//!
//! Drives the eviction sweep on a fixed cadence, independent of any
//! request-serving activity:
//!
//! ```text
//! every interval
//!     │
//!     ├── 1. Snapshot hosts and jobs (GridScheduler)
//!     │
//!     ├── 2. Derive the busy-host set from job targets
//!     │
//!     ├── 3. Tick the idle tracker
//!     │
//!     └── 4. Remove each flagged host (ClusterOps), isolating failures
//! ```
//!
//! A host whose removal fails stays removed from idle tracking for this
//! sweep; it is re-detected as idle on subsequent ticks and re-flagged
//! after another full idle timeout, so failures retry naturally. A failed
//! snapshot skips the whole tick without touching tracker state — no
//! observation is fabricated from a broken tool.

use crate::cluster::ClusterOps;
use crate::error::Result;
use crate::grid::{busy_hosts, GridScheduler, AGGREGATE_PSEUDO_HOST};
use crate::idle::IdleTracker;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Default seconds between sweeps
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 60;

/// Default continuous-idle duration before eviction (seconds)
pub const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 30 * 60;

/// Cadence and threshold configuration for the eviction loop.
#[derive(Debug, Clone)]
pub struct ReaperConfig {
    /// Continuous idle duration a host must exhibit before removal
    pub idle_timeout: Duration,

    /// Time between sweeps
    pub sweep_interval: Duration,
}

impl Default for ReaperConfig {
    fn default() -> Self {
        Self {
            idle_timeout: Duration::from_secs(DEFAULT_IDLE_TIMEOUT_SECS),
            sweep_interval: Duration::from_secs(DEFAULT_SWEEP_INTERVAL_SECS),
        }
    }
}

impl ReaperConfig {
    /// Set the idle timeout.
    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Set the sweep interval.
    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }
}

/// Outcome of one completed sweep.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SweepReport {
    /// Hosts in the snapshot (aggregate pseudo-host excluded)
    pub hosts: usize,

    /// Hosts with at least one bound job
    pub busy: usize,

    /// Hosts whose idle streak crossed the timeout this sweep
    pub flagged: Vec<String>,

    /// Flagged hosts whose removal was issued successfully
    pub removed: Vec<String>,

    /// Flagged hosts whose removal failed (retried on a later streak)
    pub failed: Vec<String>,
}

/// Periodic task that evicts hosts idle past the timeout.
///
/// Owns the [`IdleTracker`] exclusively; no other component reads or
/// writes idle state.
pub struct IdleReaper {
    grid: Arc<dyn GridScheduler>,
    cluster: Arc<dyn ClusterOps>,
    tracker: IdleTracker,
    sweep_interval: Duration,
}

impl IdleReaper {
    /// Create a reaper over the given capabilities.
    pub fn new(
        grid: Arc<dyn GridScheduler>,
        cluster: Arc<dyn ClusterOps>,
        config: ReaperConfig,
    ) -> Self {
        Self {
            grid,
            cluster,
            tracker: IdleTracker::new(config.idle_timeout),
            sweep_interval: config.sweep_interval,
        }
    }

    /// Number of hosts currently carrying an idle streak.
    pub fn tracked_count(&self) -> usize {
        self.tracker.tracked_count()
    }

    /// Run one sweep at `now`.
    ///
    /// Fails only when a snapshot cannot be obtained; per-host removal
    /// failures are logged, recorded in the report, and never abort the
    /// sweep or affect the other flagged hosts.
    pub async fn sweep(&mut self, now: DateTime<Utc>) -> Result<SweepReport> {
        let mut hosts = self.grid.hosts().await?;
        hosts.remove(AGGREGATE_PSEUDO_HOST);
        let jobs = self.grid.jobs().await?;
        let busy = busy_hosts(&jobs);

        let flagged = self.tracker.tick(now, &hosts, &busy);

        let mut report = SweepReport {
            hosts: hosts.len(),
            busy: busy.len(),
            flagged: flagged.clone(),
            ..Default::default()
        };

        for host in &flagged {
            match self.cluster.remove_node(host).await {
                Ok(()) => {
                    info!(host = %host, "removed idle host");
                    report.removed.push(host.clone());
                }
                Err(e) => {
                    warn!(host = %host, error = %e, "failed to remove idle host");
                    report.failed.push(host.clone());
                }
            }
        }

        Ok(report)
    }

    /// Drive sweeps on the configured interval for the life of the process.
    pub async fn run(mut self) {
        info!(
            interval_secs = self.sweep_interval.as_secs(),
            idle_timeout_secs = self.tracker.idle_timeout().as_secs(),
            "idle eviction loop started"
        );

        let mut ticker = tokio::time::interval(self.sweep_interval);
        loop {
            ticker.tick().await;

            match self.sweep(Utc::now()).await {
                Ok(report) => {
                    if report.flagged.is_empty() {
                        debug!(
                            hosts = report.hosts,
                            busy = report.busy,
                            tracked = self.tracker.tracked_count(),
                            "idle sweep complete"
                        );
                    } else {
                        info!(
                            hosts = report.hosts,
                            busy = report.busy,
                            removed = report.removed.len(),
                            failed = report.failed.len(),
                            "idle sweep removed hosts"
                        );
                    }
                }
                Err(e) => {
                    warn!(error = %e, "idle sweep skipped: cluster snapshot failed");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::AddNodeRequest;
    use crate::error::ReaperError;
    use crate::grid::{GridJob, JobState};
    use async_trait::async_trait;
    use chrono::TimeZone;
    use std::collections::HashSet;
    use std::sync::Mutex;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn config() -> ReaperConfig {
        ReaperConfig::default().with_idle_timeout(Duration::from_secs(1800))
    }

    /// Grid snapshot fake with mutable host/job sets and a failure switch.
    struct FakeGrid {
        hosts: Mutex<HashSet<String>>,
        jobs: Mutex<Vec<GridJob>>,
        fail_snapshots: Mutex<bool>,
    }

    impl FakeGrid {
        fn with_hosts(hosts: &[&str]) -> Arc<Self> {
            Arc::new(Self {
                hosts: Mutex::new(hosts.iter().map(|h| h.to_string()).collect()),
                jobs: Mutex::new(Vec::new()),
                fail_snapshots: Mutex::new(false),
            })
        }

        fn set_jobs(&self, jobs: Vec<GridJob>) {
            *self.jobs.lock().unwrap() = jobs;
        }

        fn set_failing(&self, failing: bool) {
            *self.fail_snapshots.lock().unwrap() = failing;
        }
    }

    #[async_trait]
    impl GridScheduler for FakeGrid {
        async fn hosts(&self) -> Result<HashSet<String>> {
            if *self.fail_snapshots.lock().unwrap() {
                return Err(ReaperError::grid("qhost exited 1"));
            }
            Ok(self.hosts.lock().unwrap().clone())
        }

        async fn jobs(&self) -> Result<Vec<GridJob>> {
            if *self.fail_snapshots.lock().unwrap() {
                return Err(ReaperError::grid("qstat exited 1"));
            }
            Ok(self.jobs.lock().unwrap().clone())
        }
    }

    /// Cluster fake recording removals; removal of listed hosts fails.
    struct FakeCluster {
        removed: Mutex<Vec<String>>,
        fail_for: HashSet<String>,
    }

    impl FakeCluster {
        fn new() -> Arc<Self> {
            Self::failing_for(&[])
        }

        fn failing_for(hosts: &[&str]) -> Arc<Self> {
            Arc::new(Self {
                removed: Mutex::new(Vec::new()),
                fail_for: hosts.iter().map(|h| h.to_string()).collect(),
            })
        }

        fn removed(&self) -> Vec<String> {
            self.removed.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ClusterOps for FakeCluster {
        async fn add_node(&self, _request: &AddNodeRequest) -> Result<()> {
            Ok(())
        }

        async fn remove_node(&self, alias: &str) -> Result<()> {
            if self.fail_for.contains(alias) {
                return Err(ReaperError::cluster(format!(
                    "removenode {alias} exited 1"
                )));
            }
            self.removed.lock().unwrap().push(alias.to_string());
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_idle_host_removed_after_timeout() {
        let grid = FakeGrid::with_hosts(&["node001"]);
        let cluster = FakeCluster::new();
        let mut reaper = IdleReaper::new(grid, cluster.clone(), config());

        let report = reaper.sweep(at(0)).await.unwrap();
        assert!(report.flagged.is_empty());

        let report = reaper.sweep(at(1801)).await.unwrap();
        assert_eq!(report.flagged, vec!["node001".to_string()]);
        assert_eq!(cluster.removed(), vec!["node001".to_string()]);
        assert_eq!(reaper.tracked_count(), 0);
    }

    #[tokio::test]
    async fn test_busy_host_is_not_flagged() {
        let grid = FakeGrid::with_hosts(&["node001", "node002"]);
        grid.set_jobs(vec![
            GridJob::new("1", JobState::Running).with_target("cpu.q@node001"),
            GridJob::new("2", JobState::Queued), // unassigned, pins nothing
        ]);
        let cluster = FakeCluster::new();
        let mut reaper = IdleReaper::new(grid, cluster.clone(), config());

        reaper.sweep(at(0)).await.unwrap();
        let report = reaper.sweep(at(1801)).await.unwrap();

        // Only node002 was ever idle
        assert_eq!(report.flagged, vec!["node002".to_string()]);
        assert_eq!(cluster.removed(), vec!["node002".to_string()]);
    }

    #[tokio::test]
    async fn test_aggregate_pseudo_host_never_tracked() {
        let grid = FakeGrid::with_hosts(&["global", "node001"]);
        let cluster = FakeCluster::new();
        let mut reaper = IdleReaper::new(grid, cluster.clone(), config());

        let report = reaper.sweep(at(0)).await.unwrap();
        assert_eq!(report.hosts, 1);

        let report = reaper.sweep(at(1801)).await.unwrap();
        assert_eq!(report.flagged, vec!["node001".to_string()]);
    }

    #[tokio::test]
    async fn test_removal_failure_is_isolated_and_retried_next_streak() {
        // End to end: node001 and node002 idle from t=0; node002's removal
        // call fails. Both are flagged once at t=1801, node001 is removed,
        // node002's failure is swallowed, and neither stays tracked. On
        // continued idleness node002 is re-flagged a full timeout later.
        let grid = FakeGrid::with_hosts(&["node001", "node002"]);
        let cluster = FakeCluster::failing_for(&["node002"]);
        let mut reaper = IdleReaper::new(grid.clone(), cluster.clone(), config());

        reaper.sweep(at(0)).await.unwrap();
        let report = reaper.sweep(at(1801)).await.unwrap();

        let mut flagged = report.flagged.clone();
        flagged.sort();
        assert_eq!(flagged, vec!["node001".to_string(), "node002".to_string()]);
        assert_eq!(report.removed, vec!["node001".to_string()]);
        assert_eq!(report.failed, vec!["node002".to_string()]);
        assert_eq!(reaper.tracked_count(), 0);

        // node001 is gone from the cluster; node002 lingers, still idle
        grid.hosts.lock().unwrap().remove("node001");

        let report = reaper.sweep(at(1802)).await.unwrap();
        assert!(report.flagged.is_empty());
        assert_eq!(reaper.tracked_count(), 1);

        let report = reaper.sweep(at(1802 + 1801)).await.unwrap();
        assert_eq!(report.flagged, vec!["node002".to_string()]);
        assert_eq!(report.failed, vec!["node002".to_string()]);
    }

    #[tokio::test]
    async fn test_failed_snapshot_skips_tick_and_preserves_state() {
        let grid = FakeGrid::with_hosts(&["node001"]);
        let cluster = FakeCluster::new();
        let mut reaper = IdleReaper::new(grid.clone(), cluster.clone(), config());

        reaper.sweep(at(0)).await.unwrap();
        assert_eq!(reaper.tracked_count(), 1);

        grid.set_failing(true);
        assert!(reaper.sweep(at(900)).await.is_err());
        assert_eq!(reaper.tracked_count(), 1);

        // The original streak is intact: still flagged at t=1801
        grid.set_failing(false);
        let report = reaper.sweep(at(1801)).await.unwrap();
        assert_eq!(report.flagged, vec!["node001".to_string()]);
    }
}
