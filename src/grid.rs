//! Grid engine snapshot capability
//!
//! The controller never invokes the grid engine tools directly; it works
//! through the [`GridScheduler`] trait ONLY. Production deployments use
//! [`SgeTools`], which shells out to `qhost`/`qstat`; tests substitute
//! deterministic fakes and assert on call sequences.

use crate::error::{ReaperError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tokio::process::Command;
use tracing::debug;

/// Reserved pseudo-host the host listing uses for cluster-wide aggregates.
/// Never a schedulable host; must not enter idle tracking.
pub const AGGREGATE_PSEUDO_HOST: &str = "global";

/// Scheduling state of a grid job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobState {
    /// Running on an execution host
    Running,
    /// Waiting in a queue, not yet bound to a host
    Queued,
}

/// One job from the scheduler's job listing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GridJob {
    /// Scheduler-assigned job id (array tasks render as `id.task`)
    pub id: String,

    /// Queue instance the job is bound to, as `queue@host`.
    /// Absent while the job waits unassigned.
    pub queue_target: Option<String>,

    /// Current scheduling state
    pub state: JobState,
}

impl GridJob {
    /// Create a job with no queue binding yet.
    pub fn new(id: impl Into<String>, state: JobState) -> Self {
        Self {
            id: id.into(),
            queue_target: None,
            state,
        }
    }

    /// Bind the job to a queue instance (`queue@host`).
    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.queue_target = Some(target.into());
        self
    }

    /// The execution host this job is bound to, recovered from the
    /// `queue@host` target. `None` for unassigned jobs.
    pub fn bound_host(&self) -> Option<&str> {
        let target = self.queue_target.as_deref()?;
        let (_, host) = target.split_once('@')?;
        if host.is_empty() { None } else { Some(host) }
    }
}

/// Derive the set of busy hosts from a job snapshot.
///
/// A host is busy when any job's target is bound to it, regardless of
/// state; queued-but-unassigned jobs carry no target and mark nothing.
pub fn busy_hosts(jobs: &[GridJob]) -> HashSet<String> {
    jobs.iter()
        .filter_map(|j| j.bound_host())
        .map(str::to_string)
        .collect()
}

/// Capability interface over the grid engine's cluster snapshots.
#[async_trait]
pub trait GridScheduler: Send + Sync {
    /// All known execution hosts, excluding the aggregate pseudo-host.
    async fn hosts(&self) -> Result<HashSet<String>>;

    /// All jobs currently known to the scheduler.
    async fn jobs(&self) -> Result<Vec<GridJob>>;
}

/// Production adapter that shells out to the SGE command line tools.
pub struct SgeTools {
    qhost_bin: String,
    qstat_bin: String,
}

impl SgeTools {
    /// Use `qhost`/`qstat` from `$PATH`.
    pub fn new() -> Self {
        Self {
            qhost_bin: "qhost".to_string(),
            qstat_bin: "qstat".to_string(),
        }
    }

    /// Override the tool binaries (e.g. absolute paths on the master node).
    pub fn with_binaries(mut self, qhost: impl Into<String>, qstat: impl Into<String>) -> Self {
        self.qhost_bin = qhost.into();
        self.qstat_bin = qstat.into();
        self
    }

    async fn run(&self, bin: &str, args: &[&str]) -> Result<String> {
        debug!(tool = %bin, "invoking grid engine tool");
        let output = Command::new(bin).args(args).output().await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ReaperError::grid(format!(
                "{} failed: {}",
                bin,
                stderr.trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl Default for SgeTools {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl GridScheduler for SgeTools {
    async fn hosts(&self) -> Result<HashSet<String>> {
        let stdout = self.run(&self.qhost_bin, &[]).await?;
        Ok(parse_qhost(&stdout))
    }

    async fn jobs(&self) -> Result<Vec<GridJob>> {
        // -u '*': all users' jobs, not just our own
        let stdout = self.run(&self.qstat_bin, &["-u", "*"]).await?;
        Ok(parse_qstat(&stdout))
    }
}

/// First column of each data row is the host name; the first two lines are
/// the column header and its underline rule.
fn parse_qhost(stdout: &str) -> HashSet<String> {
    stdout
        .lines()
        .skip(2)
        .filter_map(|line| line.split_whitespace().next())
        .filter(|name| *name != AGGREGATE_PSEUDO_HOST)
        .map(str::to_string)
        .collect()
}

/// Data rows carry `job-ID ... state ... [queue@host]`; the queue column is
/// empty for pending jobs, so the target is located by its `@` rather than
/// by position.
fn parse_qstat(stdout: &str) -> Vec<GridJob> {
    let mut jobs = Vec::new();
    for line in stdout.lines().skip(2) {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 5 {
            continue;
        }
        let state = if fields[4].contains('r') || fields[4].contains('t') {
            JobState::Running
        } else {
            JobState::Queued
        };
        let mut job = GridJob::new(fields[0], state);
        if let Some(target) = fields.iter().find(|f| f.contains('@')) {
            job = job.with_target(*target);
        }
        jobs.push(job);
    }
    jobs
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bound_host_from_target() {
        let job = GridJob::new("104", JobState::Running).with_target("cpu.q@node001");
        assert_eq!(job.bound_host(), Some("node001"));

        let pending = GridJob::new("105", JobState::Queued);
        assert_eq!(pending.bound_host(), None);
    }

    #[test]
    fn test_busy_hosts_ignores_unassigned_jobs() {
        let jobs = vec![
            GridJob::new("1", JobState::Running).with_target("cpu.q@node001"),
            GridJob::new("2", JobState::Running).with_target("gpu.q@node002"),
            GridJob::new("3", JobState::Queued), // not yet bound anywhere
        ];

        let busy = busy_hosts(&jobs);
        assert_eq!(busy.len(), 2);
        assert!(busy.contains("node001"));
        assert!(busy.contains("node002"));
    }

    #[test]
    fn test_queued_job_with_target_marks_host_busy() {
        // A scheduled-but-not-yet-running job still pins its host
        let jobs = vec![GridJob::new("7", JobState::Queued).with_target("cpu.q@node003")];
        assert!(busy_hosts(&jobs).contains("node003"));
    }

    #[test]
    fn test_parse_qhost_drops_aggregate_row() {
        let out = "\
HOSTNAME                ARCH         NCPU NSOC NCOR NTHR  LOAD  MEMTOT  MEMUSE  SWAPTO  SWAPUS
----------------------------------------------------------------------------------------------
global                  -               -    -    -    -     -       -       -       -       -
node001                 lx-amd64       16    1   16   16  0.01   62.1G    1.2G    0.0     0.0
node002                 lx-amd64       16    1   16   16  0.00   62.1G    0.9G    0.0     0.0
";
        let hosts = parse_qhost(out);
        assert_eq!(hosts, HashSet::from(["node001".to_string(), "node002".to_string()]));
    }

    #[test]
    fn test_parse_qstat_running_and_pending() {
        let out = "\
job-ID  prior   name       user         state submit/start at     queue                          slots ja-task-ID
-----------------------------------------------------------------------------------------------------------------
    104 0.55500 train      alice        r     01/17/2024 10:30:00 gpu.q@node001                      1
    105 0.00000 preprocess bob          qw    01/17/2024 10:31:00                                    1
";
        let jobs = parse_qstat(out);
        assert_eq!(jobs.len(), 2);
        assert_eq!(jobs[0].state, JobState::Running);
        assert_eq!(jobs[0].bound_host(), Some("node001"));
        assert_eq!(jobs[1].state, JobState::Queued);
        assert_eq!(jobs[1].bound_host(), None);
    }
}
