//! Continuous-idle tracking for execution hosts
//!
//! Records, per host, the first moment it was observed idle and surfaces
//! hosts that have stayed idle past the configured timeout. Only the
//! first-idle timestamp is persisted; busy/idle itself is derived fresh on
//! every tick from the snapshot the controller passes in.
//!
//! ## Streak semantics
//!
//! A busy observation breaks the streak: the host's record is deleted and
//! the clock restarts the next time it is seen idle. A host that crosses
//! the timeout is reported in exactly one tick's removal set and dropped
//! from tracking, so one continuous streak produces one removal request.
//!
//! The tracker is a plain state object owned by the controller loop. It is
//! never shared; `tick` is a pure transformation over the explicit snapshot
//! and has no failure mode of its own.

use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::time::Duration;

/// Per-host first-idle bookkeeping.
#[derive(Debug)]
pub struct IdleTracker {
    /// Continuous idle duration a host must exhibit before eviction
    timeout: Duration,

    /// Host name -> first time it was observed idle, continuously since then
    first_idle: HashMap<String, DateTime<Utc>>,
}

impl IdleTracker {
    /// Create a tracker with the given idle timeout.
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            first_idle: HashMap::new(),
        }
    }

    /// The configured idle timeout.
    pub fn idle_timeout(&self) -> Duration {
        self.timeout
    }

    /// Number of hosts currently carrying an idle streak.
    pub fn tracked_count(&self) -> usize {
        self.first_idle.len()
    }

    /// Advance the tracker by one observation and return the hosts whose
    /// idle streak has exceeded the timeout.
    ///
    /// `hosts` is the set of all known execution hosts (the aggregate
    /// pseudo-host must already be filtered out); `busy` is the subset with
    /// at least one running or scheduled job. Returned hosts are removed
    /// from tracking so they are not re-reported on the next tick; ordering
    /// of the result is unspecified.
    pub fn tick(
        &mut self,
        now: DateTime<Utc>,
        hosts: &HashSet<String>,
        busy: &HashSet<String>,
    ) -> Vec<String> {
        // A busy observation breaks the idle streak.
        for host in busy {
            self.first_idle.remove(host);
        }

        // Start the clock for hosts newly observed idle.
        for host in hosts {
            if !busy.contains(host) {
                self.first_idle.entry(host.clone()).or_insert(now);
            }
        }

        // Extract hosts past the timeout, deleting their records.
        let timeout_ms = self.timeout.as_millis() as i64;
        let mut expired = Vec::new();
        self.first_idle.retain(|host, since| {
            let overdue = now.signed_duration_since(*since).num_milliseconds() > timeout_ms;
            if overdue {
                expired.push(host.clone());
            }
            !overdue
        });
        expired
    }
}
