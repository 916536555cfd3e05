//! Queue scaling policies
//!
//! Each grid engine queue is backed by a pool of cloud instances. A
//! [`QueuePolicy`] describes how that pool scales: which instance type to
//! launch by default, how much of the queue's workload one node of each
//! supported type can absorb (its slot weight), and how large the pool may
//! grow. Policies are validated once at load time and shared read-only —
//! a malformed policy is rejected before the server starts.

use crate::error::{ReaperError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Don't terminate a node younger than this (minutes)
pub const DEFAULT_MIN_AGE_MINUTES: u32 = 30;

/// Scaling shape of a single work queue.
///
/// Immutable after construction; `new` rejects invalid shapes so consumers
/// never see a policy whose default type is unlaunchable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueuePolicy {
    /// Queue name (e.g. "cpu.q")
    name: String,

    /// Instance type launched when no explicit type is requested
    default_type: String,

    /// Instance type -> capacity weight (slots one node of that type absorbs)
    slots: HashMap<String, u32>,

    /// Maximum number of nodes this queue may grow to
    max_nodes: u32,

    /// Minimum node age before termination eligibility (minutes)
    #[serde(default = "default_min_age")]
    min_age_minutes: u32,
}

fn default_min_age() -> u32 {
    DEFAULT_MIN_AGE_MINUTES
}

impl QueuePolicy {
    /// Create a validated queue policy.
    ///
    /// Fails when `default_type` is absent from `slots`, when `slots` is
    /// empty or carries a zero weight, or when `max_nodes` is zero.
    pub fn new(
        name: impl Into<String>,
        default_type: impl Into<String>,
        slots: HashMap<String, u32>,
        max_nodes: u32,
    ) -> Result<Self> {
        let policy = Self {
            name: name.into(),
            default_type: default_type.into(),
            slots,
            max_nodes,
            min_age_minutes: DEFAULT_MIN_AGE_MINUTES,
        };
        policy.validate()?;
        Ok(policy)
    }

    /// Set the minimum node age (minutes) before termination eligibility.
    pub fn with_min_age(mut self, minutes: u32) -> Self {
        self.min_age_minutes = minutes;
        self
    }

    fn validate(&self) -> Result<()> {
        if self.slots.is_empty() {
            return Err(ReaperError::config(format!(
                "queue {}: slot map is empty",
                self.name
            )));
        }
        if !self.slots.contains_key(&self.default_type) {
            return Err(ReaperError::config(format!(
                "queue {}: default instance type {} is not in the slot map",
                self.name, self.default_type
            )));
        }
        if let Some((ty, _)) = self.slots.iter().find(|(_, w)| **w == 0) {
            return Err(ReaperError::config(format!(
                "queue {}: instance type {} has zero capacity weight",
                self.name, ty
            )));
        }
        if self.max_nodes < 1 {
            return Err(ReaperError::config(format!(
                "queue {}: max_nodes must be at least 1",
                self.name
            )));
        }
        Ok(())
    }

    /// Queue name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Instance type launched by default.
    pub fn default_type(&self) -> &str {
        &self.default_type
    }

    /// Maximum node count for this queue.
    pub fn max_nodes(&self) -> u32 {
        self.max_nodes
    }

    /// Minimum node age (minutes) before termination eligibility.
    pub fn min_age_minutes(&self) -> u32 {
        self.min_age_minutes
    }

    /// Capacity weight configured for `instance_type`.
    pub fn slot_weight(&self, instance_type: &str) -> Result<u32> {
        self.slots
            .get(instance_type)
            .copied()
            .ok_or_else(|| ReaperError::UnknownInstanceType {
                queue: self.name.clone(),
                instance_type: instance_type.to_string(),
            })
    }

    /// Whether this queue can launch `instance_type`.
    pub fn supports(&self, instance_type: &str) -> bool {
        self.slots.contains_key(instance_type)
    }
}

/// The validated set of queue policies for one cluster.
///
/// Deliberately not `Deserialize`: deserialization goes through
/// [`ClusterPolicies::from_file`] so validation can never be skipped.
#[derive(Debug, Clone, Serialize)]
#[serde(transparent)]
pub struct ClusterPolicies {
    queues: Vec<QueuePolicy>,
}

impl ClusterPolicies {
    /// Build a policy set, re-validating every queue and rejecting
    /// duplicate queue names.
    pub fn new(queues: Vec<QueuePolicy>) -> Result<Self> {
        let mut seen = std::collections::HashSet::new();
        for queue in &queues {
            queue.validate()?;
            if !seen.insert(queue.name.clone()) {
                return Err(ReaperError::config(format!(
                    "duplicate queue name {}",
                    queue.name
                )));
            }
        }
        Ok(Self { queues })
    }

    /// The stock three-queue layout: general compute, GPU, and high-memory.
    pub fn builtin() -> Result<Self> {
        let cpu = QueuePolicy::new(
            "cpu.q",
            "c5.4xlarge",
            HashMap::from([
                ("c4.xlarge".to_string(), 1),
                ("c5.2xlarge".to_string(), 2),
                ("c5.4xlarge".to_string(), 4),
                ("c5.9xlarge".to_string(), 9),
            ]),
            8,
        )?;
        let gpu = QueuePolicy::new(
            "gpu.q",
            "p3.2xlarge",
            HashMap::from([
                ("p3.2xlarge".to_string(), 1),
                ("p3.8xlarge".to_string(), 4),
                ("p2.xlarge".to_string(), 1),
                ("p2.8xlarge".to_string(), 4),
            ]),
            4,
        )?;
        let mem = QueuePolicy::new(
            "mem.q",
            "c5.18xlarge",
            HashMap::from([
                ("m4.16xlarge".to_string(), 1),
                ("c5.18xlarge".to_string(), 1),
                ("c5.24xlarge".to_string(), 1),
            ]),
            3,
        )?;
        Self::new(vec![cpu, gpu, mem])
    }

    /// Load and validate a policy set from a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let queues: Vec<QueuePolicy> = serde_json::from_str(&raw)?;
        Self::new(queues)
    }

    /// All queues.
    pub fn queues(&self) -> &[QueuePolicy] {
        &self.queues
    }

    /// Look up a queue by name.
    pub fn get(&self, name: &str) -> Option<&QueuePolicy> {
        self.queues.iter().find(|q| q.name == name)
    }

    /// Whether any queue can launch `instance_type`.
    pub fn supports_instance_type(&self, instance_type: &str) -> bool {
        self.queues.iter().any(|q| q.supports(instance_type))
    }
}
