//! # Gridreaper
//!
//! Elastic scaling control for a grid-engine cluster backed by cloud
//! instances.
//!
//! ## Architecture
//!
//! ```text
//! HTTP API (axum)              Eviction loop (tokio task)
//! ├── snapshots, prices   ←──  qhost/qstat snapshots
//! ├── queue policies           │
//! └── add/remove node     ────→ idle tracker → removenode
//!          │                            │
//!          └───── TTL price cache ──────┘  (only shared state)
//! ```
//!
//! The controller decides which hosts have been idle long enough to
//! decommission and encodes the provisioning shape of each work queue.
//! External tools are reached only through injected capability traits
//! ([`grid::GridScheduler`], [`cluster::ClusterOps`],
//! [`pricing::PriceSource`]), so the decision logic is testable with
//! deterministic fakes and per-host failures stay isolated.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod api;
pub mod cache;
pub mod cluster;
pub mod error;
pub mod grid;
pub mod idle;
pub mod policy;
pub mod pricing;
pub mod reaper;

// ============================================================================
// Public exports - Core decision logic
// ============================================================================

// Idle tracking and the eviction loop
pub use idle::IdleTracker;
pub use reaper::{
    IdleReaper, ReaperConfig, SweepReport, DEFAULT_IDLE_TIMEOUT_SECS, DEFAULT_SWEEP_INTERVAL_SECS,
};

// Queue scaling policies
pub use policy::{ClusterPolicies, QueuePolicy, DEFAULT_MIN_AGE_MINUTES};

// TTL cache and price lookups
pub use cache::TtlCache;
pub use pricing::{
    Ec2PriceSource, PriceService, PriceSource, PriceSummary, DEFAULT_PRICE_TTL_SECS,
    DEFAULT_REGION,
};

// ============================================================================
// Public exports - Capability interfaces and adapters
// ============================================================================

pub use cluster::{AddNodeRequest, ClusterOps, StarClusterCtl};
pub use grid::{busy_hosts, GridJob, GridScheduler, JobState, SgeTools, AGGREGATE_PSEUDO_HOST};

// Error handling
pub use error::{ReaperError, Result};

// HTTP surface
pub use api::{router, ApiState};
