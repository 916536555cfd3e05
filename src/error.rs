//! Error types for the cluster controller

use thiserror::Error;

/// Controller result type
pub type Result<T> = std::result::Result<T, ReaperError>;

/// Errors that can occur while managing the cluster
#[derive(Error, Debug)]
pub enum ReaperError {
    /// Grid engine tool failure (qhost/qstat)
    #[error("grid engine error: {0}")]
    Grid(String),

    /// Cluster management tool failure (addnode/removenode)
    #[error("cluster tool error: {0}")]
    Cluster(String),

    /// Generic AWS service error (spot price lookups)
    #[error("AWS service error: {0}")]
    AwsService(String),

    /// No spot price data returned for an instance type
    #[error("no spot price data for instance type {0}")]
    NoPriceData(String),

    /// Instance type not present in a queue's slot map
    #[error("instance type {instance_type} not configured for queue {queue}")]
    UnknownInstanceType {
        /// Queue whose slot map was consulted
        queue: String,
        /// The unconfigured instance type
        instance_type: String,
    },

    /// Configuration error (queue policy validation, malformed policy file)
    #[error("configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ReaperError {
    /// Create a grid engine error
    pub fn grid(msg: impl Into<String>) -> Self {
        Self::Grid(msg.into())
    }

    /// Create a cluster tool error
    pub fn cluster(msg: impl Into<String>) -> Self {
        Self::Cluster(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Convert from a generic AWS SDK error
    pub fn from_aws<E>(err: E) -> Self
    where
        E: std::fmt::Display,
    {
        Self::AwsService(err.to_string())
    }
}
