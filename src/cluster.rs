//! Cluster node lifecycle capability
//!
//! Adding and removing execution hosts is delegated to the cluster
//! management tool behind the [`ClusterOps`] trait, so the controller and
//! the API never depend on how nodes actually come and go. A removal
//! request, once issued, is not retractable.

use crate::error::{ReaperError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tracing::{debug, info};

/// Parameters for launching a new execution host.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AddNodeRequest {
    /// Instance type to launch; the tool's configured default when absent
    pub instance_type: Option<String>,

    /// Spot bid (USD/hour); on-demand when absent
    pub spot_bid: Option<String>,

    /// Availability zone
    pub zone: Option<String>,

    /// Subnet id
    pub subnet: Option<String>,
}

impl AddNodeRequest {
    /// Request a node of a specific instance type.
    pub fn instance_type(ty: impl Into<String>) -> Self {
        Self {
            instance_type: Some(ty.into()),
            ..Default::default()
        }
    }

    /// Set the spot bid.
    pub fn with_spot_bid(mut self, bid: impl Into<String>) -> Self {
        self.spot_bid = Some(bid.into());
        self
    }

    /// Set the availability zone.
    pub fn with_zone(mut self, zone: impl Into<String>) -> Self {
        self.zone = Some(zone.into());
        self
    }

    /// Set the subnet.
    pub fn with_subnet(mut self, subnet: impl Into<String>) -> Self {
        self.subnet = Some(subnet.into());
        self
    }
}

/// Capability interface for growing and shrinking the cluster.
#[async_trait]
pub trait ClusterOps: Send + Sync {
    /// Launch a new execution host.
    async fn add_node(&self, request: &AddNodeRequest) -> Result<()>;

    /// Terminate the execution host known by `alias`.
    async fn remove_node(&self, alias: &str) -> Result<()>;
}

/// Production adapter wrapping the starcluster command line tool.
pub struct StarClusterCtl {
    cluster_name: String,
    config_path: Option<String>,
    binary: String,
}

impl StarClusterCtl {
    /// Manage the named cluster with `starcluster` from `$PATH`.
    pub fn new(cluster_name: impl Into<String>) -> Self {
        Self {
            cluster_name: cluster_name.into(),
            config_path: None,
            binary: "starcluster".to_string(),
        }
    }

    /// Use an explicit starcluster config file.
    pub fn with_config_path(mut self, path: impl Into<String>) -> Self {
        self.config_path = Some(path.into());
        self
    }

    /// Override the starcluster binary.
    pub fn with_binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = binary.into();
        self
    }

    /// The cluster this adapter manages.
    pub fn cluster_name(&self) -> &str {
        &self.cluster_name
    }

    async fn run(&self, args: Vec<String>) -> Result<()> {
        let mut full_args = Vec::new();
        if let Some(config) = &self.config_path {
            full_args.push("-c".to_string());
            full_args.push(config.clone());
        }
        full_args.extend(args);

        debug!(tool = %self.binary, args = ?full_args, "invoking cluster tool");
        let output = Command::new(&self.binary).args(&full_args).output().await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ReaperError::cluster(format!(
                "{} {} failed: {}",
                self.binary,
                full_args.first().map(String::as_str).unwrap_or(""),
                stderr.trim()
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl ClusterOps for StarClusterCtl {
    async fn add_node(&self, request: &AddNodeRequest) -> Result<()> {
        let mut args = vec!["addnode".to_string()];
        if let Some(ty) = &request.instance_type {
            args.push("--instance-type".to_string());
            args.push(ty.clone());
        }
        if let Some(bid) = &request.spot_bid {
            args.push("--bid".to_string());
            args.push(bid.clone());
        }
        if let Some(zone) = &request.zone {
            args.push("--availability-zone".to_string());
            args.push(zone.clone());
        }
        if let Some(subnet) = &request.subnet {
            args.push("--subnet-id".to_string());
            args.push(subnet.clone());
        }
        args.push(self.cluster_name.clone());

        info!(
            cluster = %self.cluster_name,
            instance_type = request.instance_type.as_deref().unwrap_or("default"),
            "adding node"
        );
        self.run(args).await
    }

    async fn remove_node(&self, alias: &str) -> Result<()> {
        info!(cluster = %self.cluster_name, host = %alias, "removing node");
        self.run(vec![
            "removenode".to_string(),
            "--confirm".to_string(),
            "--alias".to_string(),
            alias.to_string(),
            self.cluster_name.clone(),
        ])
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_node_request_builder() {
        let request = AddNodeRequest::instance_type("p3.2xlarge")
            .with_spot_bid("0.90")
            .with_zone("us-east-1a");

        assert_eq!(request.instance_type.as_deref(), Some("p3.2xlarge"));
        assert_eq!(request.spot_bid.as_deref(), Some("0.90"));
        assert_eq!(request.zone.as_deref(), Some("us-east-1a"));
        assert!(request.subnet.is_none());
    }

    #[test]
    fn test_ctl_builder() {
        let ctl = StarClusterCtl::new("dev").with_config_path("/etc/starcluster/config");
        assert_eq!(ctl.cluster_name(), "dev");
        assert_eq!(ctl.config_path.as_deref(), Some("/etc/starcluster/config"));
    }
}
