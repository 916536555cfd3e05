//! Spot price lookups with a freshness window
//!
//! Querying spot price history is slow and rate-limited, so results are
//! held in a [`TtlCache`] for a fixed window (30 minutes by default). A
//! failed lookup propagates to the caller and never populates the cache:
//! the next query retries the external lookup instead of serving a
//! cached failure.

use crate::cache::TtlCache;
use crate::error::{ReaperError, Result};
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_ec2::types::InstanceType;
use aws_sdk_ec2::Client;
use aws_types::region::Region;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Default AWS region
pub const DEFAULT_REGION: &str = "us-east-1";

/// Default freshness window for cached prices (seconds)
pub const DEFAULT_PRICE_TTL_SECS: u64 = 1800;

/// How far back the price history query looks (hours)
const HISTORY_WINDOW_HOURS: i64 = 24;

/// Three-part summary of an instance type's recent spot market.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceSummary {
    /// Most recent price (USD/hour)
    pub current: f64,

    /// Average over the history window
    pub average: f64,

    /// Maximum over the history window
    pub max: f64,
}

/// Capability interface for the external price lookup.
#[async_trait]
pub trait PriceSource: Send + Sync {
    /// Fetch the price summary for one instance type.
    async fn fetch(&self, instance_type: &str) -> Result<PriceSummary>;
}

/// Spot price history via the EC2 API.
pub struct Ec2PriceSource {
    client: Client,
}

impl Ec2PriceSource {
    /// Wrap an existing EC2 client.
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Create an EC2 client from the environment.
    pub async fn from_env(region: Option<String>) -> Self {
        let region_str = region.unwrap_or_else(|| DEFAULT_REGION.to_string());
        debug!("Creating EC2 client for region: {}", region_str);

        let config = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(region_str))
            .load()
            .await;
        Self::new(Client::new(&config))
    }
}

#[async_trait]
impl PriceSource for Ec2PriceSource {
    async fn fetch(&self, instance_type: &str) -> Result<PriceSummary> {
        let start = chrono::Utc::now() - chrono::Duration::hours(HISTORY_WINDOW_HOURS);

        let response = self
            .client
            .describe_spot_price_history()
            .instance_types(InstanceType::from(instance_type))
            .product_descriptions("Linux/UNIX")
            .start_time(aws_sdk_ec2::primitives::DateTime::from_secs(
                start.timestamp(),
            ))
            .send()
            .await
            .map_err(ReaperError::from_aws)?;

        // (observation time in epoch seconds, price)
        let mut samples: Vec<(i64, f64)> = Vec::new();
        for entry in response.spot_price_history() {
            let price = entry.spot_price().and_then(|p| p.parse::<f64>().ok());
            let secs = entry.timestamp().map(|t| t.secs());
            if let (Some(price), Some(secs)) = (price, secs) {
                samples.push((secs, price));
            }
        }

        if samples.is_empty() {
            return Err(ReaperError::NoPriceData(instance_type.to_string()));
        }

        let current = samples
            .iter()
            .max_by_key(|(secs, _)| *secs)
            .map(|(_, price)| *price)
            .unwrap_or(0.0);
        let sum: f64 = samples.iter().map(|(_, price)| price).sum();
        let max = samples.iter().map(|(_, p)| *p).fold(f64::MIN, f64::max);

        Ok(PriceSummary {
            current,
            average: sum / samples.len() as f64,
            max,
        })
    }
}

/// Price lookups shielded by the TTL cache.
///
/// Shared by the HTTP API and any on-demand consumers; the cache is the
/// only state crossing that boundary and synchronizes internally.
pub struct PriceService {
    source: Box<dyn PriceSource>,
    cache: TtlCache<String, PriceSummary>,
}

impl PriceService {
    /// Cache prices from `source` for the default 30-minute window.
    pub fn new(source: Box<dyn PriceSource>) -> Self {
        Self::with_ttl(source, Duration::from_secs(DEFAULT_PRICE_TTL_SECS))
    }

    /// Cache prices from `source` for a custom window.
    pub fn with_ttl(source: Box<dyn PriceSource>, ttl: Duration) -> Self {
        Self {
            source,
            cache: TtlCache::new(ttl),
        }
    }

    /// The price summary for `instance_type`, served from cache while
    /// fresh. Lookup failures propagate without touching the cache.
    pub async fn price(&self, instance_type: &str) -> Result<PriceSummary> {
        if let Some(hit) = self.cache.get(&instance_type.to_string()).await {
            debug!(instance_type = %instance_type, "spot price served from cache");
            return Ok(hit);
        }

        let summary = self.source.fetch(instance_type).await?;
        self.cache
            .insert(instance_type.to_string(), summary)
            .await;
        Ok(summary)
    }
}
