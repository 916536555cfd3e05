//! HTTP status and control API
//!
//! Exposes cluster snapshots, queue policies, cached spot prices, and
//! add/remove-node actions over a small JSON envelope: every response
//! carries `"status": "ok"` with the payload inlined, or
//! `"status": "error"` with a message. Callers switch on the envelope
//! field, not the HTTP status.
//!
//! Idle-eviction state is deliberately absent here: the idle tracker is
//! owned by the eviction loop and never read from the request path.

use crate::cluster::{AddNodeRequest, ClusterOps};
use crate::grid::GridScheduler;
use crate::policy::ClusterPolicies;
use crate::pricing::PriceService;
use axum::extract::{Path, Query, State};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Instant;
use tracing::error;

/// Shared state behind every handler.
pub struct ApiState {
    /// Cluster this server manages
    pub cluster_name: String,

    /// Grid engine snapshots
    pub grid: Arc<dyn GridScheduler>,

    /// Node lifecycle operations
    pub cluster: Arc<dyn ClusterOps>,

    /// Cached spot price lookups
    pub prices: Arc<PriceService>,

    /// Validated queue policies
    pub policies: Arc<ClusterPolicies>,

    /// Process start, for uptime reporting
    pub started: Instant,
}

/// Build the API router.
pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/status", get(status))
        .route("/qhost", get(qhost))
        .route("/qstat", get(qstat))
        .route("/queues", get(queues))
        .route("/price/{instance_type}", get(price))
        .route("/nodes/add", get(nodes_add))
        .route("/nodes/{alias}/remove", get(node_remove))
        .with_state(state)
}

fn fail(err: impl std::fmt::Display) -> Json<Value> {
    error!(error = %err, "request failed");
    Json(json!({ "status": "error", "error": err.to_string() }))
}

async fn status(State(state): State<Arc<ApiState>>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "cluster": state.cluster_name,
        "uptime_secs": state.started.elapsed().as_secs(),
        "queues": state.policies.queues().len(),
    }))
}

async fn qhost(State(state): State<Arc<ApiState>>) -> Json<Value> {
    match state.grid.hosts().await {
        Ok(hosts) => {
            let mut hosts: Vec<String> = hosts.into_iter().collect();
            hosts.sort();
            Json(json!({ "status": "ok", "hosts": hosts }))
        }
        Err(e) => fail(e),
    }
}

async fn qstat(State(state): State<Arc<ApiState>>) -> Json<Value> {
    match state.grid.jobs().await {
        Ok(jobs) => Json(json!({ "status": "ok", "jobs": jobs })),
        Err(e) => fail(e),
    }
}

async fn queues(State(state): State<Arc<ApiState>>) -> Json<Value> {
    Json(json!({ "status": "ok", "queues": state.policies.queues() }))
}

async fn price(
    State(state): State<Arc<ApiState>>,
    Path(instance_type): Path<String>,
) -> Json<Value> {
    match state.prices.price(&instance_type).await {
        Ok(summary) => Json(json!({
            "status": "ok",
            "instance_type": instance_type,
            "price": summary,
        })),
        Err(e) => fail(e),
    }
}

#[derive(Debug, Deserialize)]
struct AddNodeParams {
    instance_type: Option<String>,
    spot_bid: Option<String>,
    zone: Option<String>,
    subnet: Option<String>,
}

async fn nodes_add(
    State(state): State<Arc<ApiState>>,
    Query(params): Query<AddNodeParams>,
) -> Json<Value> {
    // Reject types no queue is configured to launch before touching the tool
    if let Some(ty) = &params.instance_type {
        if !state.policies.supports_instance_type(ty) {
            return fail(format!("instance type {ty} not configured for any queue"));
        }
    }

    let request = AddNodeRequest {
        instance_type: params.instance_type,
        spot_bid: params.spot_bid,
        zone: params.zone,
        subnet: params.subnet,
    };
    match state.cluster.add_node(&request).await {
        Ok(()) => Json(json!({ "status": "ok" })),
        Err(e) => fail(e),
    }
}

async fn node_remove(
    State(state): State<Arc<ApiState>>,
    Path(alias): Path<String>,
) -> Json<Value> {
    match state.cluster.remove_node(&alias).await {
        Ok(()) => Json(json!({ "status": "ok" })),
        Err(e) => fail(e),
    }
}
