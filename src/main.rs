//! Gridreaper - elastic grid-engine cluster control server
//!
//! Serves the starcluster/qstat control API and runs the idle host
//! eviction loop in the background.
//!
//! ```bash
//! # Manage the "dev" cluster, evicting hosts idle for 30+ minutes
//! gridreaper --cluster-name dev
//!
//! # Custom queue policies and a tighter idle timeout
//! gridreaper --cluster-name prod --queues /etc/gridreaper/queues.json --idle-timeout 15
//! ```

use clap::Parser;
use gridreaper::{
    api::{self, ApiState},
    cluster::StarClusterCtl,
    grid::SgeTools,
    policy::ClusterPolicies,
    pricing::{Ec2PriceSource, PriceService},
    reaper::{IdleReaper, ReaperConfig},
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Run a server which exposes the starcluster and qstat APIs.
#[derive(Parser)]
#[command(name = "gridreaper")]
#[command(about = "Elastic scaling control for a grid-engine cluster", long_about = None)]
struct Args {
    /// IP address of interface to listen on
    #[arg(long, default_value = "0.0.0.0")]
    host_ip: String,

    /// Port to listen on
    #[arg(long, default_value_t = 6360)]
    port: u16,

    /// Name of the cluster to manage
    #[arg(long, default_value = "dev")]
    cluster_name: String,

    /// Path to starcluster config file
    #[arg(long, default_value = "/etc/starcluster/config")]
    starcluster_config: String,

    /// Queue policy file (JSON); built-in defaults when omitted
    #[arg(long)]
    queues: Option<PathBuf>,

    /// Shut down nodes if idle longer than this (minutes)
    #[arg(long, default_value_t = 30)]
    idle_timeout: u64,

    /// Seconds between idle sweeps
    #[arg(long, default_value_t = 60)]
    sweep_interval: u64,

    /// AWS region for spot price lookups
    #[arg(long, default_value = "us-east-1")]
    region: String,

    /// Spot price cache freshness window (seconds)
    #[arg(long, default_value_t = 1800)]
    price_ttl: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gridreaper=info,info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    // Queue policies fail fast: a malformed policy never reaches serving
    let policies = Arc::new(match &args.queues {
        Some(path) => {
            info!(path = %path.display(), "loading queue policies");
            ClusterPolicies::from_file(path)?
        }
        None => ClusterPolicies::builtin()?,
    });

    let grid: Arc<dyn gridreaper::GridScheduler> = Arc::new(SgeTools::new());
    let cluster: Arc<dyn gridreaper::ClusterOps> = Arc::new(
        StarClusterCtl::new(&args.cluster_name).with_config_path(&args.starcluster_config),
    );

    let price_source = Ec2PriceSource::from_env(Some(args.region.clone())).await;
    let prices = Arc::new(PriceService::with_ttl(
        Box::new(price_source),
        Duration::from_secs(args.price_ttl),
    ));

    let config = ReaperConfig::default()
        .with_idle_timeout(Duration::from_secs(args.idle_timeout * 60))
        .with_sweep_interval(Duration::from_secs(args.sweep_interval));
    let reaper = IdleReaper::new(grid.clone(), cluster.clone(), config);
    tokio::spawn(reaper.run());

    info!(
        cluster = %args.cluster_name,
        idle_timeout_min = args.idle_timeout,
        sweep_interval_secs = args.sweep_interval,
        "🧹 idle eviction running"
    );

    let state = Arc::new(ApiState {
        cluster_name: args.cluster_name.clone(),
        grid,
        cluster,
        prices,
        policies,
        started: Instant::now(),
    });
    let app = api::router(state);

    let addr = format!("{}:{}", args.host_ip, args.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("🚀 Listening on {}", addr);
    axum::serve(listener, app).await?;

    Ok(())
}
