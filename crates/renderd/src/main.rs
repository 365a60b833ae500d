//! renderd — the RenderGrid daemon.
//!
//! Single binary that assembles the orchestration subsystems:
//! - State store (redb)
//! - Autoscaler
//! - Dispatcher + pool provisioner
//! - Observer supervisor
//! - Result channel
//!
//! The cluster control plane is an external collaborator; standalone mode
//! substitutes the in-process local plane, which is enough to exercise the
//! full dispatch → observe → reconcile loop on one machine.
//!
//! # Usage
//!
//! ```text
//! renderd standalone --result-port 5001 --data-dir /var/lib/rendergrid
//! ```

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tracing::info;

use rendergrid_state::{ParamValue, ResultSink, TaskSpec};

#[derive(Parser)]
#[command(name = "renderd", about = "RenderGrid daemon")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run all subsystems in one process against the local control plane.
    Standalone {
        /// Data directory for the shared state store.
        #[arg(long, default_value = "/var/lib/rendergrid")]
        data_dir: PathBuf,

        /// Port the result channel listens on.
        #[arg(long, default_value = "5001")]
        result_port: u16,

        /// Load-ratio threshold for adding a pool.
        #[arg(long, default_value = "10.0")]
        threshold: f64,

        /// Autoscaler tick interval in seconds.
        #[arg(long, default_value = "10")]
        autoscale_interval: u64,

        /// Nodes per worker pool.
        #[arg(long, default_value = "4")]
        nodes_per_pool: u32,

        /// Observer stall timeout in seconds.
        #[arg(long, default_value = "60")]
        stall_timeout: u64,

        /// Enqueue this many sample render tasks at startup (smoke test).
        #[arg(long, default_value = "0")]
        demo_jobs: u32,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,renderd=debug,rendergrid=debug".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Standalone {
            data_dir,
            result_port,
            threshold,
            autoscale_interval,
            nodes_per_pool,
            stall_timeout,
            demo_jobs,
        } => {
            run_standalone(
                data_dir,
                result_port,
                threshold,
                autoscale_interval,
                nodes_per_pool,
                stall_timeout,
                demo_jobs,
            )
            .await
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_standalone(
    data_dir: PathBuf,
    result_port: u16,
    threshold: f64,
    autoscale_interval: u64,
    nodes_per_pool: u32,
    stall_timeout: u64,
    demo_jobs: u32,
) -> anyhow::Result<()> {
    info!("RenderGrid daemon starting in standalone mode");

    // Ensure data directory exists.
    std::fs::create_dir_all(&data_dir)?;
    let db_path = data_dir.join("rendergrid.redb");

    // ── Initialize subsystems ──────────────────────────────────

    // State store.
    let state = rendergrid_state::StateStore::open(&db_path)?;
    info!(path = ?db_path, "state store opened");

    // Local control plane: simulated pools whose coordinator replays a
    // successful render on exec.
    let cluster = Arc::new(
        rendergrid_cluster::LocalControlPlane::new().with_exec_script(vec![
            "[START] render job".to_string(),
            "[STATUS] 25%".to_string(),
            "[STATUS] 75%".to_string(),
            "[SUCCESS] render finished".to_string(),
        ]),
    );
    info!("local control plane initialized");

    // Pool provisioner.
    let provisioner = rendergrid_dispatch::PoolProvisioner::new(
        cluster.clone(),
        state.clone(),
        rendergrid_dispatch::ProvisionerConfig {
            nodes_per_pool,
            ..Default::default()
        },
    );

    // Dispatcher.
    let dispatcher = rendergrid_dispatch::Dispatcher::new(
        state.clone(),
        cluster.clone(),
        provisioner.clone(),
        rendergrid_dispatch::DispatcherConfig::default(),
    );
    info!("dispatcher initialized");

    // Observer supervisor.
    let observers = rendergrid_observe::ObserverSet::new(
        state.clone(),
        cluster.clone(),
        rendergrid_observe::ObserverConfig {
            stall_timeout: Duration::from_secs(stall_timeout),
            ..Default::default()
        },
    );
    info!(stall_timeout, "observer supervisor initialized");

    // Autoscaler.
    let autoscaler = rendergrid_autoscale::Autoscaler::new(
        state.clone(),
        provisioner,
        rendergrid_autoscale::AutoscalerConfig {
            threshold,
            interval: Duration::from_secs(autoscale_interval),
        },
    );
    info!(threshold, interval = autoscale_interval, "autoscaler initialized");

    // Result channel.
    let result_addr = SocketAddr::from(([0, 0, 0, 0], result_port));
    let result_listener = tokio::net::TcpListener::bind(result_addr).await?;
    let result_channel = rendergrid_result::ResultChannel::new(
        state.clone(),
        rendergrid_result::ResultChannelConfig::default(),
    );
    info!(%result_addr, "result channel bound");

    // Optional smoke-test jobs.
    for i in 0..demo_jobs {
        let task = demo_task(i);
        state.bind_result(&task.id, &ResultSink::Stored)?;
        state.mark_pending(&task.id)?;
        state.enqueue(&task)?;
        info!(id = %task.id, "demo task enqueued");
    }

    // ── Shutdown signal ────────────────────────────────────────

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // ── Start background tasks ─────────────────────────────────

    let autoscale_handle = {
        let shutdown = shutdown_rx.clone();
        tokio::spawn(async move { autoscaler.run(shutdown).await })
    };
    let dispatch_handle = {
        let shutdown = shutdown_rx.clone();
        tokio::spawn(async move { dispatcher.run(shutdown).await })
    };
    let observe_handle = {
        let shutdown = shutdown_rx.clone();
        tokio::spawn(async move { observers.run(Duration::from_secs(2), shutdown).await })
    };
    let result_handle = {
        let shutdown = shutdown_rx.clone();
        tokio::spawn(async move { result_channel.run(result_listener, shutdown).await })
    };

    info!("all subsystems running, ctrl-c to stop");
    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");

    shutdown_tx.send(true)?;
    let _ = tokio::join!(
        autoscale_handle,
        dispatch_handle,
        observe_handle,
        result_handle
    );

    info!("RenderGrid daemon stopped");
    Ok(())
}

/// A plausible render task for smoke testing the pipeline.
fn demo_task(index: u32) -> TaskSpec {
    let mut params = BTreeMap::new();
    params.insert("width".to_string(), ParamValue::Int(1280));
    params.insert("height".to_string(), ParamValue::Int(720));
    params.insert("block_size".to_string(), ParamValue::Int(32));
    params.insert("samples".to_string(), ParamValue::Int(64));
    params.insert("camera_x".to_string(), ParamValue::Float(0.0));
    params.insert("camera_y".to_string(), ParamValue::Float(0.0));
    params.insert("zoom".to_string(), ParamValue::Float(1.0));
    params.insert("render_type".to_string(), ParamValue::Int(0));
    params.insert("color_mode".to_string(), ParamValue::Int(0));
    TaskSpec {
        id: format!("demo-{index}"),
        params,
        callback: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rendergrid_dispatch::validate_params;

    #[test]
    fn demo_task_passes_submission_validation() {
        let task = demo_task(0);
        assert!(validate_params(&task.params).is_ok());
        assert_eq!(task.id, "demo-0");
    }
}
