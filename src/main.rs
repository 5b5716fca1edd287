//! # Puller Controller
//!
//! Entry point of the controller binary.
//!
//! ```bash
//! puller-controller --controllers '*' --concurrent-puller-syncs 5
//! ```
//!
//! Flags override the environment variables read by `config::load_config`.

use anyhow::{Context, Result};
use clap::Parser;
use puller_controller::config::{load_config, EnabledControllers, ALL_CONTROLLERS};
use puller_controller::constants::PULLER_CONTROLLER;
use puller_controller::runtime::initialization::{initialize, RuntimeOptions};
use puller_controller::runtime::watch_loop::run_watch_loop;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "puller-controller", version)]
#[command(about = "Propagates registry credentials to namespaces and binds them to service accounts", long_about = None)]
struct Args {
    /// Controllers to enable. '*' enables all on-by-default controllers,
    /// 'foo' enables the controller named 'foo', '-foo' disables it
    #[arg(long, value_delimiter = ',', default_value = "*")]
    controllers: Vec<String>,

    /// Number of Puller objects reconciled concurrently
    #[arg(long)]
    concurrent_puller_syncs: Option<u16>,

    /// Port for health probes and metrics
    #[arg(long)]
    metrics_port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let controllers = EnabledControllers::parse(&args.controllers).with_context(|| {
        format!("Known controllers: {}", ALL_CONTROLLERS.join(", "))
    })?;
    let (mut controller, mut server) = load_config();
    if let Some(concurrency) = args.concurrent_puller_syncs {
        controller.concurrency = concurrency;
    }
    if let Some(port) = args.metrics_port {
        server.metrics_port = port;
    }

    let options = RuntimeOptions {
        controller,
        server,
        controllers,
    };
    let init_result = initialize(&options).await?;

    if options.controllers.is_enabled(PULLER_CONTROLLER) {
        run_watch_loop(
            init_result.client,
            init_result.reconciler,
            init_result.server_state,
        )
        .await?;
    } else {
        warn!("No controllers enabled, serving probes only");
        init_result.server_state.mark_ready();
        tokio::signal::ctrl_c()
            .await
            .context("Failed to listen for shutdown signal")?;
    }

    info!("Shutting down");
    Ok(())
}
