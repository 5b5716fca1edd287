//! # pullerctl
//!
//! Command-line interface for the Puller controller.
//!
//! ## Usage
//!
//! ```bash
//! # Force a reconcile of a Puller
//! pullerctl reconcile --name creds1
//!
//! # List all Puller resources
//! pullerctl list
//!
//! # Show status of a Puller
//! pullerctl status --name creds1
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use kube::api::{Api, ListParams, Patch, PatchParams};
use kube::{Client, ResourceExt};
use puller_controller::constants::{CONDITION_TYPE_ERROR, CONDITION_TYPE_READY, RECONCILE_ANNOTATION};
use puller_controller::crd::{Puller, PullerStatus};
use serde_json::json;

/// Puller controller CLI
#[derive(Parser, Debug)]
#[command(name = "pullerctl")]
#[command(about = "Inspect and trigger Puller resources", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Trigger reconciliation of a Puller by stamping an annotation
    Reconcile {
        /// Name of the Puller resource
        #[arg(short, long)]
        name: String,
    },
    /// List all Puller resources
    List,
    /// Show status of a Puller resource
    Status {
        /// Name of the Puller resource
        #[arg(short, long)]
        name: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    puller_controller::observability::init_tracing("pullerctl=info");

    let cli = Cli::parse();

    let client = Client::try_default()
        .await
        .context("Failed to create Kubernetes client. Ensure kubeconfig is configured.")?;
    let api: Api<Puller> = Api::all(client);

    match cli.command {
        Commands::Reconcile { name } => reconcile_command(&api, &name).await,
        Commands::List => list_command(&api).await,
        Commands::Status { name } => status_command(&api, &name).await,
    }
}

/// Any metadata change produces a watch event, which the controller reconciles
async fn reconcile_command(api: &Api<Puller>, name: &str) -> Result<()> {
    println!("Triggering reconciliation for Puller '{name}'...");

    let timestamp = chrono::Utc::now().to_rfc3339();
    let patch = json!({
        "metadata": {
            "annotations": {
                RECONCILE_ANNOTATION: timestamp
            }
        }
    });

    api.patch(name, &PatchParams::default(), &Patch::Merge(patch))
        .await
        .with_context(|| format!("Failed to trigger reconciliation for '{name}'"))?;

    println!("Reconciliation triggered");
    println!("   Resource: {name}");
    println!("   Timestamp: {timestamp}");
    Ok(())
}

fn condition_cell(status: Option<&PullerStatus>, condition_type: &str) -> String {
    status
        .and_then(|s| s.condition(condition_type))
        .map_or_else(|| "Unknown".to_string(), |c| c.status.to_string())
}

async fn list_command(api: &Api<Puller>) -> Result<()> {
    let pullers = api
        .list(&ListParams::default())
        .await
        .context("Failed to list Puller resources")?;

    if pullers.items.is_empty() {
        println!("No Puller resources found.");
        return Ok(());
    }

    println!("{:<30} {:<10} {:<10} {:<12}", "NAME", "READY", "ERROR", "REGISTRIES");
    println!("{}", "-".repeat(64));
    for puller in &pullers.items {
        println!(
            "{:<30} {:<10} {:<10} {:<12}",
            puller.name_any(),
            condition_cell(puller.status.as_ref(), CONDITION_TYPE_READY),
            condition_cell(puller.status.as_ref(), CONDITION_TYPE_ERROR),
            puller.spec.registries.len()
        );
    }
    Ok(())
}

async fn status_command(api: &Api<Puller>, name: &str) -> Result<()> {
    let puller = api
        .get(name)
        .await
        .with_context(|| format!("Failed to get Puller '{name}'"))?;

    println!("Status for Puller '{name}':\n");
    println!("Metadata:");
    if let Some(generation) = puller.metadata.generation {
        println!("  Generation: {generation}");
    }
    if puller.metadata.deletion_timestamp.is_some() {
        println!("  Terminating: true");
    }
    if !puller.finalizers().is_empty() {
        println!("  Finalizers: {}", puller.finalizers().join(", "));
    }

    println!("\nSpec:");
    for registry in &puller.spec.registries {
        // Credentials stay out of the terminal
        println!("  Registry: {}", registry.server);
    }
    match &puller.spec.namespace_selector {
        Some(selector) => println!("  Namespace selector: {}", serde_json::to_string(selector)?),
        None => println!("  Namespace selector: <all namespaces>"),
    }

    match &puller.status {
        Some(status) if !status.conditions.is_empty() => {
            println!("\nConditions:");
            for condition in &status.conditions {
                println!("  {}: {}", condition.r#type, condition.status);
                if let Some(reason) = &condition.reason {
                    println!("    Reason: {reason}");
                }
                if let Some(message) = &condition.message {
                    println!("    Message: {message}");
                }
                if let Some(time) = &condition.last_transition_time {
                    println!("    Last Transition: {time}");
                }
            }
        }
        _ => println!("\nStatus: No status available (resource may not have been reconciled yet)"),
    }
    Ok(())
}
