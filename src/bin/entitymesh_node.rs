use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use log::{error, info};

use entitymesh::coordination::PeerDescriptor;
use entitymesh::{
    loaders, load_node_config, ConnectionManager, MeshHttpServer, MeshNode, MeshResult, Scheduler,
};

/// Command line options for the node binary.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    /// Port for the HTTP server (overrides the config file)
    #[arg(long)]
    port: Option<u16>,

    /// Path to the node configuration file
    #[arg(long)]
    config: Option<String>,

    /// Entity list file loaded at startup
    #[arg(long)]
    entities: Option<String>,

    /// Data file loaded at startup
    #[arg(long)]
    data: Option<String>,

    /// Data reference list file loaded at startup
    #[arg(long)]
    references: Option<String>,

    /// Config path list file loaded at startup
    #[arg(long)]
    configs: Option<String>,
}

/// Main entry point for an EntityMesh node.
///
/// Loads configuration, opens the store, applies the bulk-load files
/// (fail-fast), then runs the tick scheduler, the peer connection loop and
/// the coordination HTTP server until the process exits.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    info!("Starting EntityMesh node...");

    let cli = Cli::parse();

    let config = load_node_config(cli.config.as_deref(), cli.port)?;
    info!("Config loaded; node name '{}'", config.node_name);

    let node = Arc::new(MeshNode::new(config.clone())?);

    // Startup is fail-fast: a malformed or unreadable bulk-load file
    // terminates the process. Steady state is fault-isolated per entity.
    if let Some(path) = &cli.entities {
        exit_on_load_failure("entities", loaders::load_entities(&node, path));
    }
    if let Some(path) = &cli.data {
        exit_on_load_failure("data", loaders::load_data(&node, path));
    }
    if let Some(path) = &cli.references {
        exit_on_load_failure("references", loaders::load_data_references(&node, path));
    }
    if let Some(path) = &cli.configs {
        exit_on_load_failure("configs", loaders::load_config_paths(&node, path));
    }

    let connections = ConnectionManager::new();
    for peer in &config.peers {
        connections.register_peer(PeerDescriptor::from(peer));
    }

    let scheduler = Scheduler::start(
        Arc::clone(&node),
        Duration::from_millis(config.tick_interval_ms),
    );

    let server = MeshHttpServer::new(Arc::clone(&node), &config.listen_address);
    let served = server.run().await;

    scheduler.stop();
    connections.stop();
    served?;

    Ok(())
}

fn exit_on_load_failure<T>(what: &str, result: MeshResult<T>) {
    if let Err(e) = result {
        error!("Failed to load {}: {}", what, e);
        std::process::exit(1);
    }
}
