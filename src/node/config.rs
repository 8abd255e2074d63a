use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

/// A peer this node should keep an outbound connection to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerConfig {
    /// The peer's role in the experiment topology (e.g. "coordinator",
    /// "world", "agent")
    pub role: String,
    #[serde(default = "default_peer_host")]
    pub host: String,
    pub port: u16,
    /// Context path without slashes
    #[serde(default)]
    pub context_path: String,
}

fn default_peer_host() -> String {
    "127.0.0.1".to_string()
}

/// Configuration for a MeshNode instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Name of this node; entities with a matching node field are local
    #[serde(default = "default_node_name")]
    pub node_name: String,
    /// Path where the node will store its data
    pub storage_path: PathBuf,
    /// HTTP listening address
    #[serde(default = "default_listen_address")]
    pub listen_address: String,
    /// Interval between scheduler ticks, in milliseconds
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
    /// Peers to maintain outbound connections to
    #[serde(default)]
    pub peers: Vec<PeerConfig>,
}

fn default_node_name() -> String {
    format!("node-{}", Uuid::new_v4())
}

fn default_listen_address() -> String {
    "127.0.0.1:9600".to_string()
}

fn default_tick_interval_ms() -> u64 {
    100
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            node_name: default_node_name(),
            storage_path: PathBuf::from("data"),
            listen_address: default_listen_address(),
            tick_interval_ms: default_tick_interval_ms(),
            peers: Vec::new(),
        }
    }
}

impl NodeConfig {
    /// Create a new node configuration with the specified storage path
    pub fn new(storage_path: PathBuf) -> Self {
        Self {
            storage_path,
            ..Default::default()
        }
    }

    pub fn with_node_name(mut self, node_name: &str) -> Self {
        self.node_name = node_name.to_string();
        self
    }

    pub fn with_listen_address(mut self, address: &str) -> Self {
        self.listen_address = address.to_string();
        self
    }
}

/// Load a node configuration from the given path or from the `NODE_CONFIG`
/// environment variable.
///
/// If the file does not exist, a default [`NodeConfig`] is returned. When a
/// `port` is provided, the returned config listens on `127.0.0.1:<port>`.
pub fn load_node_config(
    path: Option<&str>,
    port: Option<u16>,
) -> Result<NodeConfig, std::io::Error> {
    use std::fs;

    let config_path = path
        .map(|p| p.to_string())
        .or_else(|| std::env::var("NODE_CONFIG").ok())
        .unwrap_or_else(|| "config/node_config.json".to_string());

    let mut config = if let Ok(config_str) = fs::read_to_string(&config_path) {
        serde_json::from_str::<NodeConfig>(&config_str).map_err(|e| {
            log::error!("Failed to parse node configuration: {}", e);
            std::io::Error::new(std::io::ErrorKind::InvalidData, e)
        })?
    } else {
        NodeConfig::default()
    };

    if let Some(p) = port {
        config.listen_address = format!("127.0.0.1:{}", p);
    }
    Ok(config)
}
