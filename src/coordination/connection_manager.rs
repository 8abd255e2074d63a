use std::net::TcpStream;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use log::{info, warn};
use serde::{Deserialize, Serialize};

use super::error::{NetworkError, NetworkResult};
use crate::model::DataRecord;
use crate::node::PeerConfig;

/// How often the background loop retries peers without a live connection.
pub const RECONNECT_INTERVAL: Duration = Duration::from_millis(500);

/// Identifies a peer node: its role in the topology, where it listens, and
/// the context path its endpoints live under.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PeerDescriptor {
    pub role: String,
    pub host: String,
    pub port: u16,
    pub context_path: String,
}

impl PeerDescriptor {
    pub fn new(role: &str, host: &str, port: u16, context_path: &str) -> Self {
        Self {
            role: role.to_string(),
            host: host.to_string(),
            port,
            context_path: context_path.trim_matches('/').to_string(),
        }
    }

    /// The base address all of this peer's endpoints hang off.
    pub fn base_url(&self) -> String {
        if self.context_path.is_empty() {
            format!("http://{}:{}", self.host, self.port)
        } else {
            format!("http://{}:{}/{}", self.host, self.port, self.context_path)
        }
    }

    fn socket_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl From<&PeerConfig> for PeerDescriptor {
    fn from(config: &PeerConfig) -> Self {
        Self::new(&config.role, &config.host, config.port, &config.context_path)
    }
}

/// An established outbound connection handle for one peer.
pub struct PeerConnection {
    descriptor: PeerDescriptor,
    client: reqwest::Client,
    base_url: String,
}

impl PeerConnection {
    fn new(descriptor: PeerDescriptor) -> NetworkResult<Self> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(NetworkError::from)?;
        let base_url = descriptor.base_url();
        Ok(Self {
            descriptor,
            client,
            base_url,
        })
    }

    pub fn descriptor(&self) -> &PeerDescriptor {
        &self.descriptor
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Fetches data records by key from the peer's data endpoint.
    pub async fn fetch_data(&self, name: &str) -> NetworkResult<Vec<DataRecord>> {
        let url = format!("{}/data", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[("name", name)])
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(NetworkError::RemoteError(format!(
                "{} returned {}",
                url,
                response.status()
            )));
        }
        Ok(response.json().await?)
    }

    /// Pushes data records to the peer's data endpoint.
    pub async fn push_data(&self, records: &[DataRecord]) -> NetworkResult<()> {
        let url = format!("{}/data", self.base_url);
        let model = serde_json::to_string(records)
            .map_err(|e| NetworkError::RequestFailed(e.to_string()))?;
        let response = self
            .client
            .post(&url)
            .form(&[("model", model)])
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(NetworkError::RemoteError(format!(
                "{} returned {}",
                url,
                response.status()
            )));
        }
        Ok(())
    }
}

/// Notified when an outbound connection is established.
pub trait ConnectionListener: Send + Sync {
    fn connection_established(&self, peer: &PeerDescriptor);
}

struct PeerState {
    descriptor: PeerDescriptor,
    connection: Option<Arc<PeerConnection>>,
}

struct Shared {
    peers: Mutex<Vec<PeerState>>,
    listeners: Mutex<Vec<Box<dyn ConnectionListener>>>,
}

/// Maintains lazily-established outbound connections to peer nodes.
///
/// A dedicated background thread wakes at a fixed interval and, for every
/// registered peer lacking a live connection, attempts to establish one.
/// Successes notify the registered listeners; failures are logged and retried
/// next interval, unbounded and without backoff. The loop is cancellable via
/// a shutdown channel and is stopped when the manager is dropped.
pub struct ConnectionManager {
    shared: Arc<Shared>,
    shutdown: mpsc::Sender<()>,
    handle: Option<thread::JoinHandle<()>>,
}

impl ConnectionManager {
    pub fn new() -> Self {
        Self::with_interval(RECONNECT_INTERVAL)
    }

    pub fn with_interval(interval: Duration) -> Self {
        let shared = Arc::new(Shared {
            peers: Mutex::new(Vec::new()),
            listeners: Mutex::new(Vec::new()),
        });
        let (shutdown, rx) = mpsc::channel();

        let loop_shared = Arc::clone(&shared);
        let handle = thread::spawn(move || loop {
            match rx.recv_timeout(interval) {
                Err(RecvTimeoutError::Timeout) => Self::connect_pending(&loop_shared),
                // Shutdown signal or manager dropped.
                _ => break,
            }
        });

        Self {
            shared,
            shutdown,
            handle: Some(handle),
        }
    }

    /// Registers a peer; the background loop will try to connect to it.
    pub fn register_peer(&self, descriptor: PeerDescriptor) {
        info!(
            "Registering peer role: {}, at {}",
            descriptor.role,
            descriptor.base_url()
        );
        if let Ok(mut peers) = self.shared.peers.lock() {
            peers.push(PeerState {
                descriptor,
                connection: None,
            });
        }
    }

    pub fn add_listener(&self, listener: Box<dyn ConnectionListener>) {
        if let Ok(mut listeners) = self.shared.listeners.lock() {
            listeners.push(listener);
        }
    }

    /// The live connection for a peer, if one has been established.
    pub fn connection(&self, descriptor: &PeerDescriptor) -> Option<Arc<PeerConnection>> {
        let peers = self.shared.peers.lock().ok()?;
        peers
            .iter()
            .find(|peer| &peer.descriptor == descriptor)
            .and_then(|peer| peer.connection.clone())
    }

    /// The live connections for all peers with a given role.
    pub fn connections_by_role(&self, role: &str) -> Vec<Arc<PeerConnection>> {
        match self.shared.peers.lock() {
            Ok(peers) => peers
                .iter()
                .filter(|peer| peer.descriptor.role == role)
                .filter_map(|peer| peer.connection.clone())
                .collect(),
            Err(_) => Vec::new(),
        }
    }

    fn connect_pending(shared: &Shared) {
        // Snapshot the pending descriptors so no lock is held across the
        // connection attempts.
        let pending: Vec<PeerDescriptor> = match shared.peers.lock() {
            Ok(peers) => peers
                .iter()
                .filter(|peer| peer.connection.is_none())
                .map(|peer| peer.descriptor.clone())
                .collect(),
            Err(_) => return,
        };

        for descriptor in pending {
            match Self::connect(&descriptor) {
                Ok(connection) => {
                    info!("Connected to peer at {}", connection.base_url());
                    let connection = Arc::new(connection);
                    if let Ok(mut peers) = shared.peers.lock() {
                        if let Some(peer) = peers
                            .iter_mut()
                            .find(|peer| peer.descriptor == descriptor)
                        {
                            peer.connection = Some(Arc::clone(&connection));
                        }
                    }
                    if let Ok(listeners) = shared.listeners.lock() {
                        for listener in listeners.iter() {
                            listener.connection_established(&descriptor);
                        }
                    }
                }
                Err(e) => {
                    warn!(
                        "Peer {} not reachable yet: {}",
                        descriptor.base_url(),
                        e
                    );
                }
            }
        }
    }

    fn connect(descriptor: &PeerDescriptor) -> NetworkResult<PeerConnection> {
        // Probe reachability first; the request client itself is connection-
        // less until used.
        TcpStream::connect(descriptor.socket_addr())
            .map_err(|e| NetworkError::ConnectionError(e.to_string()))?;
        PeerConnection::new(descriptor.clone())
    }

    /// Stops the reconnection loop and waits for the thread to exit.
    pub fn stop(mut self) {
        let _ = self.shutdown.send(());
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Default for ConnectionManager {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        let _ = self.shutdown.send(());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn base_url_includes_context_path() {
        let descriptor = PeerDescriptor::new("world", "127.0.0.1", 9700, "mesh");
        assert_eq!(descriptor.base_url(), "http://127.0.0.1:9700/mesh");

        let bare = PeerDescriptor::new("world", "127.0.0.1", 9700, "");
        assert_eq!(bare.base_url(), "http://127.0.0.1:9700");
    }

    struct CountingListener(Arc<AtomicUsize>);

    impl ConnectionListener for CountingListener {
        fn connection_established(&self, _peer: &PeerDescriptor) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn connects_to_reachable_peer_and_notifies_listeners() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let manager = ConnectionManager::with_interval(Duration::from_millis(10));
        let established = Arc::new(AtomicUsize::new(0));
        manager.add_listener(Box::new(CountingListener(Arc::clone(&established))));

        let descriptor = PeerDescriptor::new("coordinator", "127.0.0.1", port, "");
        manager.register_peer(descriptor.clone());

        let mut waited = 0;
        while manager.connection(&descriptor).is_none() && waited < 100 {
            thread::sleep(Duration::from_millis(10));
            waited += 1;
        }

        assert!(manager.connection(&descriptor).is_some());
        assert_eq!(established.load(Ordering::SeqCst), 1);
        manager.stop();
    }

    #[test]
    fn unreachable_peer_keeps_retrying_without_connection() {
        // Bind then drop to find a port nothing listens on.
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };

        let manager = ConnectionManager::with_interval(Duration::from_millis(10));
        let descriptor = PeerDescriptor::new("world", "127.0.0.1", port, "");
        manager.register_peer(descriptor.clone());

        thread::sleep(Duration::from_millis(80));
        assert!(manager.connection(&descriptor).is_none());
        manager.stop();
    }
}
