//! Inter-node coordination: lazily-established outbound peer connections and
//! the inbound HTTP surface through which peers and external tools read and
//! write data and configuration.

pub mod connection_manager;
pub mod error;
pub mod http_server;
pub mod routes;

pub use connection_manager::{
    ConnectionListener, ConnectionManager, PeerConnection, PeerDescriptor, RECONNECT_INTERVAL,
};
pub use error::{NetworkError, NetworkResult};
pub use http_server::{AppState, MeshHttpServer};
