use std::fmt;
use std::io;

/// Unified error type for the entire application.
///
/// Each variant represents a category of failures, with associated context to
/// help with debugging and error reporting. Absence of a data value is not an
/// error anywhere in the system; it is modeled as `Option` at the call sites.
#[derive(Debug)]
pub enum MeshError {
    /// Errors from the persistence layer
    Store(String),

    /// A config dot-path traversal hit a missing or non-object intermediate
    PathNotFound(String),

    /// A subtree import's entity/data collections are mutually inconsistent
    ImportIntegrity(String),

    /// A bulk-load file was unreadable or malformed (startup fail-fast)
    StartupLoad(String),

    /// An entity's update failed; isolated at the scheduler boundary
    EntityUpdate { entity: String, message: String },

    /// An unknown entity type or registry misuse
    Registry(String),

    /// Errors related to node configuration
    Config(String),

    /// Errors from the coordination layer
    Network(crate::coordination::NetworkError),

    /// Errors related to serialization/deserialization
    Serialization(String),

    /// Errors related to IO operations
    Io(io::Error),
}

impl fmt::Display for MeshError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Store(msg) => write!(f, "Store error: {}", msg),
            Self::PathNotFound(msg) => write!(f, "Path not found: {}", msg),
            Self::ImportIntegrity(msg) => write!(f, "Import integrity error: {}", msg),
            Self::StartupLoad(msg) => write!(f, "Startup load failure: {}", msg),
            Self::EntityUpdate { entity, message } => {
                write!(f, "Entity '{}' update failed: {}", entity, message)
            }
            Self::Registry(msg) => write!(f, "Registry error: {}", msg),
            Self::Config(msg) => write!(f, "Configuration error: {}", msg),
            Self::Network(err) => write!(f, "Network error: {}", err),
            Self::Serialization(msg) => write!(f, "Serialization error: {}", msg),
            Self::Io(err) => write!(f, "IO error: {}", err),
        }
    }
}

impl std::error::Error for MeshError {}

impl From<io::Error> for MeshError {
    fn from(error: io::Error) -> Self {
        MeshError::Io(error)
    }
}

impl From<serde_json::Error> for MeshError {
    fn from(error: serde_json::Error) -> Self {
        MeshError::Serialization(error.to_string())
    }
}

impl From<sled::Error> for MeshError {
    fn from(error: sled::Error) -> Self {
        MeshError::Store(error.to_string())
    }
}

impl From<crate::coordination::NetworkError> for MeshError {
    fn from(error: crate::coordination::NetworkError) -> Self {
        MeshError::Network(error)
    }
}

/// Result type alias for operations that can result in a MeshError
pub type MeshResult<T> = Result<T, MeshError>;
