//! Error types for the peer registry
//!
//! Record-level "no data yet" conditions are reported through sentinel
//! values, not errors. This module covers what the table, the packet
//! dispatcher and the binary can actually fail on.

use std::fmt;

/// Result alias used across the crate
pub type Result<T> = std::result::Result<T, PeerError>;

/// Error type for peer table and dispatch operations
#[derive(Debug, Clone, PartialEq)]
pub enum PeerError {
    /// Peer table invariant violations (id collision, table full, stale entry)
    TableError {
        message: String,
        peer: Option<String>,
    },

    /// Malformed or unusable datagrams
    PacketError {
        message: String,
        sender: Option<String>,
    },

    /// Configuration errors
    ConfigError {
        message: String,
        field: Option<String>,
    },

    /// Socket and address errors
    NetworkError {
        message: String,
        address: Option<String>,
        source: Option<String>,
    },
}

impl PeerError {
    /// Create a new TableError
    pub fn table_error(message: impl Into<String>) -> Self {
        PeerError::TableError {
            message: message.into(),
            peer: None,
        }
    }

    /// Create a new TableError naming the peer involved
    pub fn table_error_with_peer(message: impl Into<String>, peer: impl Into<String>) -> Self {
        PeerError::TableError {
            message: message.into(),
            peer: Some(peer.into()),
        }
    }

    /// Id already taken by another live peer
    pub fn id_collision(id: u16) -> Self {
        Self::table_error_with_peer("Peer id already in use", id.to_string())
    }

    /// Create a new PacketError with the sender address
    pub fn packet_error_with_sender(message: impl Into<String>, sender: impl Into<String>) -> Self {
        PeerError::PacketError {
            message: message.into(),
            sender: Some(sender.into()),
        }
    }

    /// Create a new ConfigError
    pub fn config_error(message: impl Into<String>) -> Self {
        PeerError::ConfigError {
            message: message.into(),
            field: None,
        }
    }

    /// Create a new NetworkError with address and source
    pub fn network_error_full(message: impl Into<String>, address: impl Into<String>, source: impl Into<String>) -> Self {
        PeerError::NetworkError {
            message: message.into(),
            address: Some(address.into()),
            source: Some(source.into()),
        }
    }

    /// Whether the error points at a bug in table bookkeeping
    pub fn is_invariant_violation(&self) -> bool {
        matches!(self, PeerError::TableError { .. })
    }
}

impl fmt::Display for PeerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PeerError::TableError { message, peer } => {
                if let Some(p) = peer {
                    write!(f, "Table error: {} (peer: {})", message, p)
                } else {
                    write!(f, "Table error: {}", message)
                }
            }
            PeerError::PacketError { message, sender } => {
                if let Some(s) = sender {
                    write!(f, "Packet error: {} (sender: {})", message, s)
                } else {
                    write!(f, "Packet error: {}", message)
                }
            }
            PeerError::ConfigError { message, field } => {
                if let Some(field_val) = field {
                    write!(f, "Config error: {} (field: {})", message, field_val)
                } else {
                    write!(f, "Config error: {}", message)
                }
            }
            PeerError::NetworkError { message, address, source } => {
                match (address, source) {
                    (Some(a), Some(s)) => write!(f, "Network error: {} (address: {}, source: {})", message, a, s),
                    (Some(a), None) => write!(f, "Network error: {} (address: {})", message, a),
                    (None, Some(s)) => write!(f, "Network error: {} (source: {})", message, s),
                    (None, None) => write!(f, "Network error: {}", message),
                }
            }
        }
    }
}

impl std::error::Error for PeerError {}

impl From<std::io::Error> for PeerError {
    fn from(err: std::io::Error) -> Self {
        PeerError::NetworkError {
            message: err.to_string(),
            address: None,
            source: Some(err.kind().to_string()),
        }
    }
}

impl From<std::net::AddrParseError> for PeerError {
    fn from(err: std::net::AddrParseError) -> Self {
        PeerError::network_error_full("Failed to parse address", "unknown", err.to_string())
    }
}

impl From<serde_json::Error> for PeerError {
    fn from(err: serde_json::Error) -> Self {
        PeerError::config_error(format!("Failed to encode JSON: {}", err))
    }
}
