//! Connection to the remote detection service.

pub mod backoff;
pub mod manager;
pub mod transport;

use crate::protocol::DetectionSnapshot;
use std::fmt;
use std::time::Duration;

pub use backoff::Backoff;
pub use manager::{ConnectionHandle, ConnectionManager, ConnectionSettings, ConnectionStats};
pub use transport::{Connector, Link, WebSocketConnector};

/// Whether a link to the detection service is currently open.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connected,
}

impl ConnectionState {
    pub fn is_connected(self) -> bool {
        matches!(self, Self::Connected)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "disconnected"),
            Self::Connected => write!(f, "connected"),
        }
    }
}

/// Notifications emitted by the connection manager, in the order they happen.
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionEvent {
    /// A link was opened.
    Connected,
    /// A link dropped or an attempt failed; the next attempt follows after `retry_in`.
    Disconnected {
        /// Consecutive failures before this one.
        attempt: u32,
        retry_in: Duration,
    },
    /// A valid snapshot arrived.
    Detections(DetectionSnapshot),
}
