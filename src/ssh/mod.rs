mod session;
mod stream;
mod transport;

pub use session::Session;
pub use stream::StreamError;
pub use transport::{Credential, TransportError};

use std::fmt;

/// Lifecycle state of one remote shell session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Connected,
    /// Connection or stream failure; carries a user-facing message
    Error(String),
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Disconnected => write!(f, "disconnected"),
            SessionState::Connecting => write!(f, "connecting"),
            SessionState::Connected => write!(f, "connected"),
            SessionState::Error(message) => write!(f, "error: {}", message),
        }
    }
}
