//! Server push over Socket.IO.
//!
//! - [`protocol`]: Engine.IO / Socket.IO text framing
//! - [`events`]: typed events of the job and global namespaces
//! - [`channel`]: one reconnecting namespace connection
//! - [`handlers`]: route events into the sync engine and the caches
//! - [`ActiveJob`]: the open job's channel plus the global channel

mod active;
pub mod channel;
pub mod events;
pub mod handlers;
pub mod protocol;

pub use active::ActiveJob;
pub use channel::{Backoff, ChannelEvent, SocketChannel};
pub use events::{GlobalEvent, JobEvent};
pub use handlers::{GlobalEventHandler, JobEventHandler};
pub use protocol::{Packet, ProtocolError, ProtocolResult};

use thiserror::Error;

use crate::api::ApiError;
use crate::sync::SyncError;

/// Errors raised by the socket layer
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Namespace {namespace} refused the connection: {message}")]
    Refused { namespace: String, message: String },

    #[error("Nobody is listening to the channel anymore")]
    ReceiverGone,

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error(transparent)]
    Sync(#[from] SyncError),
}

/// Result type for transport operations
pub type TransportResult<T> = Result<T, TransportError>;

/// WebSocket endpoint of the Socket.IO server at `ws_url`
pub fn socket_url(ws_url: &str) -> String {
    format!("{}/socket.io/?EIO=4&transport=websocket", ws_url.trim_end_matches('/'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn socket_url_appends_engine_io_path() {
        assert_eq!(
            socket_url("ws://localhost:8000/"),
            "ws://localhost:8000/socket.io/?EIO=4&transport=websocket"
        );
    }

    #[test]
    fn refused_display() {
        let err = TransportError::Refused {
            namespace: "/job1".into(),
            message: "Not found".into(),
        };
        assert_eq!(err.to_string(), "Namespace /job1 refused the connection: Not found");
    }
}
