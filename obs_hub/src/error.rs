use obs_protocol::ProtocolError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HubError {
    #[error("connection failed: {0}")]
    Connection(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("handshake failed: {0}")]
    Handshake(String),
    #[error("not connected")]
    NotConnected,
    #[error("{request_type} rejected: code={code} {}", .comment.as_deref().unwrap_or(""))]
    Request {
        request_type: String,
        code: u16,
        comment: Option<String>,
    },
    #[error("{request_type} timed out")]
    Timeout { request_type: String },
    #[error("link closed before {request_type} completed")]
    LinkClosed { request_type: String },
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
    #[error("unexpected payload: {0}")]
    Payload(#[from] serde_json::Error),
    #[error("invalid obs address {address:?}: {reason}")]
    InvalidAddress { address: String, reason: String },
    #[error("invalid timetable polarity {0:?} (expected advance or retract)")]
    InvalidPolarity(String),
    #[error("requested {requested} dB is above the {ceiling} dB ceiling")]
    VolumeAboveCeiling { requested: f64, ceiling: f64 },
}

impl HubError {
    /// True for a request the remote answered with the given status code.
    pub fn is_status(&self, status: u16) -> bool {
        matches!(self, HubError::Request { code, .. } if *code == status)
    }
}
