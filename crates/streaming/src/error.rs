use crate::protocol::Endpoint;

/// Why a fetch did not produce a result.
///
/// `Cancelled` is the transport-level abort of a superseded request and is
/// never a fault. Everything else is a genuine failure of the live request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    Cancelled,
    InvalidUrl(String),
    Transport(String),
    Status { endpoint: Endpoint, status: u16 },
    Decode(String),
}

impl FetchError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, FetchError::Cancelled)
    }
}

impl std::fmt::Display for FetchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FetchError::Cancelled => write!(f, "request cancelled"),
            FetchError::InvalidUrl(msg) => write!(f, "invalid request url: {msg}"),
            FetchError::Transport(msg) => write!(f, "transport error: {msg}"),
            FetchError::Status { endpoint, status } => {
                write!(f, "{} returned HTTP {status}", endpoint.path())
            }
            FetchError::Decode(msg) => write!(f, "malformed response: {msg}"),
        }
    }
}

impl std::error::Error for FetchError {}
