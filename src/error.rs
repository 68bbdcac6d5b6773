use thiserror::Error;

/// Errors that can occur while discovering OIC resources
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum DiscoveryError {
    // ============================================================================
    // I/O and System Errors
    // ============================================================================
    #[error("IO error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    #[error("Serde JSON error: {source}")]
    Serde {
        #[from]
        source: serde_json::Error,
    },

    #[error("Address parse error: {source}")]
    AddrParse {
        #[from]
        source: std::net::AddrParseError,
    },

    // ============================================================================
    // Transport Errors
    // ============================================================================
    #[error("Transport error: {message}")]
    Transport { message: String },

    #[error("Transport closed")]
    TransportClosed,

    #[error("Malformed response from {service_address}: {message}")]
    MalformedResponse {
        service_address: String,
        message: String,
    },

    #[error("Discovery window elapsed without any response")]
    Timeout,

    // ============================================================================
    // Session Errors
    // ============================================================================
    #[error("Invalid discovery query: {message}")]
    InvalidQuery { message: String },

    #[error("Invalid resource descriptor: {message}")]
    InvalidResource { message: String },

    #[error("Invalid state transition: {message}")]
    InvalidState { message: String },

    #[error("Session {session_id} not found")]
    SessionNotFound { session_id: String },

    #[error("Discovery session cancelled")]
    Cancelled,

    #[error("Discovery engine shut down")]
    EngineShutdown,
}

impl DiscoveryError {
    /// Create a transport error with a message
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport {
            message: msg.into(),
        }
    }

    /// Create a malformed response error for the given service
    pub fn malformed(service_address: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::MalformedResponse {
            service_address: service_address.into(),
            message: msg.into(),
        }
    }

    /// Create an invalid query error with a message
    pub fn invalid_query(msg: impl Into<String>) -> Self {
        Self::InvalidQuery {
            message: msg.into(),
        }
    }

    /// Create an invalid resource error with a message
    pub fn invalid_resource(msg: impl Into<String>) -> Self {
        Self::InvalidResource {
            message: msg.into(),
        }
    }

    /// Create an invalid state error with a message
    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState {
            message: msg.into(),
        }
    }

    /// Whether the engine may retry the operation that produced this error
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Io { .. } | Self::Transport { .. })
    }
}

pub type Result<T> = std::result::Result<T, DiscoveryError>;
