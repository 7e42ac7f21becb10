use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde_json::json;
use thiserror::Error;

// Type alias for Result with our AppError
pub type Result<T> = std::result::Result<T, AppError>;

/// Errors surfaced directly to HTTP callers
///
/// Every variant renders as a JSON body of the form `{"error": "<message>"}`.
/// Tool-level failures never use this type; they travel inside a normal
/// `CallToolResult` with `isError: true`.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Missing sessionId.")]
    MissingSessionId,

    #[error("Unknown sessionId.")]
    UnknownSessionId,

    /// A posted frame could not be parsed or handed to its session
    #[error("{0}")]
    InvalidMessage(String),

    /// A facade request body was malformed
    #[error("{0}")]
    InvalidRequest(String),

    /// Server or bridge construction failed, or the bridge connection broke
    #[error("{0}")]
    Infrastructure(String),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::MissingSessionId => StatusCode::BAD_REQUEST,
            AppError::UnknownSessionId => StatusCode::NOT_FOUND,
            AppError::InvalidMessage(_) | AppError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Infrastructure(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

/// Construction failures of the shared MCP server
///
/// Cloneable so that a single failed construction can be handed to every
/// caller that was waiting on it.
#[derive(Debug, Clone, Error)]
pub enum McpServiceError {
    /// Tool registration failed (duplicate name, malformed schema)
    #[error("Tool registry error: {0}")]
    ToolRegistry(String),

    /// The document corpus could not be loaded
    #[error("Document index error: {0}")]
    DocsIndex(String),

    /// Catch-all for unexpected failures
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<anyhow::Error> for McpServiceError {
    fn from(err: anyhow::Error) -> Self {
        McpServiceError::Internal(err.to_string())
    }
}

impl From<tokio::task::JoinError> for McpServiceError {
    fn from(err: tokio::task::JoinError) -> Self {
        McpServiceError::Internal(format!("construction task failed: {}", err))
    }
}

/// Failures of the internal proxy client
///
/// Cloneable for the same reason as [`McpServiceError`]: one handshake
/// outcome is shared by all concurrent first-time callers.
#[derive(Debug, Clone, Error)]
pub enum BridgeError {
    /// Opening the loopback stream failed
    #[error("bridge connect failed: {0}")]
    Connect(String),

    /// The stream opened but the endpoint event or the MCP handshake failed
    #[error("bridge handshake failed: {0}")]
    Handshake(String),

    /// Delivering a frame to the message endpoint failed
    #[error("bridge post failed: {0}")]
    Post(String),

    /// The client loop stopped; no further requests can be answered
    #[error("bridge connection closed")]
    Closed,

    /// The server answered with a JSON-RPC error
    #[error("remote error {code}: {message}")]
    Rpc { code: i32, message: String },

    /// A response could not be decoded
    #[error("bridge protocol error: {0}")]
    Protocol(String),

    #[error("bridge task failed: {0}")]
    Task(String),
}

impl From<tokio::task::JoinError> for BridgeError {
    fn from(err: tokio::task::JoinError) -> Self {
        BridgeError::Task(err.to_string())
    }
}

/// | rmcp::ServiceError           | BridgeError |
/// |------------------------------|-------------|
/// | McpError                     | Rpc         |
/// | TransportSend                | Post        |
/// | TransportClosed, Cancelled   | Closed      |
/// | anything else                | Protocol    |
impl From<rmcp::ServiceError> for BridgeError {
    fn from(err: rmcp::ServiceError) -> Self {
        use rmcp::ServiceError;

        match err {
            ServiceError::McpError(error) => BridgeError::Rpc {
                code: error.code.0,
                message: error.message.to_string(),
            },
            ServiceError::TransportSend(e) => BridgeError::Post(e.to_string()),
            ServiceError::TransportClosed | ServiceError::Cancelled { .. } => BridgeError::Closed,
            other => BridgeError::Protocol(other.to_string()),
        }
    }
}

impl From<BridgeError> for AppError {
    fn from(err: BridgeError) -> Self {
        AppError::Infrastructure(err.to_string())
    }
}

impl From<McpServiceError> for AppError {
    fn from(err: McpServiceError) -> Self {
        AppError::Infrastructure(err.to_string())
    }
}
