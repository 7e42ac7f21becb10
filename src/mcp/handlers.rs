//! HTTP handlers for the streaming and message endpoints
//!
//! `GET {base}/sse` opens a session and keeps it open as an SSE stream;
//! `POST {base}/messages` delivers one JSON-RPC frame to an open session.

use crate::config::ServerConfig;
use crate::error::{AppError, McpServiceError};
use crate::mcp::registry::{SharedTransportRegistry, TransportRegistry};
use crate::mcp::service::ToolServer;
use crate::mcp::session::{resolve_session_id, SESSION_HEADER};
use crate::mcp::single_flight::SingleFlight;
use crate::mcp::transport::{SseTransport, TransportError};
use crate::tools::command::{CommandRunner, ProcessRunner};
use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode},
    response::{
        sse::{KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::{get, post},
    Router,
};
use futures::future::{BoxFuture, FutureExt};
use std::collections::HashMap;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

/// Builds the shared server on first use
pub type ServerFactory =
    Arc<dyn Fn() -> BoxFuture<'static, Result<ToolServer, McpServiceError>> + Send + Sync>;

/// State behind the MCP routes
#[derive(Clone)]
pub struct McpState {
    pub config: Arc<ServerConfig>,
    pub transports: SharedTransportRegistry,
    pub server: Arc<SingleFlight<Arc<ToolServer>, McpServiceError>>,
    factory: ServerFactory,
}

impl McpState {
    pub fn new(config: ServerConfig) -> Self {
        Self::with_runner(config, Arc::new(ProcessRunner))
    }

    /// State whose tools run external commands through `runner`
    pub fn with_runner(config: ServerConfig, runner: Arc<dyn CommandRunner>) -> Self {
        let config = Arc::new(config);
        let build_config = config.clone();
        let factory: ServerFactory = Arc::new(move || {
            let config = build_config.clone();
            let runner = runner.clone();
            async move { ToolServer::build_with_runner(&config, runner).await }.boxed()
        });
        Self::with_factory_arc(config, factory)
    }

    pub fn with_factory(config: ServerConfig, factory: ServerFactory) -> Self {
        Self::with_factory_arc(Arc::new(config), factory)
    }

    fn with_factory_arc(config: Arc<ServerConfig>, factory: ServerFactory) -> Self {
        Self {
            config,
            transports: TransportRegistry::shared(),
            server: Arc::new(SingleFlight::new()),
            factory,
        }
    }

    /// The shared server, built on first call
    pub async fn shared_server(&self) -> Result<Arc<ToolServer>, McpServiceError> {
        let factory = self.factory.clone();
        self.server
            .get_or_try_init(move || async move { factory().await.map(Arc::new) })
            .await
    }
}

/// Opens a streaming session
///
/// # Route
///
/// `GET {base}/sse`
///
/// # Returns
///
/// * `200` - SSE stream; the first event is `endpoint` with the session's
///   message URI, the `mcp-session-id` header carries the id
/// * `500` - The shared server could not be built
pub async fn sse_handler(State(state): State<McpState>) -> Result<Response, AppError> {
    let server = state.shared_server().await.map_err(|e| {
        tracing::error!(error = %e, "Failed to build shared MCP server");
        AppError::from(e)
    })?;

    let (transport, channels) = SseTransport::new(&state.config.messages_path());
    let transport = Arc::new(transport);
    let session_id = transport.session_id().unwrap_or_default().to_string();

    state
        .transports
        .write()
        .await
        .register(&session_id, transport.clone());

    {
        let transports = state.transports.clone();
        let transport = transport.clone();
        let session_id = session_id.clone();
        tokio::spawn(async move {
            transport.closed().await;
            if transports
                .write()
                .await
                .unregister_transport(&session_id, &transport)
            {
                tracing::info!(session_id = %session_id, "Streaming session closed");
            }
        });
    }

    tokio::spawn(ToolServer::clone(&server).serve(transport.clone(), channels.inbound));
    tracing::info!(session_id = %session_id, "Streaming session opened");

    let stream = transport.event_stream(channels.outbound);
    let mut response = Sse::new(stream)
        .keep_alive(KeepAlive::new().interval(state.config.sse_keep_alive))
        .into_response();

    if let Ok(value) = HeaderValue::from_str(&session_id) {
        response.headers_mut().insert(SESSION_HEADER, value);
    }
    Ok(response)
}

/// Delivers one frame to an open session
///
/// # Route
///
/// `POST {base}/messages?sessionId=<id>` (or the `mcp-session-id` header)
///
/// # Returns
///
/// * `202` - Frame queued; the reply arrives on the session's SSE stream
/// * `400` - No session id, or the body is not a JSON-RPC frame
/// * `404` - No open session with that id, including one that has closed
///   but is not unregistered yet
pub async fn message_handler(
    State(state): State<McpState>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
    body: Bytes,
) -> Result<Response, AppError> {
    let session_id = resolve_session_id(&headers, &query).ok_or(AppError::MissingSessionId)?;

    let transport = state
        .transports
        .read()
        .await
        .lookup(&session_id)
        .map_err(|_| {
            tracing::debug!(session_id = %session_id, "Message for unknown session");
            AppError::UnknownSessionId
        })?;

    transport
        .handle_post_message(&body)
        .await
        .map_err(|e| match e {
            TransportError::Closed(_) => {
                tracing::debug!(session_id = %session_id, "Message for closed session");
                AppError::UnknownSessionId
            }
            e => {
                tracing::debug!(session_id = %session_id, error = %e, "Rejected posted frame");
                AppError::InvalidMessage(e.to_string())
            }
        })?;

    Ok((StatusCode::ACCEPTED, "Accepted").into_response())
}

/// Router for `{base}/sse` and `{base}/messages`
pub fn mcp_routes(state: McpState) -> Router {
    let session_header = HeaderName::from_static(SESSION_HEADER);
    let cors_layer = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers([
            header::CONTENT_TYPE,
            header::ACCEPT,
            header::CACHE_CONTROL,
            session_header.clone(),
            HeaderName::from_static("mcp-protocol-version"),
        ])
        .expose_headers([session_header])
        .max_age(std::time::Duration::from_secs(3600));

    Router::new()
        .route(&state.config.sse_path(), get(sse_handler))
        .route(&state.config.messages_path(), post(message_handler))
        .layer(cors_layer)
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ToolConfig;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    fn state() -> McpState {
        let config = ServerConfig::new(ToolConfig::with_workspace(std::env::temp_dir()));
        McpState::new(config)
    }

    #[tokio::test]
    async fn test_post_without_session_is_400() {
        let response = mcp_routes(state())
            .oneshot(
                Request::post("/messages")
                    .body(Body::from(r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value["error"], "Missing sessionId.");
    }

    #[tokio::test]
    async fn test_post_to_unknown_session_is_404() {
        let response = mcp_routes(state())
            .oneshot(
                Request::post("/messages?session_id=ghost")
                    .body(Body::from("{}"))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value["error"], "Unknown sessionId.");
    }

    #[tokio::test]
    async fn test_post_to_closed_but_registered_session_is_404() {
        let state = state();
        let (transport, _channels) = SseTransport::with_session_id("/messages", "stale".into());
        let transport = Arc::new(transport);
        state.transports.write().await.register("stale", transport.clone());
        transport.close();

        let response = mcp_routes(state.clone())
            .oneshot(
                Request::post("/messages?sessionId=stale")
                    .body(Body::from(r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value["error"], "Unknown sessionId.");
        assert!(state.transports.read().await.lookup("stale").is_ok());
    }

    #[tokio::test]
    async fn test_failed_server_build_is_500_and_retried() {
        let config = ServerConfig::new(ToolConfig::with_workspace(std::env::temp_dir()));
        let attempts = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let counter = attempts.clone();
        let factory: ServerFactory = Arc::new(move || {
            counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            async { Err::<ToolServer, _>(McpServiceError::DocsIndex("unreadable".into())) }.boxed()
        });
        let state = McpState::with_factory(config, factory);
        let router = mcp_routes(state.clone());

        for _ in 0..2 {
            let response = router
                .clone()
                .oneshot(Request::get("/sse").body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        }

        assert_eq!(attempts.load(std::sync::atomic::Ordering::SeqCst), 2);
        assert!(state.transports.read().await.is_empty());
    }

    #[tokio::test]
    async fn test_sse_registers_session_and_drop_unregisters() {
        let state = state();
        let response = mcp_routes(state.clone())
            .oneshot(Request::get("/sse").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let session_id = response
            .headers()
            .get(SESSION_HEADER)
            .unwrap()
            .to_str()
            .unwrap()
            .to_string();
        assert!(!session_id.is_empty());
        assert!(state.transports.read().await.lookup(&session_id).is_ok());

        drop(response);

        tokio::time::timeout(std::time::Duration::from_secs(2), async {
            while state.transports.read().await.lookup(&session_id).is_ok() {
                tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("session should be unregistered after the stream is dropped");
    }
}
