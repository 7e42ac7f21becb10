//! In-process MCP client of this server's own streaming endpoint
//!
//! The synchronous facade reaches tools through the same session machinery
//! a streaming client uses:
//!
//! ```text
//! /proxy/call ─► ProxyClient::call_tool
//!                  └─► rmcp client peer ── sink: POST {base}/messages ──► session
//!                        ▲                                                   │
//!                        └──────────── stream: GET {base}/sse ◄──────────────┘
//! ```
//!
//! Both hops are `tower::ServiceExt::oneshot` calls into the MCP router, so
//! the loop never touches the network and works before the listener is
//! accepting connections. rmcp drives the handshake and request correlation;
//! this module only adapts the two HTTP hops into its sink and stream.
//!
//! [`ProxyClient`] holds the connected [`McpClient`] in a [`SingleFlight`]
//! cell: concurrent first calls share one handshake, a failed handshake can
//! be retried, and a ready client is reused for the life of the process.

use crate::config::ServerConfig;
use crate::error::BridgeError;
use crate::mcp::session::SESSION_HEADER;
use crate::mcp::single_flight::{FlightPhase, SingleFlight};
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use eventsource_stream::{Event, Eventsource};
use futures::stream::{self, BoxStream};
use futures::{Stream, StreamExt};
use rmcp::model::{
    CallToolRequestParam, CallToolResult, ClientCapabilities, ClientInfo, ClientJsonRpcMessage,
    Implementation, JsonObject, ProtocolVersion, ServerInfo, ServerJsonRpcMessage, Tool,
};
use rmcp::service::{serve_client, RoleClient, RunningService};
use std::sync::Arc;
use tower::ServiceExt;

pub const CLIENT_NAME: &str = "akashic-mcp-proxy";

/// A live client session against the local MCP routes
///
/// Dropping it stops the client loop, which drops the SSE body and so
/// closes the server-side session.
pub struct McpClient {
    session_id: String,
    service: RunningService<RoleClient, ClientInfo>,
}

impl std::fmt::Debug for McpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("McpClient")
            .field("session_id", &self.session_id)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl McpClient {
    /// Opens a session on `router` and completes the MCP handshake
    ///
    /// The whole sequence (stream open, `endpoint` event, `initialize`,
    /// `notifications/initialized`) is bounded by the configured handshake
    /// timeout.
    pub async fn connect(router: Router, config: &ServerConfig) -> Result<Self, BridgeError> {
        let timeout = config.bridge_handshake_timeout;
        tokio::time::timeout(timeout, Self::open(router, config))
            .await
            .map_err(|_| {
                BridgeError::Handshake(format!("timed out after {}s", timeout.as_secs()))
            })?
    }

    async fn open(router: Router, config: &ServerConfig) -> Result<Self, BridgeError> {
        let request = Request::get(config.sse_path())
            .header(header::ACCEPT, "text/event-stream")
            .body(Body::empty())
            .map_err(|e| BridgeError::Connect(e.to_string()))?;

        let response = router
            .clone()
            .oneshot(request)
            .await
            .unwrap_or_else(|never| match never {});

        let status = response.status();
        if !status.is_success() {
            let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
                .await
                .unwrap_or_default();
            return Err(BridgeError::Connect(format!(
                "HTTP {}: {}",
                status.as_u16(),
                String::from_utf8_lossy(&body)
            )));
        }

        let session_id = response
            .headers()
            .get(SESSION_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();

        let mut events = response.into_body().into_data_stream().eventsource();
        let post_uri = loop {
            match events.next().await {
                Some(Ok(event)) if event.event == "endpoint" => break event.data,
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Err(BridgeError::Handshake(e.to_string())),
                None => {
                    return Err(BridgeError::Handshake(
                        "stream ended before the endpoint event".to_string(),
                    ))
                }
            }
        };

        let poster = Poster {
            router,
            uri: post_uri,
        };
        let sink = Box::pin(futures::sink::unfold(
            poster,
            |poster, message: ClientJsonRpcMessage| async move {
                poster.post(&message).await?;
                Ok::<_, BridgeError>(poster)
            },
        ));

        // Boxed as `Send` here so the higher-ranked `Send` check on rmcp's
        // handshake future resolves at a concrete point.
        let handshake: futures::future::BoxFuture<'static, _> =
            Box::pin(serve_client(client_info(), (sink, server_messages(events))));
        let service = handshake
            .await
            .map_err(|e| BridgeError::Handshake(e.to_string()))?;

        Ok(Self {
            session_id,
            service,
        })
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// The server's `initialize` answer
    pub fn server_info(&self) -> Option<&ServerInfo> {
        self.service.peer_info()
    }

    /// True once the client loop has stopped, e.g. because the session closed
    pub fn is_closed(&self) -> bool {
        self.service.is_transport_closed()
    }

    pub async fn list_tools(&self) -> Result<Vec<Tool>, BridgeError> {
        Ok(self.service.list_all_tools().await?)
    }

    /// No timeout applies; if the session closes first the call fails with
    /// `BridgeError::Closed`.
    pub async fn call_tool(
        &self,
        name: &str,
        arguments: Option<JsonObject>,
    ) -> Result<CallToolResult, BridgeError> {
        let request = CallToolRequestParam {
            name: name.to_string().into(),
            arguments,
        };
        Ok(self.service.call_tool(request).await?)
    }
}

fn client_info() -> ClientInfo {
    ClientInfo {
        protocol_version: ProtocolVersion::default(),
        capabilities: ClientCapabilities::default(),
        client_info: Implementation {
            name: CLIENT_NAME.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            title: None,
            website_url: None,
            icons: None,
        },
    }
}

/// Delivers client frames to the session's message endpoint
struct Poster {
    router: Router,
    uri: String,
}

impl Poster {
    async fn post(&self, message: &ClientJsonRpcMessage) -> Result<(), BridgeError> {
        let body =
            serde_json::to_vec(message).map_err(|e| BridgeError::Protocol(e.to_string()))?;
        let request = Request::post(self.uri.as_str())
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body))
            .map_err(|e| BridgeError::Post(e.to_string()))?;

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .unwrap_or_else(|never| match never {});

        if response.status() != StatusCode::ACCEPTED {
            let status = response.status();
            let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
                .await
                .unwrap_or_default();
            return Err(BridgeError::Post(format!(
                "HTTP {}: {}",
                status.as_u16(),
                String::from_utf8_lossy(&body)
            )));
        }
        Ok(())
    }
}

/// Decodes `message` events into server frames
///
/// Other event names are skipped and undecodable frames are logged and
/// skipped; the stream ends with the first transport error.
fn server_messages<S, E>(events: S) -> BoxStream<'static, ServerJsonRpcMessage>
where
    S: Stream<Item = Result<Event, E>> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    stream::unfold(Box::pin(events), |mut events| async move {
        loop {
            match events.next().await? {
                Ok(event) if event.event == "message" => {
                    match serde_json::from_str::<ServerJsonRpcMessage>(&event.data) {
                        Ok(message) => return Some((message, events)),
                        Err(e) => tracing::warn!(error = %e, "Undecodable frame on bridge stream"),
                    }
                }
                Ok(event) => tracing::debug!(event = %event.event, "Ignoring bridge event"),
                Err(e) => {
                    tracing::warn!(error = %e, "Bridge stream failed");
                    return None;
                }
            }
        }
    })
    .boxed()
}

/// Process-wide bridge used by the synchronous facade
pub struct ProxyClient {
    mcp_routes: Router,
    config: Arc<ServerConfig>,
    client: SingleFlight<Arc<McpClient>, BridgeError>,
}

impl ProxyClient {
    /// # Arguments
    ///
    /// * `mcp_routes` - The router serving `{base}/sse` and `{base}/messages`
    pub fn new(mcp_routes: Router, config: Arc<ServerConfig>) -> Self {
        Self {
            mcp_routes,
            config,
            client: SingleFlight::new(),
        }
    }

    /// The connected client, connecting first if needed
    pub async fn get_client(&self) -> Result<Arc<McpClient>, BridgeError> {
        let router = self.mcp_routes.clone();
        let config = self.config.clone();
        self.client
            .get_or_try_init(move || async move {
                match McpClient::connect(router, &config).await {
                    Ok(client) => {
                        tracing::info!(session_id = %client.session_id(), "Proxy bridge ready");
                        Ok(Arc::new(client))
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "Proxy bridge handshake failed");
                        Err(e)
                    }
                }
            })
            .await
    }

    pub async fn list_tools(&self) -> Result<Vec<Tool>, BridgeError> {
        self.get_client().await?.list_tools().await
    }

    pub async fn call_tool(
        &self,
        name: &str,
        arguments: Option<JsonObject>,
    ) -> Result<CallToolResult, BridgeError> {
        self.get_client().await?.call_tool(name, arguments).await
    }

    pub async fn phase(&self) -> FlightPhase {
        self.client.phase().await
    }

    /// Number of handshakes started so far
    pub fn connect_attempts(&self) -> u64 {
        self.client.attempts()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Bytes;

    fn sse(chunks: Vec<&'static str>) -> impl Stream<Item = Result<Bytes, std::io::Error>> {
        stream::iter(
            chunks
                .into_iter()
                .map(|chunk| Ok(Bytes::from_static(chunk.as_bytes())))
                .collect::<Vec<_>>(),
        )
    }

    #[tokio::test]
    async fn test_only_message_events_become_frames() {
        let events = sse(vec![
            "event: endpoint\ndata: /messages?sessionId=abc\n\n",
            ":keep-alive\n\n",
            "event: message\ndata: {\"jsonrpc\":\"2.0\",\"id\":1,",
            "\"result\":{}}\n\n",
        ])
        .eventsource();

        let frames: Vec<ServerJsonRpcMessage> = server_messages(events).collect().await;
        assert_eq!(frames.len(), 1);
        let value = serde_json::to_value(&frames[0]).unwrap();
        assert_eq!(value["id"], 1);
    }

    #[tokio::test]
    async fn test_undecodable_frames_are_skipped() {
        let events = sse(vec![
            "event: message\ndata: not json\n\n",
            "event: message\ndata: {\"jsonrpc\":\"2.0\",\"id\":2,\"result\":{}}\n\n",
        ])
        .eventsource();

        let frames: Vec<ServerJsonRpcMessage> = server_messages(events).collect().await;
        assert_eq!(frames.len(), 1);
    }

    #[tokio::test]
    async fn test_stream_error_ends_the_frames() {
        let chunks: Vec<Result<Bytes, std::io::Error>> = vec![
            Err(std::io::Error::other("reset")),
            Ok(Bytes::from_static(
                b"event: message\ndata: {\"jsonrpc\":\"2.0\",\"id\":3,\"result\":{}}\n\n",
            )),
        ];

        let frames: Vec<ServerJsonRpcMessage> =
            server_messages(stream::iter(chunks).eventsource()).collect().await;
        assert!(frames.is_empty());
    }
}
