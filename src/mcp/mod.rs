//! MCP transport layer
//!
//! Session-oriented plumbing between HTTP and the shared tool server:
//!
//! - [`registry::TransportRegistry`] - Session id to live transport map
//! - [`transport::SseTransport`] - One streaming session (inbound and outbound queues)
//! - [`service::ToolServer`] - The lazily built rmcp server all sessions share
//! - [`handlers`] - `GET {base}/sse` and `POST {base}/messages`
//! - [`bridge::ProxyClient`] - In-process rmcp client used by the synchronous facade
//! - [`single_flight::SingleFlight`] - Start-once cell behind both lazy singletons
//!
//! # Example
//!
//! ```rust,no_run
//! use akashic_mcp::config::ServerConfig;
//! use akashic_mcp::mcp::handlers::{mcp_routes, McpState};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let state = McpState::new(ServerConfig::from_env()?);
//! let router = mcp_routes(state);
//! let listener = tokio::net::TcpListener::bind("127.0.0.1:8080").await?;
//! axum::serve(listener, router).await?;
//! # Ok(())
//! # }
//! ```

pub mod bridge;
pub mod handlers;
pub mod registry;
pub mod service;
pub mod session;
pub mod single_flight;
pub mod transport;

pub use bridge::{McpClient, ProxyClient};
pub use handlers::{mcp_routes, McpState};
pub use registry::{RegistryError, SharedTransportRegistry, TransportRegistry};
pub use service::ToolServer;
pub use single_flight::{FlightPhase, SingleFlight};
pub use transport::SseTransport;
