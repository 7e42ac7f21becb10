pub mod config;
pub mod error;
pub mod handlers;
pub mod mcp;
pub mod tools;

// Make test_utils available for both unit tests and integration tests
pub mod test_utils;

use axum::{routing::get, Router};
use config::ServerConfig;
use mcp::bridge::ProxyClient;
use mcp::handlers::{mcp_routes, McpState};
use std::sync::Arc;
use tools::command::{CommandRunner, ProcessRunner};
use tower_http::trace::TraceLayer;

/// Everything the process owns, wired together
///
/// The shared tool server and the proxy client are both lazy; nothing is
/// built until the first session or facade call needs it.
#[derive(Clone)]
pub struct AppContext {
    pub router: Router,
    pub mcp: McpState,
    pub proxy: Arc<ProxyClient>,
}

pub fn build_app(config: ServerConfig) -> AppContext {
    build_app_with_runner(config, Arc::new(ProcessRunner))
}

/// Same as [`build_app`] with external commands routed through `runner`
pub fn build_app_with_runner(config: ServerConfig, runner: Arc<dyn CommandRunner>) -> AppContext {
    let mcp = McpState::with_runner(config, runner);
    let streaming = mcp_routes(mcp.clone());
    let proxy = Arc::new(ProxyClient::new(streaming.clone(), mcp.config.clone()));

    let router = Router::new()
        .route("/health", get(|| async { "OK" }))
        .merge(streaming)
        .merge(handlers::proxy_routes(proxy.clone()))
        .layer(TraceLayer::new_for_http());

    AppContext { router, mcp, proxy }
}
