use crate::error::AppError;
use crate::mcp::bridge::ProxyClient;
use axum::{
    body::Bytes,
    extract::State,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use rmcp::model::JsonObject;
use serde_json::Value;
use std::sync::Arc;

/// GET /proxy/tools - List every tool through the bridge
///
/// ## Response (200 OK)
/// ```json
/// [
///   { "name": "search_akashic_docs", "description": "...", "inputSchema": { "type": "object" } }
/// ]
/// ```
///
/// ## Errors
/// - 500: The bridge could not connect, or its connection is gone
pub async fn list_tools_handler(
    State(proxy): State<Arc<ProxyClient>>,
) -> Result<Response, AppError> {
    let tools = proxy.list_tools().await.map_err(|e| {
        tracing::error!(error = %e, "Proxy tool listing failed");
        AppError::from(e)
    })?;

    Ok(Json(tools).into_response())
}

/// POST /proxy/call - Call one tool through the bridge
///
/// ## Request Body (JSON)
/// ```json
/// { "name": "search_akashic_docs", "arguments": { "query": "sprite" } }
/// ```
///
/// ## Response (200 OK)
/// The tool's result, including results with `"isError": true`.
///
/// ## Errors
/// - 400: Body is not JSON, `name` is not a string, or `arguments` is not an object
/// - 500: The bridge could not connect, or its connection is gone
pub async fn call_tool_handler(
    State(proxy): State<Arc<ProxyClient>>,
    body: Bytes,
) -> Result<Response, AppError> {
    let (name, arguments) = parse_call_body(&body)?;
    tracing::debug!(tool = %name, "Proxy call");

    let result = proxy.call_tool(&name, arguments).await.map_err(|e| {
        tracing::error!(tool = %name, error = %e, "Proxy call failed");
        AppError::from(e)
    })?;

    Ok(Json(result).into_response())
}

fn parse_call_body(body: &[u8]) -> Result<(String, Option<JsonObject>), AppError> {
    let value: Value = serde_json::from_slice(body)
        .map_err(|e| AppError::InvalidRequest(format!("Invalid JSON: {}", e)))?;

    let name = value
        .get("name")
        .and_then(Value::as_str)
        .ok_or_else(|| AppError::InvalidRequest("Field 'name' must be a string.".to_string()))?
        .to_string();

    let arguments = match value.get("arguments") {
        None | Some(Value::Null) => None,
        Some(Value::Object(map)) => Some(map.clone()),
        Some(_) => {
            return Err(AppError::InvalidRequest(
                "Field 'arguments' must be an object.".to_string(),
            ))
        }
    };

    Ok((name, arguments))
}

/// Router for the synchronous facade
pub fn proxy_routes(proxy: Arc<ProxyClient>) -> Router {
    Router::new()
        .route("/proxy/tools", get(list_tools_handler))
        .route("/proxy/call", post(call_tool_handler))
        .with_state(proxy)
}
