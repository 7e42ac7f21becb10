//! Session identifiers
//!
//! Streaming sessions are keyed by an opaque id generated when the SSE
//! connection is accepted. Out-of-band POSTs name their session either with
//! the `mcp-session-id` header or with a `sessionId` / `session_id` query
//! parameter, checked in that order.

use axum::http::HeaderMap;
use std::collections::HashMap;
use uuid::Uuid;

pub const SESSION_HEADER: &str = "mcp-session-id";
pub const SESSION_QUERY_KEYS: [&str; 2] = ["sessionId", "session_id"];

/// Generates a collision-resistant session id
pub fn new_session_id() -> String {
    Uuid::new_v4().to_string()
}

/// Resolves the target session of an inbound message
///
/// Empty values count as absent so that `?sessionId=` falls through to the
/// next source instead of producing an unroutable lookup.
pub fn resolve_session_id(headers: &HeaderMap, query: &HashMap<String, String>) -> Option<String> {
    let from_header = headers
        .get(SESSION_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty());

    if let Some(id) = from_header {
        return Some(id.to_string());
    }

    SESSION_QUERY_KEYS
        .iter()
        .filter_map(|key| query.get(*key))
        .map(|value| value.trim())
        .find(|value| !value.is_empty())
        .map(str::to_string)
}

/// Message endpoint URI announced to the client in the `endpoint` event
pub fn message_endpoint(messages_path: &str, session_id: &str) -> String {
    format!("{}?sessionId={}", messages_path, session_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn query(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_header_wins_over_query() {
        let mut headers = HeaderMap::new();
        headers.insert(SESSION_HEADER, HeaderValue::from_static("from-header"));

        let resolved = resolve_session_id(&headers, &query(&[("sessionId", "from-query")]));
        assert_eq!(resolved.as_deref(), Some("from-header"));
    }

    #[test]
    fn test_both_query_names_accepted() {
        let headers = HeaderMap::new();
        assert_eq!(
            resolve_session_id(&headers, &query(&[("sessionId", "a")])).as_deref(),
            Some("a")
        );
        assert_eq!(
            resolve_session_id(&headers, &query(&[("session_id", "b")])).as_deref(),
            Some("b")
        );
    }

    #[test]
    fn test_missing_or_empty_is_none() {
        let mut headers = HeaderMap::new();
        assert_eq!(resolve_session_id(&headers, &HashMap::new()), None);

        headers.insert(SESSION_HEADER, HeaderValue::from_static(""));
        assert_eq!(
            resolve_session_id(&headers, &query(&[("sessionId", "")])),
            None
        );
    }

    #[test]
    fn test_generated_ids_are_distinct() {
        let a = new_session_id();
        let b = new_session_id();
        assert!(!a.is_empty());
        assert_ne!(a, b);
    }
}
