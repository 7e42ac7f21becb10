//! Thread-safe session transport registry
//!
//! Maps session ids to the live [`SseTransport`] of each streaming
//! connection. Connection accept, connection close and message routing all
//! touch it concurrently, so it is shared as `Arc<RwLock<TransportRegistry>>`.

use crate::mcp::transport::SseTransport;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("Session not found: {0}")]
    SessionNotFound(String),
}

/// Registry of active streaming sessions
///
/// At most one transport is held per session id. Registering an id that is
/// already present replaces the previous transport, which is returned to
/// the caller and is no longer routable.
///
/// # Examples
///
/// ```rust
/// use akashic_mcp::mcp::registry::TransportRegistry;
/// use akashic_mcp::mcp::transport::SseTransport;
/// use std::sync::Arc;
///
/// let mut registry = TransportRegistry::new();
/// let (transport, _channels) = SseTransport::new("/messages");
/// let transport = Arc::new(transport);
/// let id = transport.session_id().unwrap().to_string();
///
/// registry.register(&id, transport);
/// assert!(registry.lookup(&id).is_ok());
///
/// registry.unregister(&id);
/// registry.unregister(&id);
/// assert!(registry.lookup(&id).is_err());
/// ```
#[derive(Debug, Default)]
pub struct TransportRegistry {
    transports: HashMap<String, Arc<SseTransport>>,
}

pub type SharedTransportRegistry = Arc<RwLock<TransportRegistry>>;

impl TransportRegistry {
    /// Creates a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> SharedTransportRegistry {
        Arc::new(RwLock::new(Self::new()))
    }

    /// Associates `session_id` with `transport`
    ///
    /// # Returns
    ///
    /// * `Some(previous)` - A transport was already registered under this id
    ///   and has been orphaned
    /// * `None` - Fresh registration, or `session_id` was empty
    ///
    /// # Behavior
    ///
    /// An empty id is accepted without storing anything; routing to such a
    /// session will always fail.
    pub fn register(
        &mut self,
        session_id: &str,
        transport: Arc<SseTransport>,
    ) -> Option<Arc<SseTransport>> {
        if session_id.is_empty() {
            tracing::warn!("Streaming session has no id; messages cannot be routed to it");
            return None;
        }

        let previous = self.transports.insert(session_id.to_string(), transport);
        if previous.is_some() {
            tracing::warn!(session_id = %session_id, "Session id collision; previous transport orphaned");
        }
        previous
    }

    /// Retrieves the transport registered for `session_id`
    pub fn lookup(&self, session_id: &str) -> Result<Arc<SseTransport>, RegistryError> {
        self.transports
            .get(session_id)
            .map(Arc::clone)
            .ok_or_else(|| RegistryError::SessionNotFound(session_id.to_string()))
    }

    /// Removes a session; unknown ids are ignored
    pub fn unregister(&mut self, session_id: &str) -> Option<Arc<SseTransport>> {
        self.transports.remove(session_id)
    }

    /// Removes `session_id` only while it still maps to `transport`
    ///
    /// Close callbacks use this so that an orphaned transport closing late
    /// cannot evict the transport that replaced it.
    pub fn unregister_transport(&mut self, session_id: &str, transport: &Arc<SseTransport>) -> bool {
        match self.transports.get(session_id) {
            Some(current) if Arc::ptr_eq(current, transport) => {
                self.transports.remove(session_id);
                true
            }
            _ => false,
        }
    }

    pub fn len(&self) -> usize {
        self.transports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transports.is_empty()
    }

    pub fn session_ids(&self) -> Vec<String> {
        self.transports.keys().cloned().collect()
    }
}
