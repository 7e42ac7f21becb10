//! Per-session SSE transport
//!
//! An [`SseTransport`] is the bidirectional channel of exactly one session:
//!
//! ```text
//!  POST {base}/messages ──► handle_post_message ──► inbound queue ──► rmcp server
//!  GET  {base}/sse      ◄── event stream        ◄── outbound queue ◄── rmcp server
//! ```
//!
//! The close token fires when the SSE body is dropped (client went away),
//! when the session's server stops, or when [`SseTransport::close`] is
//! called. Registry cleanup keys off that token.

use crate::mcp::session::{message_endpoint, new_session_id};
use axum::response::sse::Event;
use futures::{stream, Sink, SinkExt, Stream, StreamExt};
use rmcp::model::{ClientJsonRpcMessage, ServerJsonRpcMessage};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::{CancellationToken, DropGuard, PollSender};

/// Frames buffered per direction before senders wait
const CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Invalid JSON: {0}")]
    InvalidJson(String),

    #[error("Invalid JSON-RPC message: {0}")]
    InvalidMessage(String),

    #[error("Session {0} is closed")]
    Closed(String),
}

/// Receiving halves handed to whoever drives the session
pub struct SessionChannels {
    /// Frames posted by the client, in arrival order
    pub inbound: mpsc::Receiver<ClientJsonRpcMessage>,
    /// Frames destined for the SSE stream
    pub outbound: mpsc::Receiver<ServerJsonRpcMessage>,
}

#[derive(Debug)]
pub struct SseTransport {
    session_id: String,
    endpoint: String,
    inbound_tx: mpsc::Sender<ClientJsonRpcMessage>,
    outbound_tx: mpsc::Sender<ServerJsonRpcMessage>,
    closed: CancellationToken,
}

impl SseTransport {
    /// Creates a transport with a fresh session id
    ///
    /// # Arguments
    ///
    /// * `messages_path` - Path of the message endpoint; the session's post
    ///   URI is derived from it
    pub fn new(messages_path: &str) -> (Self, SessionChannels) {
        Self::with_session_id(messages_path, new_session_id())
    }

    pub fn with_session_id(messages_path: &str, session_id: String) -> (Self, SessionChannels) {
        let (inbound_tx, inbound) = mpsc::channel(CHANNEL_CAPACITY);
        let (outbound_tx, outbound) = mpsc::channel(CHANNEL_CAPACITY);

        let transport = Self {
            endpoint: message_endpoint(messages_path, &session_id),
            session_id,
            inbound_tx,
            outbound_tx,
            closed: CancellationToken::new(),
        };

        (transport, SessionChannels { inbound, outbound })
    }

    /// The session id, or `None` when none could be derived
    pub fn session_id(&self) -> Option<&str> {
        Some(self.session_id.as_str()).filter(|id| !id.is_empty())
    }

    /// URI the client must POST frames to
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Parses a posted body and queues it for the session's server
    ///
    /// Errors stay local to this session: the caller turns them into a
    /// response for the poster and nothing else observes them.
    pub async fn handle_post_message(&self, body: &[u8]) -> Result<(), TransportError> {
        if self.is_closed() {
            return Err(TransportError::Closed(self.session_id.clone()));
        }

        let message = parse_frame(body)?;
        tracing::debug!(session_id = %self.session_id, ?message, "Inbound frame");

        self.inbound_tx
            .send(message)
            .await
            .map_err(|_| TransportError::Closed(self.session_id.clone()))
    }

    pub fn close(&self) {
        self.closed.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    /// Resolves once the session is closed, whatever the cause
    pub async fn closed(&self) {
        self.closed.cancelled().await
    }

    pub fn close_token(&self) -> CancellationToken {
        self.closed.clone()
    }

    /// Sink and stream an rmcp server runs this session over
    ///
    /// The sink feeds the outbound queue; the stream drains `inbound`.
    pub fn server_io(
        &self,
        inbound: mpsc::Receiver<ClientJsonRpcMessage>,
    ) -> (
        impl Sink<ServerJsonRpcMessage, Error = std::io::Error> + Send + Unpin + 'static,
        impl Stream<Item = ClientJsonRpcMessage> + Send + Unpin + 'static,
    ) {
        let sink = PollSender::new(self.outbound_tx.clone()).sink_map_err(std::io::Error::other);
        (sink, ReceiverStream::new(inbound))
    }

    /// Builds the SSE event stream for this session
    ///
    /// The stream opens with the `endpoint` event, then yields one `message`
    /// event per outbound frame. Dropping the stream closes the transport.
    pub fn event_stream(
        &self,
        outbound: mpsc::Receiver<ServerJsonRpcMessage>,
    ) -> impl Stream<Item = Result<Event, axum::Error>> + Send + 'static {
        let endpoint = Event::default().event("endpoint").data(self.endpoint.clone());
        let guard = self.closed.clone().drop_guard();

        let frames = stream::unfold(
            (outbound, guard),
            |(mut outbound, guard): (mpsc::Receiver<ServerJsonRpcMessage>, DropGuard)| async move {
                let frame = outbound.recv().await?;
                let event = Event::default().event("message").json_data(&frame);
                Some((event, (outbound, guard)))
            },
        );

        stream::once(async move { Ok(endpoint) }).chain(frames)
    }
}

fn parse_frame(body: &[u8]) -> Result<ClientJsonRpcMessage, TransportError> {
    serde_json::from_slice(body).map_err(|e| {
        if e.is_syntax() || e.is_eof() {
            TransportError::InvalidJson(e.to_string())
        } else {
            TransportError::InvalidMessage(e.to_string())
        }
    })
}
