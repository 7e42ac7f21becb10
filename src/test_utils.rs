pub mod test_helpers {
    use crate::config::{ServerConfig, ToolConfig};
    use crate::mcp::session::SESSION_HEADER;
    use crate::tools::command::{CommandError, CommandOutput, CommandRunner, CommandSpec};
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use axum::Router;
    use eventsource_stream::{Event, Eventsource};
    use futures::stream::BoxStream;
    use futures::StreamExt;
    use serde_json::{json, Value};
    use std::collections::VecDeque;
    use std::path::Path;
    use std::sync::Mutex;
    use std::time::Duration;
    use tower::ServiceExt;

    /// Server config rooted at `workspace`, docs under `workspace/docs`
    pub fn workspace_config(workspace: &Path) -> ServerConfig {
        let mut config = ServerConfig::new(ToolConfig::with_workspace(workspace.to_path_buf()));
        config.bridge_handshake_timeout = Duration::from_secs(5);
        config
    }

    /// Write a markdown file into the workspace's docs directory
    pub fn write_doc(workspace: &Path, name: &str, body: &str) -> std::io::Result<()> {
        let docs = workspace.join("docs");
        std::fs::create_dir_all(&docs)?;
        std::fs::write(docs.join(name), body)
    }

    /// Command runner that records every spec and answers from a script
    ///
    /// Queued outputs are returned in order; once the queue is empty every
    /// command succeeds with no output.
    #[derive(Debug, Default)]
    pub struct RecordingRunner {
        calls: Mutex<Vec<CommandSpec>>,
        outputs: Mutex<VecDeque<CommandOutput>>,
    }

    impl RecordingRunner {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn push_output(&self, output: CommandOutput) {
            if let Ok(mut outputs) = self.outputs.lock() {
                outputs.push_back(output);
            }
        }

        pub fn calls(&self) -> Vec<CommandSpec> {
            self.calls.lock().map(|c| c.clone()).unwrap_or_default()
        }
    }

    #[async_trait]
    impl CommandRunner for RecordingRunner {
        async fn run(&self, spec: CommandSpec) -> Result<CommandOutput, CommandError> {
            if let Ok(mut calls) = self.calls.lock() {
                calls.push(spec);
            }
            let queued = self.outputs.lock().ok().and_then(|mut o| o.pop_front());
            Ok(queued.unwrap_or(CommandOutput {
                status: Some(0),
                ..Default::default()
            }))
        }
    }

    /// A raw streaming session driven through the router in-process
    pub struct SseSession {
        router: Router,
        pub session_id: String,
        pub message_uri: String,
        events: BoxStream<'static, Result<Event, String>>,
    }

    impl SseSession {
        /// Opens `sse_path` and waits for the `endpoint` event
        pub async fn open(router: &Router, sse_path: &str) -> Result<Self, String> {
            let response = router
                .clone()
                .oneshot(
                    Request::get(sse_path)
                        .header(header::ACCEPT, "text/event-stream")
                        .body(Body::empty())
                        .map_err(|e| e.to_string())?,
                )
                .await
                .map_err(|e| e.to_string())?;

            if response.status() != StatusCode::OK {
                return Err(format!("stream open failed: {}", response.status()));
            }
            let session_id = response
                .headers()
                .get(SESSION_HEADER)
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default()
                .to_string();

            let mut session = Self {
                router: router.clone(),
                session_id,
                message_uri: String::new(),
                events: response
                    .into_body()
                    .into_data_stream()
                    .eventsource()
                    .map(|event| event.map_err(|e| e.to_string()))
                    .boxed(),
            };

            let endpoint = session.next_event().await?;
            if endpoint.event != "endpoint" {
                return Err(format!("expected endpoint event, got {}", endpoint.event));
            }
            session.message_uri = endpoint.data;
            Ok(session)
        }

        /// Next event, waiting at most five seconds
        pub async fn next_event(&mut self) -> Result<Event, String> {
            tokio::time::timeout(Duration::from_secs(5), self.events.next())
                .await
                .map_err(|_| "timed out waiting for an event".to_string())?
                .unwrap_or_else(|| Err("stream ended".to_string()))
        }

        /// Next `message` event decoded as JSON
        pub async fn next_message(&mut self) -> Result<Value, String> {
            loop {
                let event = self.next_event().await?;
                if event.event == "message" {
                    return serde_json::from_str(&event.data).map_err(|e| e.to_string());
                }
            }
        }

        /// Performs the `initialize` handshake and returns the server's answer
        pub async fn initialize(&mut self) -> Result<Value, String> {
            let answer = self
                .request(json!({
                    "jsonrpc": "2.0",
                    "id": "init",
                    "method": "initialize",
                    "params": {
                        "protocolVersion": "2025-03-26",
                        "capabilities": {},
                        "clientInfo": { "name": "test", "version": "0" }
                    }
                }))
                .await?;
            let status = self
                .post(&json!({ "jsonrpc": "2.0", "method": "notifications/initialized" }))
                .await?;
            if status != StatusCode::ACCEPTED {
                return Err(format!("initialized notification rejected: {}", status));
            }
            Ok(answer)
        }

        /// Opens `sse_path` and completes the handshake
        pub async fn open_initialized(router: &Router, sse_path: &str) -> Result<Self, String> {
            let mut session = Self::open(router, sse_path).await?;
            session.initialize().await?;
            Ok(session)
        }

        /// POSTs a frame to this session's message URI
        pub async fn post(&self, frame: &Value) -> Result<StatusCode, String> {
            post_raw(&self.router, &self.message_uri, frame.to_string()).await
        }

        /// Sends a request and returns the response carrying the same id
        pub async fn request(&mut self, frame: Value) -> Result<Value, String> {
            let status = self.post(&frame).await?;
            if status != StatusCode::ACCEPTED {
                return Err(format!("post rejected: {}", status));
            }
            loop {
                let message = self.next_message().await?;
                if message.get("id") == frame.get("id") {
                    return Ok(message);
                }
            }
        }
    }

    /// POSTs `body` to `uri` and returns the status
    pub async fn post_raw(router: &Router, uri: &str, body: String) -> Result<StatusCode, String> {
        let response = router
            .clone()
            .oneshot(
                Request::post(uri)
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(body))
                    .map_err(|e| e.to_string())?,
            )
            .await
            .map_err(|e| e.to_string())?;
        Ok(response.status())
    }
}
