//! Tool catalog for akashic game projects
//!
//! Every tool is a named handler behind a JSON Schema. The registry owns
//! the uniform `(name, arguments) -> CallToolResult` contract the protocol
//! layer relies on:
//!
//! ```text
//! call(name, args)
//!   ├─ unknown name          → isError "Tool not found: <name>"
//!   ├─ schema check fails    → isError "Invalid arguments for <name>: ..."
//!   └─ handler.call(ctx, args)
//!        └─ handler converts its own failures to isError results
//! ```
//!
//! Handlers never return `Err`; expected failures (bad path, missing
//! directory, failed external command) become error payloads so that the
//! streaming path and the synchronous facade see the same result shape.

pub mod archive;
pub mod assets;
pub mod command;
pub mod docs;
pub mod files;
pub mod paths;
pub mod project;

use crate::config::ToolConfig;
use async_trait::async_trait;
use command::{CommandRunner, ProcessRunner};
use docs::DocsIndex;
use rmcp::model::{CallToolResult, Content, JsonObject, Tool};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ToolRegistryError {
    #[error("Tool '{0}' is already registered")]
    DuplicateTool(String),

    #[error("Schema for tool '{name}' is invalid: {reason}")]
    InvalidSchema { name: String, reason: String },
}

/// Shared dependencies handed to every tool invocation
#[derive(Clone)]
pub struct ToolContext {
    pub config: Arc<ToolConfig>,
    pub runner: Arc<dyn CommandRunner>,
    pub http: reqwest::Client,
    pub docs: Arc<DocsIndex>,
}

impl ToolContext {
    /// Context that runs real processes
    pub fn new(config: ToolConfig, docs: DocsIndex) -> Self {
        Self::with_runner(config, docs, Arc::new(ProcessRunner))
    }

    pub fn with_runner(config: ToolConfig, docs: DocsIndex, runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            config: Arc::new(config),
            runner,
            http: reqwest::Client::new(),
            docs: Arc::new(docs),
        }
    }
}

#[async_trait]
pub trait ToolHandler: Send + Sync {
    /// Runs the tool with schema-checked arguments
    async fn call(&self, ctx: &ToolContext, args: JsonObject) -> CallToolResult;
}

/// Adapts an async closure into a [`ToolHandler`]
pub struct FnHandler<F>(pub F);

#[async_trait]
impl<F, Fut> ToolHandler for FnHandler<F>
where
    F: Fn(ToolContext, JsonObject) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = CallToolResult> + Send + 'static,
{
    async fn call(&self, ctx: &ToolContext, args: JsonObject) -> CallToolResult {
        (self.0)(ctx.clone(), args).await
    }
}

struct RegisteredTool {
    definition: Tool,
    validator: jsonschema::Validator,
    handler: Arc<dyn ToolHandler>,
}

/// Name → handler mapping with per-tool argument schemas
///
/// Listing order is registration order.
pub struct ToolRegistry {
    context: ToolContext,
    tools: Vec<RegisteredTool>,
    index: HashMap<String, usize>,
}

impl ToolRegistry {
    pub fn new(context: ToolContext) -> Self {
        Self {
            context,
            tools: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Registry preloaded with the akashic project tools
    pub fn with_builtin_tools(context: ToolContext) -> Result<Self, ToolRegistryError> {
        let mut registry = Self::new(context);
        docs::register(&mut registry)?;
        files::register(&mut registry)?;
        project::register(&mut registry)?;
        assets::register(&mut registry)?;
        archive::register(&mut registry)?;
        Ok(registry)
    }

    /// Adds a tool
    ///
    /// # Errors
    ///
    /// * `ToolRegistryError::DuplicateTool` - `name` is taken
    /// * `ToolRegistryError::InvalidSchema` - `schema` is not a JSON object
    ///   of `type: "object"`, or does not compile as a JSON Schema
    pub fn register(
        &mut self,
        name: &str,
        description: &str,
        schema: Value,
        handler: Arc<dyn ToolHandler>,
    ) -> Result<(), ToolRegistryError> {
        if self.index.contains_key(name) {
            return Err(ToolRegistryError::DuplicateTool(name.to_string()));
        }

        let schema = match schema {
            Value::Object(map) => map,
            _ => {
                return Err(ToolRegistryError::InvalidSchema {
                    name: name.to_string(),
                    reason: "schema must be a JSON object".to_string(),
                })
            }
        };
        if schema.get("type").and_then(Value::as_str) != Some("object") {
            return Err(ToolRegistryError::InvalidSchema {
                name: name.to_string(),
                reason: "schema type must be \"object\"".to_string(),
            });
        }

        let validator = jsonschema::validator_for(&Value::Object(schema.clone())).map_err(|e| {
            ToolRegistryError::InvalidSchema {
                name: name.to_string(),
                reason: e.to_string(),
            }
        })?;

        let definition = Tool {
            name: name.to_string().into(),
            description: Some(description.to_string().into()),
            input_schema: Arc::new(schema),
            annotations: None,
            title: None,
            icons: None,
            output_schema: None,
        };

        self.index.insert(name.to_string(), self.tools.len());
        self.tools.push(RegisteredTool {
            definition,
            validator,
            handler,
        });
        Ok(())
    }

    pub fn definitions(&self) -> Vec<Tool> {
        self.tools.iter().map(|t| t.definition.clone()).collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn context(&self) -> &ToolContext {
        &self.context
    }

    /// Validates and dispatches one call; never fails at the Rust level
    pub async fn call(&self, name: &str, arguments: Option<JsonObject>) -> CallToolResult {
        let Some(tool) = self.index.get(name).map(|&i| &self.tools[i]) else {
            tracing::warn!(tool = %name, "Call to unregistered tool");
            return error_result(format!("Tool not found: {}", name));
        };

        let arguments = match validate_arguments(&tool.validator, arguments.unwrap_or_default()) {
            Ok(arguments) => arguments,
            Err(reason) => {
                tracing::debug!(tool = %name, reason = %reason, "Argument validation failed");
                return error_result(format!("Invalid arguments for {}: {}", name, reason));
            }
        };

        tracing::debug!(tool = %name, "Invoking tool");
        let result = tool.handler.call(&self.context, arguments).await;
        if result.is_error == Some(true) {
            tracing::info!(tool = %name, "Tool returned an error result");
        }
        result
    }
}

/// Checks `args` against a tool's compiled schema
///
/// Top-level nulls count as absent, so optional fields may be sent as
/// explicit nulls. Returns the arguments with those keys removed, or every
/// violation joined with `"; "`.
pub fn validate_arguments(
    validator: &jsonschema::Validator,
    args: JsonObject,
) -> Result<JsonObject, String> {
    let args: JsonObject = args.into_iter().filter(|(_, v)| !v.is_null()).collect();
    let instance = Value::Object(args);

    let errors: Vec<String> = validator
        .iter_errors(&instance)
        .map(|e| e.to_string())
        .collect();
    if !errors.is_empty() {
        return Err(errors.join("; "));
    }

    match instance {
        Value::Object(args) => Ok(args),
        _ => Ok(JsonObject::new()),
    }
}

/// Deserializes validated arguments into a handler's typed form
pub fn parse_args<T: DeserializeOwned>(args: JsonObject) -> Result<T, CallToolResult> {
    serde_json::from_value(Value::Object(args))
        .map_err(|e| error_result(format!("Invalid arguments: {}", e)))
}

pub fn text_result(text: impl Into<String>) -> CallToolResult {
    CallToolResult::success(vec![Content::text(text.into())])
}

pub fn error_result(text: impl Into<String>) -> CallToolResult {
    CallToolResult::error(vec![Content::text(text.into())])
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::path::Path;

    /// Context rooted at `workspace` with the given runner and no docs
    pub fn context(workspace: &Path, runner: Arc<dyn CommandRunner>) -> ToolContext {
        ToolContext::with_runner(
            ToolConfig::with_workspace(workspace.to_path_buf()),
            DocsIndex::default(),
            runner,
        )
    }

    /// First text block of a result
    pub fn first_text(result: &CallToolResult) -> String {
        let value = serde_json::to_value(result).unwrap();
        value["content"][0]["text"].as_str().unwrap_or_default().to_string()
    }

    pub fn is_error(result: &CallToolResult) -> bool {
        result.is_error == Some(true)
    }

    pub fn args(value: Value) -> JsonObject {
        value.as_object().cloned().unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use crate::tools::command::MockCommandRunner;
    use serde_json::json;

    fn echo_registry() -> ToolRegistry {
        let dir = std::env::temp_dir();
        let mut registry = ToolRegistry::new(context(&dir, Arc::new(MockCommandRunner::new())));
        registry
            .register(
                "echo",
                "Echo the message",
                json!({
                    "type": "object",
                    "properties": {
                        "message": { "type": "string" },
                        "times": { "type": "integer", "minimum": 1, "maximum": 3 },
                        "mode": { "type": "string", "enum": ["plain", "loud"] }
                    },
                    "required": ["message"],
                    "additionalProperties": false
                }),
                Arc::new(FnHandler(|_ctx: ToolContext, args: JsonObject| async move {
                    text_result(args["message"].as_str().unwrap_or_default())
                })),
            )
            .unwrap();
        registry
    }

    #[tokio::test]
    async fn test_call_dispatches_to_handler() {
        let registry = echo_registry();
        let result = registry
            .call("echo", Some(args(json!({ "message": "hello" }))))
            .await;

        assert!(!is_error(&result));
        assert_eq!(first_text(&result), "hello");
    }

    #[tokio::test]
    async fn test_unknown_tool_is_an_error_result() {
        let registry = echo_registry();
        let result = registry.call("nope", None).await;

        assert!(is_error(&result));
        assert_eq!(first_text(&result), "Tool not found: nope");
    }

    #[tokio::test]
    async fn test_validation_errors_name_the_tool() {
        let registry = echo_registry();

        let missing = registry.call("echo", None).await;
        assert!(is_error(&missing));
        assert!(first_text(&missing).starts_with("Invalid arguments for echo:"));

        let wrong_type = registry
            .call("echo", Some(args(json!({ "message": 42 }))))
            .await;
        assert!(first_text(&wrong_type).contains("\"string\""));

        let unknown = registry
            .call("echo", Some(args(json!({ "message": "x", "extra": true }))))
            .await;
        assert!(first_text(&unknown).contains("'extra'"));

        let out_of_range = registry
            .call("echo", Some(args(json!({ "message": "x", "times": 9 }))))
            .await;
        assert!(first_text(&out_of_range).contains("maximum of 3"));

        let bad_enum = registry
            .call("echo", Some(args(json!({ "message": "x", "mode": "quiet" }))))
            .await;
        assert!(first_text(&bad_enum).contains("is not one of"));

        let explicit_null = registry
            .call("echo", Some(args(json!({ "message": "x", "mode": null }))))
            .await;
        assert!(!is_error(&explicit_null), "{}", first_text(&explicit_null));
    }

    #[test]
    fn test_register_rejects_duplicates_and_bad_schemas() {
        let mut registry = echo_registry();
        let handler: Arc<dyn ToolHandler> =
            Arc::new(FnHandler(|_: ToolContext, _: JsonObject| async { text_result("") }));

        assert!(matches!(
            registry.register("echo", "again", json!({"type": "object"}), handler.clone()),
            Err(ToolRegistryError::DuplicateTool(_))
        ));
        assert!(matches!(
            registry.register("bad", "bad", json!("not a schema"), handler.clone()),
            Err(ToolRegistryError::InvalidSchema { .. })
        ));
        assert!(matches!(
            registry.register("arr", "arr", json!({"type": "array"}), handler.clone()),
            Err(ToolRegistryError::InvalidSchema { .. })
        ));
        assert!(matches!(
            registry.register(
                "broken",
                "broken",
                json!({"type": "object", "properties": {"n": {"type": 7}}}),
                handler
            ),
            Err(ToolRegistryError::InvalidSchema { .. })
        ));
    }

    #[test]
    fn test_nested_array_items_are_validated() {
        let validator = jsonschema::validator_for(&json!({
            "type": "object",
            "properties": {
                "sections": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "heading": { "type": "string" },
                            "body": { "type": "string" }
                        },
                        "required": ["heading", "body"],
                        "additionalProperties": false
                    }
                }
            },
            "additionalProperties": false
        }))
        .unwrap();

        assert!(validate_arguments(
            &validator,
            args(json!({ "sections": [{ "heading": "A", "body": "B" }] }))
        )
        .is_ok());

        let err = validate_arguments(&validator, args(json!({ "sections": [{ "heading": "A" }] })))
            .unwrap_err();
        assert!(err.contains("\"body\""), "{}", err);
        assert!(err.contains("required"), "{}", err);
    }

    #[test]
    fn test_builtin_catalog_is_complete() {
        let dir = std::env::temp_dir();
        let registry =
            ToolRegistry::with_builtin_tools(context(&dir, Arc::new(MockCommandRunner::new())))
                .unwrap();

        let names: Vec<String> = registry
            .definitions()
            .iter()
            .map(|t| t.name.to_string())
            .collect();
        for expected in [
            "search_akashic_docs",
            "create_file",
            "init_project",
            "scan_assets",
            "install_extension",
            "import_assets",
            "run_headless_test",
            "format_sources",
            "convert_audio",
            "check_syntax",
            "read_project_files",
            "write_project_readme",
            "package_project",
        ] {
            assert!(names.contains(&expected.to_string()), "missing {}", expected);
        }

        for tool in registry.definitions() {
            assert_eq!(
                tool.input_schema.get("additionalProperties"),
                Some(&Value::Bool(false)),
                "{} schema must be closed",
                tool.name
            );
        }
    }
}
