//! Project packaging

use super::command::{describe_status, format_report, CommandSpec};
use super::project::existing_project;
use super::{error_result, parse_args, FnHandler, ToolContext, ToolRegistry, ToolRegistryError};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use rmcp::model::{CallToolResult, Content, JsonObject};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PackageArgs {
    project_dir: String,
}

async fn package_project(ctx: ToolContext, args: JsonObject) -> CallToolResult {
    let args: PackageArgs = match parse_args(args) {
        Ok(args) => args,
        Err(result) => return result,
    };
    let project = match existing_project(&ctx, &args.project_dir) {
        Ok(project) => project,
        Err(result) => return result,
    };

    let staging = match tempfile::tempdir() {
        Ok(dir) => dir,
        Err(e) => return error_result(format!("Failed to create staging directory: {}", e)),
    };
    let archive = staging.path().join("project.zip");

    let spec = match CommandSpec::parse(&ctx.config.zip_bin, &project) {
        Ok(spec) => spec.args([
            "-r".to_string(),
            "-q".to_string(),
            archive.to_string_lossy().into_owned(),
            ".".to_string(),
            "-x".to_string(),
            "node_modules/*".to_string(),
            "*/node_modules/*".to_string(),
        ]),
        Err(e) => return error_result(e.to_string()),
    };
    let command_line = spec.display();

    match ctx.runner.run(spec).await {
        Ok(output) if output.success() => {}
        Ok(output) => {
            return error_result(format_report(
                &format!(
                    "`{}` failed with exit status {}.",
                    command_line,
                    describe_status(output.status)
                ),
                &output,
            ))
        }
        Err(e) => return error_result(e.to_string()),
    }

    let bytes = match tokio::fs::read(&archive).await {
        Ok(bytes) => bytes,
        Err(e) => return error_result(format!("Archive was not produced: {}", e)),
    };

    tracing::info!(project = %project.display(), bytes = bytes.len(), "Project packaged");
    CallToolResult::success(vec![
        Content::text(format!(
            "Packaged {} ({} bytes, zip, base64 below).",
            project.display(),
            bytes.len()
        )),
        Content::text(STANDARD.encode(&bytes)),
    ])
}

pub(super) fn register(registry: &mut ToolRegistry) -> Result<(), ToolRegistryError> {
    registry.register(
        "package_project",
        "Zip a project directory (without node_modules) and return it base64-encoded",
        json!({
            "type": "object",
            "properties": {
                "projectDir": { "type": "string" }
            },
            "required": ["projectDir"],
            "additionalProperties": false
        }),
        Arc::new(FnHandler(package_project)),
    )
}
