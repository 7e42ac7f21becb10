//! Plain file tools: create a file, read a project back, write a README

use super::paths::{display_relative, resolve_workspace_path};
use super::{error_result, parse_args, text_result, FnHandler, ToolContext, ToolRegistry, ToolRegistryError};
use rmcp::model::{CallToolResult, Content, JsonObject};
use serde::Deserialize;
use serde_json::json;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;
use walkdir::WalkDir;

const SKIPPED_DIRS: [&str; 2] = ["node_modules", ".git"];

const BINARY_EXTENSIONS: [&str; 22] = [
    "png", "jpg", "jpeg", "gif", "webp", "bmp", "ico", "ogg", "m4a", "aac", "mp3", "wav", "mp4",
    "webm", "zip", "gz", "tar", "woff", "woff2", "ttf", "otf", "pdf",
];

pub(crate) fn is_binary_like(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| BINARY_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

#[derive(Debug, Deserialize)]
struct CreateFileArgs {
    path: String,
    content: String,
}

async fn create_file(ctx: ToolContext, args: JsonObject) -> CallToolResult {
    let args: CreateFileArgs = match parse_args(args) {
        Ok(args) => args,
        Err(result) => return result,
    };
    let target = match resolve_workspace_path(&ctx.config.workspace_root, &args.path) {
        Ok(path) => path,
        Err(e) => return error_result(e.to_string()),
    };

    if let Some(parent) = target.parent() {
        if let Err(e) = tokio::fs::create_dir_all(parent).await {
            return error_result(format!("Failed to create {}: {}", parent.display(), e));
        }
    }
    match tokio::fs::write(&target, args.content.as_bytes()).await {
        Ok(()) => text_result(format!(
            "Wrote {} bytes to {}",
            args.content.len(),
            target.display()
        )),
        Err(e) => error_result(format!("Failed to write {}: {}", target.display(), e)),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProjectArgs {
    project_dir: String,
}

fn read_capped(path: &Path, max_bytes: u64) -> std::io::Result<Option<(String, bool)>> {
    let file = std::fs::File::open(path)?;
    let size = file.metadata()?.len();
    let mut bytes = Vec::new();
    file.take(max_bytes).read_to_end(&mut bytes)?;

    let truncated = size > max_bytes;
    let text = match String::from_utf8(bytes) {
        Ok(text) => text,
        // A cut in the middle of a multi-byte char is fine; anything else is binary.
        Err(e) if truncated && e.utf8_error().error_len().is_none() => {
            let valid = e.utf8_error().valid_up_to();
            let mut bytes = e.into_bytes();
            bytes.truncate(valid);
            String::from_utf8(bytes).unwrap_or_default()
        }
        Err(_) => return Ok(None),
    };
    Ok(Some((text, truncated)))
}

async fn read_project_files(ctx: ToolContext, args: JsonObject) -> CallToolResult {
    let args: ProjectArgs = match parse_args(args) {
        Ok(args) => args,
        Err(result) => return result,
    };
    let project = match resolve_workspace_path(&ctx.config.workspace_root, &args.project_dir) {
        Ok(path) => path,
        Err(e) => return error_result(e.to_string()),
    };
    if !project.is_dir() {
        return error_result(format!("Project directory not found: {}", project.display()));
    }

    let max_bytes = ctx.config.max_read_bytes;
    let outcome = tokio::task::spawn_blocking(move || -> std::io::Result<Vec<Content>> {
        let mut blocks = Vec::new();
        let walker = WalkDir::new(&project)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| {
                !(entry.file_type().is_dir()
                    && SKIPPED_DIRS.contains(&entry.file_name().to_string_lossy().as_ref()))
            });

        for entry in walker {
            let entry = entry.map_err(std::io::Error::other)?;
            if !entry.file_type().is_file() || is_binary_like(entry.path()) {
                continue;
            }
            let Some((text, truncated)) = read_capped(entry.path(), max_bytes)? else {
                continue;
            };
            let mut block = format!("=== {} ===\n{}", display_relative(&project, entry.path()), text);
            if truncated {
                block.push_str("\n[truncated]");
            }
            blocks.push(Content::text(block));
        }

        if blocks.is_empty() {
            blocks.push(Content::text(format!(
                "No readable files found in {}",
                project.display()
            )));
        }
        Ok(blocks)
    })
    .await;

    match outcome {
        Ok(Ok(blocks)) => CallToolResult::success(blocks),
        Ok(Err(e)) => error_result(format!("Failed to read project files: {}", e)),
        Err(e) => error_result(format!("Failed to read project files: {}", e)),
    }
}

#[derive(Debug, Deserialize)]
struct ReadmeSection {
    heading: String,
    body: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReadmeArgs {
    project_dir: String,
    title: String,
    summary: String,
    #[serde(default)]
    sections: Option<Vec<ReadmeSection>>,
}

pub fn render_readme(title: &str, summary: &str, sections: &[(String, String)]) -> String {
    let mut readme = format!("# {}\n\n{}\n", title.trim(), summary.trim());
    for (heading, body) in sections {
        readme.push_str(&format!("\n## {}\n\n{}\n", heading.trim(), body.trim()));
    }
    readme
}

async fn write_project_readme(ctx: ToolContext, args: JsonObject) -> CallToolResult {
    let args: ReadmeArgs = match parse_args(args) {
        Ok(args) => args,
        Err(result) => return result,
    };
    if args.title.trim().is_empty() {
        return error_result("Title must not be empty.");
    }
    let project = match resolve_workspace_path(&ctx.config.workspace_root, &args.project_dir) {
        Ok(path) => path,
        Err(e) => return error_result(e.to_string()),
    };

    let sections: Vec<(String, String)> = args
        .sections
        .unwrap_or_default()
        .into_iter()
        .map(|s| (s.heading, s.body))
        .collect();
    let readme = render_readme(&args.title, &args.summary, &sections);

    if let Err(e) = tokio::fs::create_dir_all(&project).await {
        return error_result(format!("Failed to create {}: {}", project.display(), e));
    }
    let target = project.join("README.md");
    match tokio::fs::write(&target, readme).await {
        Ok(()) => text_result(format!("Wrote {}", target.display())),
        Err(e) => error_result(format!("Failed to write {}: {}", target.display(), e)),
    }
}

pub(super) fn register(registry: &mut ToolRegistry) -> Result<(), ToolRegistryError> {
    registry.register(
        "create_file",
        "Create or overwrite a file, creating parent directories as needed",
        json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "File path; relative paths resolve against the workspace" },
                "content": { "type": "string" }
            },
            "required": ["path", "content"],
            "additionalProperties": false
        }),
        Arc::new(FnHandler(create_file)),
    )?;

    registry.register(
        "read_project_files",
        "Read back the text files of a project, skipping binary assets and node_modules",
        json!({
            "type": "object",
            "properties": {
                "projectDir": { "type": "string" }
            },
            "required": ["projectDir"],
            "additionalProperties": false
        }),
        Arc::new(FnHandler(read_project_files)),
    )?;

    registry.register(
        "write_project_readme",
        "Write README.md for a project from a title, a summary and optional sections",
        json!({
            "type": "object",
            "properties": {
                "projectDir": { "type": "string" },
                "title": { "type": "string" },
                "summary": { "type": "string" },
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
            "required": ["projectDir", "title", "summary"],
            "additionalProperties": false
        }),
        Arc::new(FnHandler(write_project_readme)),
    )
}
