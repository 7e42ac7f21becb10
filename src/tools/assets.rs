//! Asset import from allow-listed hosts or the local filesystem

use super::paths::resolve_workspace_path;
use super::project::{existing_project, scan_asset};
use super::{error_result, parse_args, FnHandler, ToolContext, ToolRegistry, ToolRegistryError};
use rmcp::model::{CallToolResult, Content, JsonObject};
use serde::Deserialize;
use serde_json::json;
use std::path::Path;
use std::sync::Arc;
use url::Url;

/// Project subdirectory an asset belongs in, by file extension
pub fn asset_dir_for(file_name: &str) -> Option<&'static str> {
    let extension = Path::new(file_name)
        .extension()?
        .to_str()?
        .to_ascii_lowercase();
    match extension.as_str() {
        "png" | "jpg" | "jpeg" | "gif" | "webp" | "svg" => Some("image"),
        "ogg" | "m4a" | "aac" | "mp3" | "wav" => Some("audio"),
        "js" => Some("script"),
        "txt" | "json" | "csv" | "md" => Some("text"),
        _ => None,
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ImportArgs {
    project_dir: String,
    source: String,
}

enum Source {
    Remote(Url),
    Local(std::path::PathBuf),
}

fn classify_source(ctx: &ToolContext, raw: &str) -> Result<Source, String> {
    if let Ok(url) = Url::parse(raw) {
        match url.scheme() {
            "http" | "https" => {
                let host = url.host_str().unwrap_or_default().to_ascii_lowercase();
                if !ctx.config.asset_import_hosts.iter().any(|h| *h == host) {
                    return Err(format!("Host not allowed for asset import: {}", host));
                }
                return Ok(Source::Remote(url));
            }
            // Single-letter schemes are Windows drive letters, not URLs.
            scheme if scheme.len() > 1 => {
                return Err(format!("Unsupported URL scheme: {}", scheme));
            }
            _ => {}
        }
    }

    let path = resolve_workspace_path(&ctx.config.workspace_root, raw).map_err(|e| e.to_string())?;
    if !path.is_file() {
        return Err(format!("Local asset not found: {}", path.display()));
    }
    Ok(Source::Local(path))
}

async fn fetch(ctx: &ToolContext, url: &Url) -> Result<Vec<u8>, String> {
    let response = ctx
        .http
        .get(url.clone())
        .send()
        .await
        .map_err(|e| format!("Download failed: {}", e))?;
    let status = response.status();
    if !status.is_success() {
        return Err(format!("Download failed with HTTP {}: {}", status.as_u16(), url));
    }
    response
        .bytes()
        .await
        .map(|b| b.to_vec())
        .map_err(|e| format!("Download failed: {}", e))
}

async fn import_assets(ctx: ToolContext, args: JsonObject) -> CallToolResult {
    let args: ImportArgs = match parse_args(args) {
        Ok(args) => args,
        Err(result) => return result,
    };
    let project = match existing_project(&ctx, &args.project_dir) {
        Ok(project) => project,
        Err(result) => return result,
    };
    let source = match classify_source(&ctx, args.source.trim()) {
        Ok(source) => source,
        Err(message) => return error_result(message),
    };

    let file_name = match &source {
        Source::Remote(url) => url
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .filter(|name| !name.is_empty())
            .map(str::to_string),
        Source::Local(path) => path.file_name().map(|n| n.to_string_lossy().into_owned()),
    };
    let Some(file_name) = file_name else {
        return error_result(format!("Cannot determine a file name from {}", args.source));
    };
    let Some(subdir) = asset_dir_for(&file_name) else {
        return error_result(format!("Unsupported asset type: {}", file_name));
    };

    let bytes = match &source {
        Source::Remote(url) => match fetch(&ctx, url).await {
            Ok(bytes) => bytes,
            Err(message) => return error_result(message),
        },
        Source::Local(path) => match tokio::fs::read(path).await {
            Ok(bytes) => bytes,
            Err(e) => return error_result(format!("Failed to read {}: {}", path.display(), e)),
        },
    };

    let dest_dir = project.join(subdir);
    if let Err(e) = tokio::fs::create_dir_all(&dest_dir).await {
        return error_result(format!("Failed to create {}: {}", dest_dir.display(), e));
    }
    let dest = dest_dir.join(&file_name);
    if let Err(e) = tokio::fs::write(&dest, &bytes).await {
        return error_result(format!("Failed to write {}: {}", dest.display(), e));
    }
    tracing::info!(asset = %file_name, dest = %dest.display(), "Asset imported");

    let imported = format!("Imported {}/{} ({} bytes).", subdir, file_name, bytes.len());
    let scan = scan_asset(&ctx, &project).await;
    let mut content = vec![Content::text(imported)];
    content.extend(scan.content);
    if scan.is_error == Some(true) {
        CallToolResult::error(content)
    } else {
        CallToolResult::success(content)
    }
}

pub(super) fn register(registry: &mut ToolRegistry) -> Result<(), ToolRegistryError> {
    registry.register(
        "import_assets",
        "Copy an asset into a project from an allow-listed URL or a local file, then rescan assets",
        json!({
            "type": "object",
            "properties": {
                "projectDir": { "type": "string" },
                "source": { "type": "string", "description": "http(s) URL on an allowed host, or a local file path" }
            },
            "required": ["projectDir", "source"],
            "additionalProperties": false
        }),
        Arc::new(FnHandler(import_assets)),
    )
}
