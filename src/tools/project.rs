//! Project lifecycle tools backed by akashic-cli, node and the formatter

use super::command::{run_to_result, CommandSpec};
use super::paths::{check_relative_pattern, display_relative, resolve_project_path, resolve_workspace_path};
use super::{error_result, parse_args, text_result, FnHandler, ToolContext, ToolRegistry, ToolRegistryError};
use once_cell::sync::Lazy;
use regex::Regex;
use rmcp::model::{CallToolResult, JsonObject};
use serde::Deserialize;
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use walkdir::WalkDir;

pub const LOCAL_MINIMAL_TEMPLATE: &str = "local-minimal";
pub const EXTENSION_PREFIXES: [&str; 2] = ["@akashic/", "@akashic-extension/"];

static TEMPLATE_NAME: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[a-z0-9-]+$").unwrap());

/// Resolves `projectDir` and requires it to be an existing directory
pub(crate) fn existing_project(ctx: &ToolContext, raw: &str) -> Result<PathBuf, CallToolResult> {
    let project = resolve_workspace_path(&ctx.config.workspace_root, raw)
        .map_err(|e| error_result(e.to_string()))?;
    if !project.is_dir() {
        return Err(error_result(format!(
            "Project directory not found: {}",
            project.display()
        )));
    }
    Ok(project)
}

fn command(configured: &str, cwd: &Path) -> Result<CommandSpec, CallToolResult> {
    CommandSpec::parse(configured, cwd).map_err(|e| error_result(e.to_string()))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProjectArgs {
    project_dir: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InitArgs {
    project_dir: String,
    template: Option<String>,
}

fn minimal_files(name: &str) -> Vec<(&'static str, String)> {
    let game_json = json!({
        "width": 1280,
        "height": 720,
        "fps": 30,
        "main": "./script/main.js",
        "assets": {
            "main": { "type": "script", "path": "script/main.js", "global": true }
        },
        "environment": { "sandbox-runtime": "3" }
    });
    let package_json = json!({
        "name": name,
        "private": true,
        "version": "0.1.0",
        "scripts": {
            "start": "akashic sandbox .",
            "scan": "akashic scan asset"
        }
    });
    let main_js = "function main(param) {\n\
        \tconst scene = new g.Scene({ game: g.game });\n\
        \tscene.onLoad.add(() => {\n\
        \t\tconst rect = new g.FilledRect({\n\
        \t\t\tscene: scene,\n\
        \t\t\tcssColor: \"#ff6347\",\n\
        \t\t\twidth: 64,\n\
        \t\t\theight: 64\n\
        \t\t});\n\
        \t\tscene.append(rect);\n\
        \t});\n\
        \tg.game.pushScene(scene);\n\
        }\n\
        \n\
        module.exports = main;\n";

    vec![
        ("game.json", format!("{:#}\n", game_json)),
        ("package.json", format!("{:#}\n", package_json)),
        ("script/main.js", main_js.to_string()),
    ]
}

async fn init_project(ctx: ToolContext, args: JsonObject) -> CallToolResult {
    let args: InitArgs = match parse_args(args) {
        Ok(args) => args,
        Err(result) => return result,
    };
    let target = match resolve_workspace_path(&ctx.config.workspace_root, &args.project_dir) {
        Ok(path) => path,
        Err(e) => return error_result(e.to_string()),
    };

    if target.exists() {
        let empty = std::fs::read_dir(&target)
            .map(|mut entries| entries.next().is_none())
            .unwrap_or(false);
        if !empty {
            return error_result(format!(
                "Target directory is not empty: {}",
                target.display()
            ));
        }
    }

    let template = args
        .template
        .filter(|t| !t.trim().is_empty())
        .unwrap_or_else(|| LOCAL_MINIMAL_TEMPLATE.to_string());
    if template != LOCAL_MINIMAL_TEMPLATE && !TEMPLATE_NAME.is_match(&template) {
        return error_result(format!("Invalid template name: {}", template));
    }

    if let Err(e) = tokio::fs::create_dir_all(&target).await {
        return error_result(format!("Failed to create {}: {}", target.display(), e));
    }

    if template != LOCAL_MINIMAL_TEMPLATE {
        let spec = match command(&ctx.config.akashic_cli, &target) {
            Ok(spec) => spec.args(["init", "-t", template.as_str()]),
            Err(result) => return result,
        };
        return run_to_result(ctx.runner.as_ref(), spec).await;
    }

    let name = target
        .file_name()
        .map(|n| n.to_string_lossy().to_lowercase())
        .unwrap_or_else(|| "akashic-game".to_string());
    for (relative, content) in minimal_files(&name) {
        let path = target.join(relative);
        if let Some(parent) = path.parent() {
            if let Err(e) = tokio::fs::create_dir_all(parent).await {
                return error_result(format!("Failed to create {}: {}", parent.display(), e));
            }
        }
        if let Err(e) = tokio::fs::write(&path, content).await {
            return error_result(format!("Failed to write {}: {}", path.display(), e));
        }
    }

    text_result(format!(
        "Initialized {} from the {} template (game.json, package.json, script/main.js).",
        target.display(),
        LOCAL_MINIMAL_TEMPLATE
    ))
}

pub(crate) async fn scan_asset(ctx: &ToolContext, project: &Path) -> CallToolResult {
    match command(&ctx.config.akashic_cli, project) {
        Ok(spec) => run_to_result(ctx.runner.as_ref(), spec.args(["scan", "asset"])).await,
        Err(result) => result,
    }
}

async fn scan_assets(ctx: ToolContext, args: JsonObject) -> CallToolResult {
    let args: ProjectArgs = match parse_args(args) {
        Ok(args) => args,
        Err(result) => return result,
    };
    match existing_project(&ctx, &args.project_dir) {
        Ok(project) => scan_asset(&ctx, &project).await,
        Err(result) => result,
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InstallArgs {
    project_dir: String,
    package: String,
}

async fn install_extension(ctx: ToolContext, args: JsonObject) -> CallToolResult {
    let args: InstallArgs = match parse_args(args) {
        Ok(args) => args,
        Err(result) => return result,
    };

    let package = args.package.trim();
    let approved = EXTENSION_PREFIXES
        .iter()
        .any(|prefix| package.len() > prefix.len() && package.starts_with(prefix));
    if !approved || package.chars().any(char::is_whitespace) {
        return error_result(format!(
            "Package must start with {}: {}",
            EXTENSION_PREFIXES.join(" or "),
            package
        ));
    }

    let project = match existing_project(&ctx, &args.project_dir) {
        Ok(project) => project,
        Err(result) => return result,
    };
    match command(&ctx.config.akashic_cli, &project) {
        Ok(spec) => run_to_result(ctx.runner.as_ref(), spec.args(["install", package])).await,
        Err(result) => result,
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HeadlessArgs {
    project_dir: String,
    script: Option<String>,
}

async fn run_headless_test(ctx: ToolContext, args: JsonObject) -> CallToolResult {
    let args: HeadlessArgs = match parse_args(args) {
        Ok(args) => args,
        Err(result) => return result,
    };
    let project = match existing_project(&ctx, &args.project_dir) {
        Ok(project) => project,
        Err(result) => return result,
    };

    let script = args.script.unwrap_or_else(|| "test/headless.js".to_string());
    let script_path = match resolve_project_path(&project, &script) {
        Ok(path) => path,
        Err(e) => return error_result(e.to_string()),
    };
    if !script_path.is_file() {
        return error_result(format!("Headless test script not found: {}", script));
    }

    match command(&ctx.config.node_bin, &project) {
        Ok(spec) => {
            let spec = spec.arg(display_relative(&project, &script_path));
            run_to_result(ctx.runner.as_ref(), spec).await
        }
        Err(result) => result,
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FormatArgs {
    project_dir: String,
    pattern: Option<String>,
}

async fn format_sources(ctx: ToolContext, args: JsonObject) -> CallToolResult {
    let args: FormatArgs = match parse_args(args) {
        Ok(args) => args,
        Err(result) => return result,
    };
    let pattern = args.pattern.unwrap_or_else(|| "script/**/*.js".to_string());
    if let Err(e) = check_relative_pattern(&pattern) {
        return error_result(e.to_string());
    }
    let project = match existing_project(&ctx, &args.project_dir) {
        Ok(project) => project,
        Err(result) => return result,
    };

    match command(&ctx.config.formatter, &project) {
        Ok(spec) => run_to_result(ctx.runner.as_ref(), spec.args(["--write", pattern.as_str()])).await,
        Err(result) => result,
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConvertArgs {
    project_dir: String,
    input: String,
}

async fn convert_audio(ctx: ToolContext, args: JsonObject) -> CallToolResult {
    let args: ConvertArgs = match parse_args(args) {
        Ok(args) => args,
        Err(result) => return result,
    };
    let project = match existing_project(&ctx, &args.project_dir) {
        Ok(project) => project,
        Err(result) => return result,
    };
    let input = match resolve_project_path(&project, &args.input) {
        Ok(path) => path,
        Err(e) => return error_result(e.to_string()),
    };
    if !input.exists() {
        return error_result(format!("Audio input not found: {}", args.input));
    }

    match command(&ctx.config.audio_converter, &project) {
        Ok(spec) => {
            let spec = spec.arg(display_relative(&project, &input));
            run_to_result(ctx.runner.as_ref(), spec).await
        }
        Err(result) => result,
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SyntaxArgs {
    project_dir: String,
    files: Option<Vec<String>>,
}

fn default_scripts(project: &Path) -> Vec<String> {
    WalkDir::new(project.join("script"))
        .sort_by_file_name()
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
        .filter(|e| e.path().extension().and_then(|x| x.to_str()) == Some("js"))
        .map(|e| display_relative(project, e.path()))
        .collect()
}

async fn check_syntax(ctx: ToolContext, args: JsonObject) -> CallToolResult {
    let args: SyntaxArgs = match parse_args(args) {
        Ok(args) => args,
        Err(result) => return result,
    };
    let project = match existing_project(&ctx, &args.project_dir) {
        Ok(project) => project,
        Err(result) => return result,
    };

    let files = match args.files {
        Some(files) => {
            let mut resolved = Vec::with_capacity(files.len());
            for file in &files {
                match resolve_project_path(&project, file) {
                    Ok(path) => resolved.push(display_relative(&project, &path)),
                    Err(e) => return error_result(e.to_string()),
                }
            }
            resolved
        }
        None => default_scripts(&project),
    };
    if files.is_empty() {
        return text_result("No script files to check.");
    }

    let mut lines = Vec::with_capacity(files.len());
    let mut failures = 0;
    for file in &files {
        let spec = match command(&ctx.config.node_bin, &project) {
            Ok(spec) => spec.args(["--check", file.as_str()]),
            Err(result) => return result,
        };
        match ctx.runner.run(spec).await {
            Ok(output) if output.success() => lines.push(format!("OK   {}", file)),
            Ok(output) => {
                failures += 1;
                lines.push(format!("FAIL {}\n{}", file, output.stderr.trim_end()));
            }
            Err(e) => {
                failures += 1;
                lines.push(format!("FAIL {}\n{}", file, e));
            }
        }
    }

    let report = format!(
        "Checked {} file(s), {} with errors.\n\n{}",
        files.len(),
        failures,
        lines.join("\n")
    );
    if failures > 0 {
        error_result(report)
    } else {
        text_result(report)
    }
}

fn project_schema() -> serde_json::Value {
    json!({
        "type": "object",
        "properties": {
            "projectDir": { "type": "string" }
        },
        "required": ["projectDir"],
        "additionalProperties": false
    })
}

pub(super) fn register(registry: &mut ToolRegistry) -> Result<(), ToolRegistryError> {
    registry.register(
        "init_project",
        "Create a new akashic game project from a template (default: local-minimal)",
        json!({
            "type": "object",
            "properties": {
                "projectDir": { "type": "string", "description": "Target directory; must be absent or empty" },
                "template": { "type": "string", "description": "akashic init template name, or local-minimal" }
            },
            "required": ["projectDir"],
            "additionalProperties": false
        }),
        Arc::new(FnHandler(init_project)),
    )?;

    registry.register(
        "scan_assets",
        "Run `akashic scan asset` to refresh game.json asset entries",
        project_schema(),
        Arc::new(FnHandler(scan_assets)),
    )?;

    registry.register(
        "install_extension",
        "Install an @akashic/ or @akashic-extension/ package into a project",
        json!({
            "type": "object",
            "properties": {
                "projectDir": { "type": "string" },
                "package": { "type": "string", "description": "Scoped package name, optionally with @version" }
            },
            "required": ["projectDir", "package"],
            "additionalProperties": false
        }),
        Arc::new(FnHandler(install_extension)),
    )?;

    registry.register(
        "run_headless_test",
        "Run a headless scene/entity validation script with node",
        json!({
            "type": "object",
            "properties": {
                "projectDir": { "type": "string" },
                "script": { "type": "string", "description": "Script path inside the project (default test/headless.js)" }
            },
            "required": ["projectDir"],
            "additionalProperties": false
        }),
        Arc::new(FnHandler(run_headless_test)),
    )?;

    registry.register(
        "format_sources",
        "Format project sources in place",
        json!({
            "type": "object",
            "properties": {
                "projectDir": { "type": "string" },
                "pattern": { "type": "string", "description": "Glob inside the project (default script/**/*.js)" }
            },
            "required": ["projectDir"],
            "additionalProperties": false
        }),
        Arc::new(FnHandler(format_sources)),
    )?;

    registry.register(
        "convert_audio",
        "Convert an audio file to the formats akashic needs (ogg/m4a/aac)",
        json!({
            "type": "object",
            "properties": {
                "projectDir": { "type": "string" },
                "input": { "type": "string", "description": "Audio file inside the project" }
            },
            "required": ["projectDir", "input"],
            "additionalProperties": false
        }),
        Arc::new(FnHandler(convert_audio)),
    )?;

    registry.register(
        "check_syntax",
        "Check JavaScript syntax with `node --check`",
        json!({
            "type": "object",
            "properties": {
                "projectDir": { "type": "string" },
                "files": {
                    "type": "array",
                    "items": { "type": "string" },
                    "description": "Files inside the project (default: every .js under script/)"
                }
            },
            "required": ["projectDir"],
            "additionalProperties": false
        }),
        Arc::new(FnHandler(check_syntax)),
    )
}
