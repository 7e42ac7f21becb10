//! End-to-end tool behaviour through the `/proxy/call` facade
//!
//! External commands go to a recording runner, so these tests need neither
//! akashic-cli nor node on the machine.

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use std::path::Path;
use std::sync::Arc;
use tower::ServiceExt; // for `oneshot`

use akashic_mcp::build_app_with_runner;
use akashic_mcp::test_utils::test_helpers::{workspace_config, RecordingRunner};
use akashic_mcp::tools::command::CommandOutput;

fn setup(workspace: &Path) -> (Router, Arc<RecordingRunner>) {
    let runner = Arc::new(RecordingRunner::new());
    let app = build_app_with_runner(workspace_config(workspace), runner.clone());
    (app.router, runner)
}

async fn call_tool(router: &Router, name: &str, arguments: Value) -> Value {
    let response = router
        .clone()
        .oneshot(
            Request::post("/proxy/call")
                .header("content-type", "application/json")
                .body(Body::from(
                    json!({ "name": name, "arguments": arguments }).to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn text(result: &Value, index: usize) -> &str {
    result["content"][index]["text"].as_str().unwrap_or_default()
}

#[tokio::test]
async fn test_minimal_project_then_read_it_back() {
    let workspace = tempfile::tempdir().unwrap();
    let (router, runner) = setup(workspace.path());

    let result = call_tool(&router, "init_project", json!({ "projectDir": "Coin-Game" })).await;
    assert_eq!(result["isError"], false, "{}", text(&result, 0));
    assert!(runner.calls().is_empty());

    let package: Value = serde_json::from_str(
        &std::fs::read_to_string(workspace.path().join("Coin-Game/package.json")).unwrap(),
    )
    .unwrap();
    assert_eq!(package["name"], "coin-game");

    let result = call_tool(&router, "read_project_files", json!({ "projectDir": "Coin-Game" })).await;
    let blocks: Vec<&str> = result["content"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|c| c["text"].as_str())
        .collect();
    assert!(blocks.iter().any(|b| b.starts_with("=== game.json ===")));
    assert!(blocks.iter().any(|b| b.starts_with("=== script/main.js ===")));
}

#[tokio::test]
async fn test_init_refuses_non_empty_target() {
    let workspace = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(workspace.path().join("taken")).unwrap();
    std::fs::write(workspace.path().join("taken/keep.txt"), "mine").unwrap();
    let (router, runner) = setup(workspace.path());

    let result = call_tool(
        &router,
        "init_project",
        json!({ "projectDir": "taken", "template": "javascript" }),
    )
    .await;

    assert_eq!(result["isError"], true);
    assert!(text(&result, 0).starts_with("Target directory is not empty"));
    assert!(runner.calls().is_empty());
}

#[tokio::test]
async fn test_named_template_runs_akashic_init() {
    let workspace = tempfile::tempdir().unwrap();
    let (router, runner) = setup(workspace.path());

    let result = call_tool(
        &router,
        "init_project",
        json!({ "projectDir": "shooter", "template": "typescript-shin-ichiba-ranking" }),
    )
    .await;

    assert_eq!(result["isError"], false, "{}", text(&result, 0));
    let calls = runner.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].program, "akashic");
    assert_eq!(calls[0].args, vec!["init", "-t", "typescript-shin-ichiba-ranking"]);
    assert_eq!(calls[0].cwd, workspace.path().join("shooter"));
}

#[tokio::test]
async fn test_extension_scope_is_enforced() {
    let workspace = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(workspace.path().join("game")).unwrap();
    let (router, runner) = setup(workspace.path());

    let rejected = call_tool(
        &router,
        "install_extension",
        json!({ "projectDir": "game", "package": "left-pad" }),
    )
    .await;
    assert_eq!(rejected["isError"], true);
    assert!(runner.calls().is_empty());

    let accepted = call_tool(
        &router,
        "install_extension",
        json!({ "projectDir": "game", "package": "@akashic-extension/akashic-label" }),
    )
    .await;
    assert_eq!(accepted["isError"], false, "{}", text(&accepted, 0));
    assert_eq!(
        runner.calls()[0].args,
        vec!["install", "@akashic-extension/akashic-label"]
    );
}

#[tokio::test]
async fn test_failed_command_reports_status_and_output() {
    let workspace = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(workspace.path().join("game")).unwrap();
    let (router, runner) = setup(workspace.path());
    runner.push_output(CommandOutput {
        status: Some(2),
        stdout: "scanning...".into(),
        stderr: "game.json not found".into(),
    });

    let result = call_tool(&router, "scan_assets", json!({ "projectDir": "game" })).await;

    assert_eq!(result["isError"], true);
    let report = text(&result, 0);
    assert!(report.contains("exit status 2"), "{}", report);
    assert!(report.contains("scanning..."));
    assert!(report.contains("game.json not found"));
}

#[tokio::test]
async fn test_local_asset_import_copies_and_rescans() {
    let workspace = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(workspace.path().join("game")).unwrap();
    std::fs::write(workspace.path().join("player.png"), b"\x89PNG").unwrap();
    let (router, runner) = setup(workspace.path());

    let result = call_tool(
        &router,
        "import_assets",
        json!({ "projectDir": "game", "source": "player.png" }),
    )
    .await;

    assert_eq!(result["isError"], false, "{}", text(&result, 0));
    assert_eq!(text(&result, 0), "Imported image/player.png (4 bytes).");
    assert!(workspace.path().join("game/image/player.png").exists());
    assert_eq!(runner.calls()[0].args, vec!["scan", "asset"]);
}

#[tokio::test]
async fn test_paths_outside_the_workspace_are_rejected() {
    let workspace = tempfile::tempdir().unwrap();
    let (router, runner) = setup(workspace.path());

    for (tool, arguments) in [
        ("create_file", json!({ "path": "../../etc/passwd", "content": "x" })),
        ("create_file", json!({ "path": "~/profile", "content": "x" })),
        ("scan_assets", json!({ "projectDir": "games/../../outside" })),
        (
            "write_project_readme",
            json!({ "projectDir": "../up", "title": "t", "summary": "s" }),
        ),
    ] {
        let result = call_tool(&router, tool, arguments).await;
        assert_eq!(result["isError"], true, "{} should be rejected", tool);
    }

    assert!(runner.calls().is_empty());
}
