//! Drives the HTTP tool API end to end against a temporary archive.

use convo_index::config::Config;
use convo_index::index::SearchIndex;
use convo_index::server::run_server;
use convo_index::tools::{ToolContext, ToolRegistry};
use convo_index::workspace::Workspace;
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;

fn find_free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

async fn wait_for_server(port: u16) {
    let client = reqwest::Client::new();
    let url = format!("http://127.0.0.1:{}/health", port);
    for _ in 0..50 {
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        if let Ok(resp) = client.get(&url).send().await {
            if resp.status().is_success() {
                return;
            }
        }
    }
    panic!("Server did not become ready within 5 seconds");
}

fn setup(tmp: &TempDir) -> (PathBuf, PathBuf) {
    let archive = tmp.path().join("archive");
    std::fs::create_dir_all(&archive).unwrap();
    std::fs::write(
        archive.join("deploy.json"),
        json!({
            "title": "Deploying with firebase",
            "metadata": { "conversation_id": "deploy", "created_at": "2024-03-01", "project": "site" },
            "messages": [
                { "role": "user", "content": "how do I ship the marketing site?" },
                { "role": "assistant", "content": "Run `firebase deploy --only hosting` from the repo root." }
            ]
        })
        .to_string(),
    )
    .unwrap();

    let projects = tmp.path().join("projects");
    std::fs::create_dir_all(projects.join("site")).unwrap();
    std::fs::write(projects.join("site").join("package.json"), "{}").unwrap();
    std::fs::write(
        projects.join("site").join("deploy.sh"),
        "#!/bin/sh\nfirebase deploy --only hosting\n",
    )
    .unwrap();

    (archive, projects)
}

/// Starts the server without building, so the first calls see an
/// uninitialized index.
async fn start(tmp: &TempDir) -> (u16, tokio::task::JoinHandle<()>) {
    let (archive, projects) = setup(tmp);
    let port = find_free_port();

    let mut cfg = Config::minimal();
    cfg.server.bind = format!("127.0.0.1:{}", port);
    cfg.workspace.projects_root = Some(projects);
    cfg.workspace.file_types = vec!["sh".to_string(), "json".to_string()];

    let index = Arc::new(SearchIndex::open(&cfg).await.unwrap());
    let ctx = ToolContext::new(index, Workspace::from_config(&cfg.workspace), archive);
    let tools = Arc::new(ToolRegistry::with_builtins());

    let handle = tokio::spawn(async move {
        run_server(ctx, tools).await.ok();
    });
    wait_for_server(port).await;
    (port, handle)
}

#[tokio::test]
async fn test_tool_list_in_registry_order() {
    let tmp = TempDir::new().unwrap();
    let (port, handle) = start(&tmp).await;

    let client = reqwest::Client::new();
    let body: Value = client
        .get(format!("http://127.0.0.1:{}/tools/list", port))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    let tools = body["tools"].as_array().unwrap();
    let names: Vec<&str> = tools.iter().map(|t| t["name"].as_str().unwrap()).collect();
    assert_eq!(
        names,
        vec![
            "search_conversations",
            "get_conversation_snippet",
            "search_projects",
            "get_project_overview",
            "find_command",
            "build_search_index",
            "get_search_stats",
        ]
    );
    let build = tools.iter().find(|t| t["name"] == "build_search_index").unwrap();
    assert_eq!(build["read_only"], false);
    assert_eq!(tools[0]["parameters"]["type"], "object");

    handle.abort();
}

#[tokio::test]
async fn test_build_then_query_over_http() {
    let tmp = TempDir::new().unwrap();
    let (port, handle) = start(&tmp).await;
    let client = reqwest::Client::new();
    let url = |tool: &str| format!("http://127.0.0.1:{}/tools/{}", port, tool);

    // Queries before the build are rejected with 409.
    let resp = client
        .post(url("search_conversations"))
        .json(&json!({ "query": "firebase" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 409);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "not_initialized");

    let resp = client
        .post(url("build_search_index"))
        .json(&json!({}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["result"]["stats"]["conversations"], 1);
    assert_eq!(body["result"]["stats"]["initialized"], true);

    let body: Value = client
        .post(url("search_conversations"))
        .json(&json!({ "query": "firebase" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["result"]["count"], 1);

    let body: Value = client
        .post(url("find_command"))
        .json(&json!({ "query": "firebase deploy" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["result"]["strategy"], "full_text");
    assert_eq!(
        body["result"]["results"][0]["command"],
        "firebase deploy --only hosting"
    );

    let resp = client
        .post(url("get_conversation_snippet"))
        .json(&json!({ "conversation_id": "missing" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);

    let resp = client
        .post(url("get_conversation_snippet"))
        .json(&json!({ "conversation_id": "deploy", "message_count": 0 }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "bad_request");

    handle.abort();
}

#[tokio::test]
async fn test_workspace_tools_and_unknown_tool() {
    let tmp = TempDir::new().unwrap();
    let (port, handle) = start(&tmp).await;
    let client = reqwest::Client::new();
    let url = |tool: &str| format!("http://127.0.0.1:{}/tools/{}", port, tool);

    let body: Value = client
        .post(url("get_project_overview"))
        .json(&json!({ "project_name": "site" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["result"]["technologies"], json!(["Node.js"]));

    let resp = client
        .post(url("search_projects"))
        .json(&json!({ "query": "firebase" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let resp = client
        .post(url("nonexistent"))
        .json(&json!({}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);

    handle.abort();
}
