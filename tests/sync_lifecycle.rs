//! End-to-end tests over the HTTP surface: create, fast-forward modify,
//! conflicting merge, rename, and delete (spec §8 scenarios S1-S3, S5).

mod common;

use common::{TestServer, b64};

#[tokio::test]
async fn create_then_read_round_trips_content() {
    let server = TestServer::new();

    let (status, body) = server
        .post("/vault/notes/sync", serde_json::json!({ "path": "a.md", "content": b64("hello") }))
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["has_conflicts"], false);
    let commit = body["commit"].as_str().unwrap().to_owned();
    assert!(!commit.is_empty());

    let (status, bytes) = server.raw_get("/vault/notes/file/a.md").await;
    assert_eq!(status, 200);
    assert_eq!(bytes, b"hello");
}

#[tokio::test]
async fn create_at_existing_path_conflicts() {
    let server = TestServer::new();
    let (status, _) = server.post("/vault/notes/sync", serde_json::json!({ "path": "a.md", "content": b64("v1") })).await;
    assert_eq!(status, 200);

    let (status, body) = server.post("/vault/notes/sync", serde_json::json!({ "path": "a.md", "content": b64("v2") })).await;
    assert_eq!(status, 400);
    assert!(body["error"].as_str().unwrap().contains("conflict"));
}

#[tokio::test]
async fn fast_forward_modify_advances_head() {
    let server = TestServer::new();
    let (_, created) = server.post("/vault/notes/sync", serde_json::json!({ "path": "a.md", "content": b64("v1") })).await;
    let file_id = created["file_id"].as_str().unwrap();
    let base_commit = created["commit"].as_str().unwrap();

    let (status, body) = server
        .post(
            "/vault/notes/sync/v2",
            serde_json::json!({
                "operations": [{
                    "type": "modify",
                    "file_id": file_id,
                    "content": b64("v2"),
                    "base_commit": base_commit,
                }],
                "atomic": true,
            }),
        )
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["results"][0]["success"], true);

    let (_, bytes) = server.raw_get("/vault/notes/file/a.md").await;
    assert_eq!(bytes, b"v2");
}

#[tokio::test]
async fn concurrent_non_conflicting_edits_merge() {
    let server = TestServer::new();
    let (_, created) =
        server.post("/vault/notes/sync", serde_json::json!({ "path": "a.md", "content": b64("line1\nline2\nline3\n") })).await;
    let base_commit = created["commit"].as_str().unwrap().to_owned();

    let (status, body) = server
        .post(
            "/vault/notes/sync",
            serde_json::json!({ "path": "a.md", "content": b64("line1 EDITED\nline2\nline3\n"), "base_commit": base_commit }),
        )
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["has_conflicts"], false);

    let (status, body) = server
        .post(
            "/vault/notes/sync",
            serde_json::json!({ "path": "a.md", "content": b64("line1\nline2\nline3 EDITED\n"), "base_commit": base_commit }),
        )
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["merged"], true);
    assert_eq!(body["has_conflicts"], false);

    let (_, bytes) = server.raw_get("/vault/notes/file/a.md").await;
    let text = String::from_utf8(bytes).unwrap();
    assert!(text.contains("line1 EDITED"));
    assert!(text.contains("line3 EDITED"));
}

#[tokio::test]
async fn conflicting_edits_report_conflict_markers() {
    let server = TestServer::new();
    let (_, created) = server.post("/vault/notes/sync", serde_json::json!({ "path": "a.md", "content": b64("line1\n") })).await;
    let base_commit = created["commit"].as_str().unwrap().to_owned();

    server.post("/vault/notes/sync", serde_json::json!({ "path": "a.md", "content": b64("alice\n"), "base_commit": base_commit })).await;

    let (status, body) = server
        .post("/vault/notes/sync", serde_json::json!({ "path": "a.md", "content": b64("bob\n"), "base_commit": base_commit }))
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["has_conflicts"], true);
    let merged = body["merged_content"].as_str().expect("merged_content present on conflict");
    assert!(merged.contains("<<<<<<<"));
}

#[tokio::test]
async fn rename_preserves_file_id_and_content() {
    let server = TestServer::new();
    let (_, created) = server.post("/vault/notes/sync", serde_json::json!({ "path": "a.md", "content": b64("hi") })).await;
    let file_id = created["file_id"].as_str().unwrap().to_owned();

    let (status, body) = server
        .post(
            "/vault/notes/rename",
            serde_json::json!({ "file_id": file_id, "old_path": "a.md", "new_path": "b.md" }),
        )
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["file_id"], file_id);

    let (status, bytes) = server.raw_get("/vault/notes/file/b.md").await;
    assert_eq!(status, 200);
    assert_eq!(bytes, b"hi");

    let (status, _) = server.raw_get("/vault/notes/file/a.md").await;
    assert_eq!(status, 404);
}

#[tokio::test]
async fn delete_removes_file_from_manifest_and_content() {
    let server = TestServer::new();
    server.post("/vault/notes/sync", serde_json::json!({ "path": "a.md", "content": b64("hi") })).await;
    server.post("/vault/notes/sync", serde_json::json!({ "path": "b.md", "content": b64("keep") })).await;

    let (status, body) = server.delete("/vault/notes/file/a.md").await;
    assert_eq!(status, 200);
    assert_eq!(body["success"], true);

    let (status, _) = server.raw_get("/vault/notes/file/a.md").await;
    assert_eq!(status, 404);

    let (_, manifest) = server.get("/vault/notes/manifest").await;
    let files = manifest["files"].as_array().unwrap();
    assert!(files.iter().all(|f| f["path"] != "a.md"));
    assert!(files.iter().any(|f| f["path"] == "b.md"));
}
