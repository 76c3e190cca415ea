//! `/sync/v2` batch semantics (§4.4) and `/detect-rename` (§4.5) over HTTP.

mod common;

use common::{TestServer, b64};

#[tokio::test]
async fn atomic_batch_stops_at_first_conflict_and_reports_original_head() {
    let server = TestServer::new();
    let (_, created) = server.post("/vault/notes/sync", serde_json::json!({ "path": "a.md", "content": b64("v1") })).await;
    let file_id = created["file_id"].as_str().unwrap().to_owned();
    let original_head = created["commit"].as_str().unwrap().to_owned();

    let (status, body) = server
        .post(
            "/vault/notes/sync/v2",
            serde_json::json!({
                "operations": [
                    { "type": "create", "path": "b.md", "content": b64("new") },
                    { "type": "create", "path": "a.md", "content": b64("conflict") },
                ],
                "atomic": true,
            }),
        )
        .await;
    assert_eq!(status, 400, "atomic batch that fails partway reports HTTP 400 (§8 S6)");
    assert_eq!(body["head_commit"], original_head);
    assert_eq!(body["results"][0]["success"], true);
    assert_eq!(body["results"][1]["success"], false);

    // b.md must not have been committed since the batch was atomic.
    let (status, _) = server.raw_get("/vault/notes/file/b.md").await;
    assert_eq!(status, 404);
    let _ = file_id;
}

#[tokio::test]
async fn non_atomic_batch_keeps_successful_operations() {
    let server = TestServer::new();
    server.post("/vault/notes/sync", serde_json::json!({ "path": "a.md", "content": b64("v1") })).await;

    let (status, body) = server
        .post(
            "/vault/notes/sync/v2",
            serde_json::json!({
                "operations": [
                    { "type": "create", "path": "b.md", "content": b64("new") },
                    { "type": "create", "path": "a.md", "content": b64("conflict") },
                ],
                "atomic": false,
            }),
        )
        .await;
    assert_eq!(status, 200, "non-atomic batches always report 200, partial failure is expected (§4.4)");
    assert_eq!(body["results"][0]["success"], true);
    assert_eq!(body["results"][1]["success"], false);

    let (status, bytes) = server.raw_get("/vault/notes/file/b.md").await;
    assert_eq!(status, 200);
    assert_eq!(bytes, b"new");
}

#[tokio::test]
async fn empty_batch_is_rejected_before_any_write() {
    let server = TestServer::new();
    let (status, body) = server
        .post("/vault/notes/sync/v2", serde_json::json!({ "operations": [], "atomic": true }))
        .await;
    assert_eq!(status, 400);
    assert!(body["error"].as_str().unwrap().contains("empty operation set"));

    // No vault state should have been touched.
    let (_, manifest) = server.get("/vault/notes/manifest").await;
    assert_eq!(manifest["files"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn detect_rename_resolves_by_content_hash() {
    let server = TestServer::new();
    server.post("/vault/notes/sync", serde_json::json!({ "path": "a.md", "content": b64("same content") })).await;

    let (status, _) =
        server.post("/vault/notes/rename", serde_json::json!({ "file_id": "", "old_path": "", "new_path": "" })).await;
    assert_eq!(status, 400, "malformed file_id must be rejected as a validation error");

    let hash = sha256_hex("same content");
    let (status, body) = server
        .post(
            "/vault/notes/detect-rename",
            serde_json::json!({ "missing_path": "old.md", "missing_hash": hash, "file_id": null }),
        )
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["found"], true);
    assert_eq!(body["new_path"], "a.md");
    assert_eq!(body["detection_method"], "hash_match");
}

#[tokio::test]
async fn detect_rename_reports_not_found_for_unknown_hash() {
    let server = TestServer::new();
    let (status, body) = server
        .post(
            "/vault/notes/detect-rename",
            serde_json::json!({ "missing_path": "old.md", "missing_hash": "deadbeef", "file_id": null }),
        )
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["found"], false);
}

fn sha256_hex(content: &str) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}
