//! Shared test infrastructure for the HTTP/WS integration tests.
//!
//! Provides [`TestServer`], a [`vault_sync::http::router`] bound to a
//! registry rooted in a fresh temp directory, driven with
//! `tower::ServiceExt::oneshot` rather than a real listening socket.

#![allow(dead_code)]

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use base64::Engine as _;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;
use vault_sync::registry::VaultRegistry;

pub struct TestServer {
    router: Router,
    _root: TempDir,
}

impl TestServer {
    pub fn new() -> Self {
        let root = TempDir::new().expect("tempdir");
        let registry = Arc::new(VaultRegistry::new(root.path().to_path_buf()));
        let router = vault_sync::http::router(registry);
        Self { router, _root: root }
    }

    pub async fn request(&self, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let body = match body {
            Some(v) => Body::from(serde_json::to_vec(&v).expect("serialize body")),
            None => Body::empty(),
        };
        let req = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(body)
            .expect("build request");

        let response = self.router.clone().oneshot(req).await.expect("oneshot request");
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.expect("read body");
        let json = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).unwrap_or(Value::Null) };
        (status, json)
    }

    pub async fn get(&self, uri: &str) -> (StatusCode, Value) {
        self.request("GET", uri, None).await
    }

    pub async fn post(&self, uri: &str, body: Value) -> (StatusCode, Value) {
        self.request("POST", uri, Some(body)).await
    }

    pub async fn delete(&self, uri: &str) -> (StatusCode, Value) {
        self.request("DELETE", uri, None).await
    }

    pub async fn raw_get(&self, uri: &str) -> (StatusCode, Vec<u8>) {
        let req = Request::builder().method("GET").uri(uri).body(Body::empty()).expect("build request");
        let response = self.router.clone().oneshot(req).await.expect("oneshot request");
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.expect("read body");
        (status, bytes.to_vec())
    }
}

pub fn b64(s: &str) -> String {
    base64::engine::general_purpose::STANDARD.encode(s.as_bytes())
}
