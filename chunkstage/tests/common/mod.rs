//! Shared harness for router-level tests.

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use chunkstage::api::create_router;
use chunkstage::config::Config;
use chunkstage::storage::driver::filesystem::FilesystemStorage;
use chunkstage::utils::state::AppState;
use rand::RngCore;
use serde_json::Value;
use sha2::{Digest, Sha256};
use tempfile::TempDir;
use tower::ServiceExt;

pub const BOUNDARY: &str = "----chunkstage-test-boundary";

pub struct TestServer {
    pub router: Router,
    pub root: PathBuf,
    _dir: TempDir,
}

impl TestServer {
    pub fn new() -> Self {
        Self::with_config(|_| {})
    }

    pub fn with_config(tweak: impl FnOnce(&mut Config)) -> Self {
        let dir = tempfile::tempdir().expect("create temp dir");
        let mut config = Config::for_root(dir.path());
        tweak(&mut config);
        let storage = Arc::new(FilesystemStorage::new(dir.path()));
        let state = Arc::new(AppState::with_storage(config, storage));
        TestServer {
            router: create_router(state),
            root: dir.path().to_path_buf(),
            _dir: dir,
        }
    }

    pub fn staging_dir(&self, hash: &str) -> PathBuf {
        self.root.join(format!("chunkDir_{hash}"))
    }

    pub fn artifact_path(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    pub async fn send(&self, request: Request<Body>) -> (StatusCode, Vec<u8>) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, body.to_vec())
    }

    pub async fn json(&self, uri: &str, body: Value) -> (StatusCode, Value) {
        let request = Request::builder()
            .method("POST")
            .uri(uri)
            .header("Content-Type", "application/json")
            .body(Body::from(serde_json::to_vec(&body).unwrap()))
            .unwrap();
        let (status, bytes) = self.send(request).await;
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, json)
    }

    pub async fn verify(&self, file_hash: &str, filename: &str) -> (StatusCode, Value) {
        self.json(
            "/verify",
            serde_json::json!({ "fileHash": file_hash, "filename": filename }),
        )
        .await
    }

    pub async fn merge(&self, file_hash: &str, filename: &str, size: u64) -> (StatusCode, Value) {
        self.json(
            "/merge",
            serde_json::json!({ "fileHash": file_hash, "filename": filename, "size": size }),
        )
        .await
    }

    pub async fn upload(
        &self,
        file_hash: &str,
        index: usize,
        filename: &str,
        data: &[u8],
    ) -> (StatusCode, String) {
        let chunk_name = format!("{file_hash}-{index}");
        let body = MultipartBody::new()
            .text("hash", &chunk_name)
            .text("fileHash", file_hash)
            .text("filename", filename)
            .file("chunk", &chunk_name, data)
            .finish();
        self.upload_raw(body).await
    }

    pub async fn upload_raw(&self, body: Vec<u8>) -> (StatusCode, String) {
        let request = Request::builder()
            .method("POST")
            .uri("/upload")
            .header(
                "Content-Type",
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap();
        let (status, bytes) = self.send(request).await;
        (status, String::from_utf8_lossy(&bytes).into_owned())
    }
}

/// Hand-built `multipart/form-data` body.
#[derive(Default)]
pub struct MultipartBody {
    buf: Vec<u8>,
}

impl MultipartBody {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(mut self, name: &str, value: &str) -> Self {
        self.buf.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            )
            .as_bytes(),
        );
        self
    }

    pub fn file(mut self, name: &str, filename: &str, data: &[u8]) -> Self {
        self.buf.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"; filename=\"{filename}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
            )
            .as_bytes(),
        );
        self.buf.extend_from_slice(data);
        self.buf.extend_from_slice(b"\r\n");
        self
    }

    pub fn finish(mut self) -> Vec<u8> {
        self.buf
            .extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
        self.buf
    }
}

pub fn random_bytes(len: usize) -> Vec<u8> {
    let mut data = vec![0u8; len];
    rand::rng().fill_bytes(&mut data);
    data
}

pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}
