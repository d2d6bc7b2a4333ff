//! Shared test harness: an in-process server over a temporary root.

#![allow(dead_code)]

use filedock_httpd::{FiledockServer, ServerConfig};
use std::path::PathBuf;

pub struct TestServer {
    pub server: FiledockServer,
    pub root: tempfile::TempDir,
    pub client: reqwest::Client,
}

impl TestServer {
    pub async fn start() -> Self {
        Self::start_with_secret(None).await
    }

    pub async fn start_with_secret(secret: Option<&str>) -> Self {
        let root = tempfile::tempdir().expect("create temp root");
        let config = ServerConfig {
            root: root.path().to_path_buf(),
            secret: secret.map(str::to_string),
            ..ServerConfig::default()
        };
        let server = FiledockServer::start(config).await.expect("start server");
        Self {
            server,
            root,
            client: reqwest::Client::new(),
        }
    }

    /// Absolute path of a relative entry under the test root.
    pub fn path(&self, rel: &str) -> PathBuf {
        self.root.path().join(rel)
    }

    /// Write a file under the root, creating parent directories.
    pub fn write(&self, rel: &str, contents: &[u8]) {
        let path = self.path(rel);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("create parents");
        }
        std::fs::write(path, contents).expect("write fixture");
    }

    pub fn read(&self, rel: &str) -> Vec<u8> {
        std::fs::read(self.path(rel)).expect("read fixture")
    }

    pub fn mkdir(&self, rel: &str) {
        std::fs::create_dir_all(self.path(rel)).expect("mkdir fixture");
    }

    /// Full URL for the given query string.
    pub fn url(&self, query: &str) -> String {
        format!("{}/?{query}", self.server.url())
    }

    /// POST a JSON action body.
    pub async fn action(&self, action: &str, body: serde_json::Value) -> reqwest::Response {
        self.client
            .post(self.url(&format!("action={action}")))
            .json(&body)
            .send()
            .await
            .expect("send request")
    }

    /// GET file contents, optionally with extra headers.
    pub async fn get_file(&self, rel: &str) -> reqwest::Response {
        self.client
            .get(self.url(&format!("file={rel}")))
            .send()
            .await
            .expect("send request")
    }
}
