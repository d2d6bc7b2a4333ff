//! End-to-end tests for file serving: full bodies, byte ranges and
//! caching validators.

mod common;

use common::TestServer;
use reqwest::header::{CONTENT_RANGE, CONTENT_TYPE, ETAG, IF_NONE_MATCH, RANGE};

fn body_100() -> Vec<u8> {
    (0u8..100).collect()
}

#[tokio::test]
async fn full_body_with_default_mime() {
    let srv = TestServer::start().await;
    srv.write("data.bin", &body_100());

    let resp = srv.get_file("data.bin").await;
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.headers()[CONTENT_TYPE], "application/octet-stream");
    assert!(resp.headers().contains_key(ETAG));
    assert_eq!(resp.bytes().await.unwrap().as_ref(), body_100());
}

#[tokio::test]
async fn mime_query_parameter_sets_content_type() {
    let srv = TestServer::start().await;
    srv.write("notes.txt", b"hello");

    let resp = srv
        .client
        .get(srv.url("file=notes.txt&mime=text/plain"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.headers()[CONTENT_TYPE], "text/plain");
}

#[tokio::test]
async fn explicit_range_returns_exact_window() {
    let srv = TestServer::start().await;
    srv.write("data.bin", &body_100());

    let resp = srv
        .client
        .get(srv.url("file=data.bin"))
        .header(RANGE, "bytes=0-9")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 206);
    assert_eq!(resp.headers()[CONTENT_RANGE], "bytes 0-9/100");
    assert_eq!(resp.content_length(), Some(10));
    assert_eq!(resp.bytes().await.unwrap().as_ref(), &body_100()[0..10]);
}

#[tokio::test]
async fn suffix_range_returns_tail() {
    let srv = TestServer::start().await;
    srv.write("data.bin", &body_100());

    let resp = srv
        .client
        .get(srv.url("file=data.bin"))
        .header(RANGE, "bytes=-10")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 206);
    assert_eq!(resp.headers()[CONTENT_RANGE], "bytes 90-99/100");
    assert_eq!(resp.bytes().await.unwrap().as_ref(), &body_100()[90..]);
}

#[tokio::test]
async fn open_range_past_eof_is_416() {
    let srv = TestServer::start().await;
    srv.write("data.bin", &body_100());

    let resp = srv
        .client
        .get(srv.url("file=data.bin"))
        .header(RANGE, "bytes=200-")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 416);
}

#[tokio::test]
async fn malformed_range_is_400() {
    let srv = TestServer::start().await;
    srv.write("data.bin", &body_100());

    for header in ["bytes=", "bytes=a-b", "chunks=0-9", "bytes=10-5"] {
        let resp = srv
            .client
            .get(srv.url("file=data.bin"))
            .header(RANGE, header)
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 400, "header {header:?}");
    }
}

#[tokio::test]
async fn matching_validator_is_304_with_empty_body() {
    let srv = TestServer::start().await;
    srv.write("data.bin", &body_100());

    let first = srv.get_file("data.bin").await;
    let validator = first.headers()[ETAG].to_str().unwrap().to_string();

    let resp = srv
        .client
        .get(srv.url("file=data.bin"))
        .header(IF_NONE_MATCH, &validator)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 304);
    assert_eq!(resp.bytes().await.unwrap().len(), 0);
}

#[tokio::test]
async fn stale_validator_gets_fresh_body() {
    let srv = TestServer::start().await;
    srv.write("data.bin", &body_100());

    let resp = srv
        .client
        .get(srv.url("file=data.bin"))
        .header(IF_NONE_MATCH, "stalevalidator")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.bytes().await.unwrap().len(), 100);
}

#[tokio::test]
async fn legacy_etag_request_header_is_honored() {
    let srv = TestServer::start().await;
    srv.write("data.bin", &body_100());

    let first = srv.get_file("data.bin").await;
    let validator = first.headers()[ETAG].to_str().unwrap().to_string();

    let resp = srv
        .client
        .get(srv.url("file=data.bin"))
        .header("etag", &validator)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 304);
}

#[tokio::test]
async fn serving_a_directory_is_forbidden() {
    let srv = TestServer::start().await;
    srv.mkdir("sub");

    let resp = srv.get_file("sub").await;
    assert_eq!(resp.status(), 403);
}

#[tokio::test]
async fn missing_file_is_forbidden() {
    let srv = TestServer::start().await;
    let resp = srv.get_file("nope.bin").await;
    assert_eq!(resp.status(), 403);
    let body = resp.text().await.unwrap();
    assert!(body.starts_with("File Serve Error:"), "got {body:?}");
}

#[tokio::test]
async fn traversal_in_file_param_is_forbidden() {
    let srv = TestServer::start().await;
    let resp = srv
        .client
        .get(srv.url("file=../etc/passwd"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 403);
}

#[tokio::test]
async fn file_serving_can_be_disabled() {
    use filedock_httpd::{FiledockServer, ServerConfig};

    let root = tempfile::tempdir().unwrap();
    std::fs::write(root.path().join("data.bin"), b"x").unwrap();
    let server = FiledockServer::start(ServerConfig {
        root: root.path().to_path_buf(),
        file_serving: false,
        ..ServerConfig::default()
    })
    .await
    .unwrap();

    let resp = reqwest::get(format!("{}/?file=data.bin", server.url()))
        .await
        .unwrap();
    // Falls through to action dispatch, which finds no action.
    assert_eq!(resp.status(), 400);
    server.stop().await;
}
