use axum::Router;
use axum::body::{Body, Bytes, to_bytes};
use axum::http::{HeaderMap, Request, StatusCode, header};
use serde_json::Value;
use stash_core::{SigningKey, TokenCodec};
use stash_fs::{ArchiveBuilder, FileTree, NamespaceResolver};
use stash_node::AppState;
use stash_node::accounts::{ConfigIdentityStore, hash_password};
use stash_node::api::{LoginResponse, create_router};
use stash_node::config::NodeConfigAccount;
use std::collections::BTreeMap;
use std::io::Read;
use std::time::Duration;
use tempfile::TempDir;
use tower::ServiceExt;

const BOUNDARY: &str = "stash-test-boundary";

struct TestNode {
    _tmp: TempDir,
    base: std::path::PathBuf,
    app: Router,
    token: String,
}

fn node() -> TestNode {
    let tmp = tempfile::tempdir().unwrap();
    let base = tmp.path().join("data");
    std::fs::create_dir(&base).unwrap();
    let namespaces = NamespaceResolver::new(&base).unwrap();
    namespaces.provision("u1").unwrap();

    let tokens = TokenCodec::new(SigningKey::new([3; 32]), Duration::from_secs(3600));
    let token = tokens.issue("u1").unwrap();
    let tree = FileTree::new(tokens, namespaces, ArchiveBuilder::new());

    let mut accounts = BTreeMap::new();
    accounts.insert(
        "alice".to_owned(),
        NodeConfigAccount {
            namespace: "u1".into(),
            password_hash: hash_password("s3cret"),
        },
    );
    accounts.insert(
        "ghost".to_owned(),
        NodeConfigAccount {
            namespace: "never-provisioned".into(),
            password_hash: hash_password("boo"),
        },
    );

    let state = AppState::new(tree, ConfigIdentityStore::new(accounts));
    TestNode {
        _tmp: tmp,
        base,
        app: create_router(state, 16 * 1024 * 1024),
        token,
    }
}

impl TestNode {
    async fn send(&self, request: Request<Body>) -> (StatusCode, HeaderMap, Bytes) {
        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, headers, body)
    }

    fn authed(&self, method: &str, uri: &str) -> axum::http::request::Builder {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(header::AUTHORIZATION, format!("Bearer {}", self.token))
    }

    async fn get_json(&self, uri: &str) -> (StatusCode, Value) {
        let (status, _, body) = self
            .send(self.authed("GET", uri).body(Body::empty()).unwrap())
            .await;
        (status, serde_json::from_slice(&body).unwrap())
    }

    async fn upload(&self, uri: &str, files: &[(&str, &str)]) -> (StatusCode, Value) {
        let (status, _, body) = self
            .send(
                self.authed("POST", uri)
                    .header(
                        header::CONTENT_TYPE,
                        format!("multipart/form-data; boundary={BOUNDARY}"),
                    )
                    .body(Body::from(multipart_body(files)))
                    .unwrap(),
            )
            .await;
        (status, serde_json::from_slice(&body).unwrap())
    }
}

fn multipart_body(files: &[(&str, &str)]) -> Vec<u8> {
    let mut body = Vec::new();
    for (name, content) in files {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{name}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(content.as_bytes());
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

fn login_request(body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/auth/login")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_owned()))
        .unwrap()
}

#[tokio::test]
async fn health_needs_no_token() {
    let node = node();
    let (status, _, body) = node
        .send(Request::get("/health").body(Body::empty()).unwrap())
        .await;
    assert_eq!(status, StatusCode::OK);
    let body: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn login_issues_a_working_token() {
    let node = node();
    let (status, _, body) = node
        .send(login_request(r#"{"username":"alice","password":"s3cret"}"#))
        .await;
    assert_eq!(status, StatusCode::OK);
    let login: LoginResponse = serde_json::from_slice(&body).unwrap();
    assert_eq!(login.namespace, "u1");
    assert_eq!(login.username, "alice");
    assert_eq!(login.expires_in, 3600);

    let (status, _, _) = node
        .send(
            Request::get("/files/list")
                .header(header::AUTHORIZATION, format!("Bearer {}", login.token))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn login_failures_look_the_same() {
    let node = node();
    let (wrong_status, _, wrong_body) = node
        .send(login_request(r#"{"username":"alice","password":"nope"}"#))
        .await;
    let (unknown_status, _, unknown_body) = node
        .send(login_request(r#"{"username":"mallory","password":"s3cret"}"#))
        .await;
    assert_eq!(wrong_status, StatusCode::UNAUTHORIZED);
    assert_eq!(unknown_status, StatusCode::UNAUTHORIZED);
    assert_eq!(wrong_body, unknown_body);

    let (status, _, _) = node.send(login_request("{not json")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _, _) = node
        .send(login_request(r#"{"username":"","password":"x"}"#))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn login_to_unprovisioned_namespace_is_not_found() {
    let node = node();
    let (status, _, _) = node
        .send(login_request(r#"{"username":"ghost","password":"boo"}"#))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn file_routes_require_a_bearer_token() {
    let node = node();
    for (method, uri) in [
        ("GET", "/files/list"),
        ("POST", "/files/mkdir/docs"),
        ("GET", "/files/download/a.txt"),
        ("DELETE", "/files/delete/a.txt"),
    ] {
        let (status, headers, body) = node
            .send(Request::builder().method(method).uri(uri).body(Body::empty()).unwrap())
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED, "{method} {uri}");
        assert_eq!(headers[header::WWW_AUTHENTICATE], "Bearer");
        let body: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(body["status"], 401);
        assert_eq!(body["error"], "Unauthorized");
    }

    let (status, _, _) = node
        .send(
            Request::get("/files/list")
                .header(header::AUTHORIZATION, "Bearer not.a-token")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(!node.base.join("docs").exists());
}

#[tokio::test]
async fn list_mkdir_upload_download_delete() {
    let node = node();

    let (status, body) = node.get_json("/files/list").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, serde_json::json!([]));

    let (status, _, body) = node
        .send(node.authed("POST", "/files/mkdir/docs").body(Body::empty()).unwrap())
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let created: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(created["type"], "folder");
    assert_eq!(created["path"], "docs");
    assert!(created["size"].is_null());

    let (status, stored) = node.upload("/files/upload/docs", &[("a.txt", "hello")]).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stored[0]["path"], "docs/a.txt");
    assert_eq!(stored[0]["size"], 5);
    assert!(stored[0]["lastModified"].as_i64().unwrap() > 0);

    let (status, listing) = node.get_json("/files/list/docs").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listing, stored);

    let (status, headers, body) = node
        .send(node.authed("GET", "/files/download/docs/a.txt").body(Body::empty()).unwrap())
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(&body[..], b"hello");
    assert_eq!(headers[header::CONTENT_TYPE], "text/plain");
    assert_eq!(
        headers[header::CONTENT_DISPOSITION],
        "attachment; filename=\"a.txt\""
    );
    assert_eq!(
        headers[header::CACHE_CONTROL],
        "no-cache, no-store, must-revalidate"
    );
    assert_eq!(headers[header::PRAGMA], "no-cache");
    assert_eq!(headers[header::EXPIRES], "0");

    let (status, headers, body) = node
        .send(node.authed("GET", "/files/download/docs").body(Body::empty()).unwrap())
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers[header::CONTENT_TYPE], "application/zip");
    assert_eq!(
        headers[header::CONTENT_DISPOSITION],
        "attachment; filename=\"docs.zip\""
    );
    let mut zip = zip::ZipArchive::new(std::io::Cursor::new(body.to_vec())).unwrap();
    let mut content = String::new();
    zip.by_name("docs/a.txt")
        .unwrap()
        .read_to_string(&mut content)
        .unwrap();
    assert_eq!(content, "hello");

    let (status, _, body) = node
        .send(node.authed("DELETE", "/files/delete/docs").body(Body::empty()).unwrap())
        .await;
    assert_eq!(status, StatusCode::OK);
    let deleted: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(deleted, serde_json::json!({ "deleted": "docs", "success": true }));

    let (status, body) = node.get_json("/files/list/docs").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["status"], 404);
}

#[tokio::test]
async fn mkdir_conflict_and_forbidden_traversal() {
    let node = node();
    let (status, _, _) = node
        .send(node.authed("POST", "/files/mkdir/a/b").body(Body::empty()).unwrap())
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, _, body) = node
        .send(node.authed("POST", "/files/mkdir/a/b").body(Body::empty()).unwrap())
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    let body: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(body["error"], "Conflict");

    let (status, _, _) = node
        .send(
            node.authed("POST", "/files/mkdir/%2e%2e/escaped")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert!(!node.base.join("escaped").exists());
}

#[tokio::test]
async fn list_rejects_traversal_as_bad_request() {
    let node = node();
    let (status, body) = node.get_json("/files/list/%2e%2e/%2e%2e").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let message = body["message"].as_str().unwrap();
    assert!(!message.contains(node.base.to_str().unwrap()));
}

#[tokio::test]
async fn upload_rejections() {
    let node = node();

    let (status, _) = node
        .upload("/files/upload/docs", &[("../../evil.sh", "#!/bin/sh")])
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(!node.base.join("evil.sh").exists());
    assert!(!node.base.join("u1/evil.sh").exists());

    let (status, body) = node.upload("/files/upload/docs", &[]).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "no file provided");

    let (status, _) = node.upload("/files/upload", &[("x.txt", "1")]).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = node.upload("/files/upload", &[("x.txt", "2")]).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(std::fs::read(node.base.join("u1/x.txt")).unwrap(), b"1");
}

#[tokio::test]
async fn pdf_downloads_inline_unless_forced() {
    let node = node();
    let (status, _) = node
        .upload("/files/upload/papers", &[("paper.pdf", "%PDF-1.5\n...")])
        .await;
    assert_eq!(status, StatusCode::OK);

    let (_, headers, _) = node
        .send(
            node.authed("GET", "/files/download/papers/paper.pdf")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(headers[header::CONTENT_TYPE], "application/pdf");
    assert_eq!(
        headers[header::CONTENT_DISPOSITION],
        "inline; filename=\"paper.pdf\""
    );

    let (_, headers, _) = node
        .send(
            node.authed("GET", "/files/download/papers/paper.pdf?download=true")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(
        headers[header::CONTENT_DISPOSITION],
        "attachment; filename=\"paper.pdf\""
    );
}

#[tokio::test]
async fn download_of_missing_file_is_not_found() {
    let node = node();
    let (status, _, _) = node
        .send(node.authed("GET", "/files/download/nothing.bin").body(Body::empty()).unwrap())
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn download_flag_is_case_insensitive_and_lenient() {
    let node = node();
    let (status, _) = node
        .upload("/files/upload", &[("paper.pdf", "%PDF-1.5\n...")])
        .await;
    assert_eq!(status, StatusCode::OK);

    for (query, disposition) in [
        ("?download=TRUE", "attachment"),
        ("?download=True", "attachment"),
        ("?download=yes", "inline"),
        ("?download=1", "inline"),
        ("?download=", "inline"),
    ] {
        let (status, headers, body) = node
            .send(
                node.authed("GET", &format!("/files/download/paper.pdf{query}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "{query}");
        assert_eq!(
            headers[header::CONTENT_DISPOSITION],
            format!("{disposition}; filename=\"paper.pdf\"").as_str(),
            "{query}"
        );
        assert_eq!(&body[..], b"%PDF-1.5\n...");
    }
}

#[tokio::test]
async fn small_tree_lists_archives_and_deletes() {
    let node = node();
    let root = node.base.join("u1");
    std::fs::write(root.join("a.txt"), "hello").unwrap();
    std::fs::create_dir(root.join("sub")).unwrap();
    std::fs::write(root.join("sub/b.txt"), "abc").unwrap();

    let (status, listing) = node.get_json("/files/list").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listing.as_array().unwrap().len(), 2);
    assert_eq!(listing[0]["name"], "a.txt");
    assert_eq!(listing[0]["type"], "file");
    assert_eq!(listing[0]["path"], "a.txt");
    assert_eq!(listing[0]["size"], 5);
    assert_eq!(listing[1]["name"], "sub");
    assert_eq!(listing[1]["type"], "folder");
    assert_eq!(listing[1]["path"], "sub");
    assert!(listing[1]["size"].is_null());

    let (status, _, body) = node
        .send(node.authed("GET", "/files/download/sub").body(Body::empty()).unwrap())
        .await;
    assert_eq!(status, StatusCode::OK);
    let mut zip = zip::ZipArchive::new(std::io::Cursor::new(body.to_vec())).unwrap();
    assert_eq!(zip.file_names().collect::<Vec<_>>(), ["sub/b.txt"]);
    let mut content = Vec::new();
    zip.by_name("sub/b.txt")
        .unwrap()
        .read_to_end(&mut content)
        .unwrap();
    assert_eq!(content, b"abc");

    let (status, _, _) = node
        .send(node.authed("DELETE", "/files/delete/sub").body(Body::empty()).unwrap())
        .await;
    assert_eq!(status, StatusCode::OK);
    let (_, listing) = node.get_json("/files/list").await;
    let names: Vec<&str> = listing
        .as_array()
        .unwrap()
        .iter()
        .map(|entry| entry["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, ["a.txt"]);
}

#[tokio::test]
async fn deleting_links_never_touches_their_targets() {
    let node = node();
    let root = std::fs::canonicalize(node.base.join("u1")).unwrap();
    std::fs::write(root.join("keep.txt"), "keep").unwrap();
    std::fs::create_dir(root.join("real")).unwrap();
    std::fs::write(root.join("real/x.txt"), "x").unwrap();
    std::os::unix::fs::symlink(&root, root.join("self")).unwrap();
    std::os::unix::fs::symlink(root.join("real"), root.join("alias")).unwrap();

    for link in ["self", "alias"] {
        let (status, _, body) = node
            .send(
                node.authed("DELETE", &format!("/files/delete/{link}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "{link}");
        let deleted: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(deleted["deleted"], link);
    }

    assert!(root.join("keep.txt").is_file());
    assert!(root.join("real/x.txt").is_file());
    let (status, _) = node.get_json("/files/list").await;
    assert_eq!(status, StatusCode::OK);
}
