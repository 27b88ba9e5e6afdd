use axum::body::{to_bytes, Body};
use axum::http::{header, Method, Request, StatusCode};
use axum::response::Response;
use axum::Router;
use cache_server::{router, AppState, Credentials};
use extractor::Limits;
use filetime::{set_file_mtime, FileTime};
use flate2::write::GzEncoder;
use flate2::Compression;
use serde_json::Value;
use std::fs;
use std::io;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tar::{Builder, EntryType, Header};
use tempfile::TempDir;
use tower::ServiceExt;

const BOUNDARY: &str = "cache-server-test-boundary";

fn setup() -> (TempDir, Arc<AppState>) {
    let temp_dir = TempDir::new().unwrap();
    let state = AppState::new(&temp_dir.path().join("pub"), None).unwrap();
    (temp_dir, Arc::new(state))
}

fn setup_with_auth() -> (TempDir, Arc<AppState>) {
    let temp_dir = TempDir::new().unwrap();
    let credentials = Credentials::parse("user:secret");
    let state = AppState::new(&temp_dir.path().join("pub"), Some(credentials)).unwrap();
    (temp_dir, Arc::new(state))
}

fn app(state: &Arc<AppState>) -> Router {
    router(state.clone())
}

/// Multipart body with an optional `file` part followed by plain text fields
fn multipart_body(file: Option<(&str, &[u8])>, fields: &[(&str, &str)]) -> Vec<u8> {
    let mut body = Vec::new();
    if let Some((filename, content)) = file {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(content);
        body.extend_from_slice(b"\r\n");
    }
    for (name, value) in fields {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            )
            .as_bytes(),
        );
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

fn upload_request(body: Vec<u8>) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri("/upload")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap()
}

fn form_request(method: Method, uri: &str, form: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(form.to_string()))
        .unwrap()
}

async fn json_body(response: Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn build_tar_gz(add_entries: impl FnOnce(&mut Builder<GzEncoder<Vec<u8>>>)) -> Vec<u8> {
    let encoder = GzEncoder::new(Vec::new(), Compression::default());
    let mut tar = Builder::new(encoder);
    add_entries(&mut tar);
    tar.into_inner().unwrap().finish().unwrap()
}

fn raw_header(name: &str, size: u64, entry_type: EntryType) -> Header {
    let mut header = Header::new_gnu();
    let bytes = name.as_bytes();
    header.as_old_mut().name[..bytes.len()].copy_from_slice(bytes);
    header.set_size(size);
    header.set_mode(0o644);
    header.set_entry_type(entry_type);
    header.set_cksum();
    header
}

fn age(path: &std::path::Path, days: u64) {
    let when = SystemTime::now() - Duration::from_secs(days * 24 * 60 * 60);
    set_file_mtime(path, FileTime::from_system_time(when)).unwrap();
}

#[tokio::test]
async fn test_health() {
    let (_temp_dir, state) = setup_with_auth();

    let response = app(&state)
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["status"], "healthy");
    assert!(body["timestamp"].is_string());
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn test_upload_file() {
    let (_temp_dir, state) = setup();

    let body = multipart_body(Some(("hello.txt", b"hello world")), &[("path", "dir/greeting.txt")]);
    let response = app(&state).oneshot(upload_request(body)).await.unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);
    let body = json_body(response).await;
    assert_eq!(body["message"], "File has been uploaded to dir/greeting.txt");
    assert_eq!(body["filename"], "hello.txt");
    assert_eq!(body["path"], "dir/greeting.txt");
    assert_eq!(body["size"], 11);
    assert!(body.get("extracted").is_none());

    let stored = fs::read(state.root.join("dir/greeting.txt")).unwrap();
    assert_eq!(stored, b"hello world");
}

#[tokio::test]
async fn test_upload_defaults_path_to_filename() {
    let (_temp_dir, state) = setup();

    // Fields before the file part are picked up as well
    let mut body = Vec::new();
    body.extend_from_slice(
        format!("--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"targz\"\r\n\r\nfalse\r\n")
            .as_bytes(),
    );
    body.extend(multipart_body(Some(("notes.md", b"# notes")), &[]));

    let response = app(&state).oneshot(upload_request(body)).await.unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);
    assert_eq!(fs::read(state.root.join("notes.md")).unwrap(), b"# notes");
}

#[tokio::test]
async fn test_upload_missing_file() {
    let (_temp_dir, state) = setup();

    let body = multipart_body(None, &[("path", "x.txt")]);
    let response = app(&state).oneshot(upload_request(body)).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(json_body(response).await["message"].is_string());
}

#[tokio::test]
async fn test_upload_outside_root() {
    let (temp_dir, state) = setup();

    let body = multipart_body(Some(("x.txt", b"x")), &[("path", "../escape.txt")]);
    let response = app(&state).oneshot(upload_request(body)).await.unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(
        json_body(response).await["message"],
        "DENIED: You should not upload outside the upload directory."
    );
    assert!(!temp_dir.path().join("escape.txt").exists());
}

#[tokio::test]
async fn test_upload_targz() {
    let (_temp_dir, state) = setup();

    let archive = build_tar_gz(|tar| {
        tar.append(&raw_header("site/", 0, EntryType::Directory), io::empty())
            .unwrap();
        tar.append(&raw_header("site/index.html", 5, EntryType::Regular), &b"<h1/>"[..])
            .unwrap();
    });

    let body = multipart_body(
        Some(("site.tar.gz", &archive)),
        &[("path", "builds/42"), ("targz", "true")],
    );
    let response = app(&state).oneshot(upload_request(body)).await.unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);
    let body = json_body(response).await;
    assert_eq!(body["path"], "builds/42");
    assert_eq!(body["size"], archive.len() as u64);
    assert_eq!(body["extracted"]["files_extracted"], 1);

    let extracted = fs::read(state.root.join("builds/42/site/index.html")).unwrap();
    assert_eq!(extracted, b"<h1/>");
}

#[tokio::test]
async fn test_upload_targz_with_traversal() {
    let (temp_dir, state) = setup();

    let archive = build_tar_gz(|tar| {
        tar.append(&raw_header("../../escape.txt", 4, EntryType::Regular), &b"evil"[..])
            .unwrap();
    });

    let body = multipart_body(Some(("evil.tar.gz", &archive)), &[("path", "x"), ("targz", "true")]);
    let response = app(&state).oneshot(upload_request(body)).await.unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert!(!temp_dir.path().join("escape.txt").exists());
    assert!(!state.root.join("escape.txt").exists());
}

#[tokio::test]
async fn test_upload_targz_with_symlink() {
    let (_temp_dir, state) = setup();

    let archive = build_tar_gz(|tar| {
        let mut header = raw_header("evil", 0, EntryType::Symlink);
        let target = b"/etc/passwd";
        header.as_old_mut().linkname[..target.len()].copy_from_slice(target);
        header.set_cksum();
        tar.append(&header, io::empty()).unwrap();
    });

    let body = multipart_body(Some(("evil.tar.gz", &archive)), &[("path", "x"), ("targz", "true")]);
    let response = app(&state).oneshot(upload_request(body)).await.unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert!(fs::symlink_metadata(state.root.join("x/evil")).is_err());
}

#[tokio::test]
async fn test_upload_targz_over_size_limit() {
    let temp_dir = TempDir::new().unwrap();
    let limits = Limits {
        max_file_size: 16,
        max_total_size: 64,
    };
    let state = Arc::new(
        AppState::new(&temp_dir.path().join("pub"), None)
            .unwrap()
            .with_limits(limits),
    );

    let archive = build_tar_gz(|tar| {
        tar.append(&raw_header("big.bin", 32, EntryType::Regular), &[7u8; 32][..])
            .unwrap();
    });

    let body = multipart_body(Some(("big.tar.gz", &archive)), &[("targz", "true")]);
    let response = app(&state).oneshot(upload_request(body)).await.unwrap();

    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    assert!(!state.root.join("big.tar.gz/big.bin").exists());
}

#[tokio::test]
async fn test_upload_invalid_gzip() {
    let (_temp_dir, state) = setup();

    let body = multipart_body(
        Some(("broken.tar.gz", b"definitely not gzip")),
        &[("path", "broken"), ("targz", "true")],
    );
    let response = app(&state).oneshot(upload_request(body)).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_delete_upload() {
    let (_temp_dir, state) = setup();
    fs::create_dir_all(state.root.join("builds/1")).unwrap();
    fs::write(state.root.join("builds/1/app.bin"), b"app").unwrap();
    fs::write(state.root.join("single.txt"), b"one").unwrap();

    let response = app(&state)
        .oneshot(form_request(Method::DELETE, "/upload", "path=single.txt"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let body = json_body(response).await;
    assert_eq!(body["path"], "single.txt");
    assert!(!state.root.join("single.txt").exists());

    // Whole trees go at once, parameters may also come from the query string
    let response = app(&state)
        .oneshot(
            Request::delete("/upload?path=builds")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    assert!(!state.root.join("builds").exists());

    let response = app(&state)
        .oneshot(form_request(Method::DELETE, "/upload", "path=single.txt"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(json_body(response).await["message"], "Could not find your file");
}

#[tokio::test]
async fn test_delete_upload_rejects_root_and_escape() {
    let (temp_dir, state) = setup();
    fs::write(temp_dir.path().join("outside.txt"), b"keep").unwrap();

    for form in ["path=", "path=.", "path=/", "path=..%2Foutside.txt"] {
        let response = app(&state)
            .oneshot(form_request(Method::DELETE, "/upload", form))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN, "{form}");
    }

    assert!(state.root.is_dir());
    assert!(temp_dir.path().join("outside.txt").exists());
}

#[tokio::test]
async fn test_delete_old_files() {
    let (_temp_dir, state) = setup();
    let cache = state.root.join("cache");
    fs::create_dir_all(cache.join("old-dir")).unwrap();
    fs::write(cache.join("old-dir/inner.txt"), b"x").unwrap();
    fs::write(cache.join("old.txt"), b"x").unwrap();
    fs::write(cache.join("new.txt"), b"x").unwrap();
    fs::create_dir(cache.join("old-empty")).unwrap();
    age(&cache.join("old.txt"), 10);
    age(&cache.join("old-dir"), 10);
    age(&cache.join("old-empty"), 10);

    let response = app(&state)
        .oneshot(form_request(Method::DELETE, "/delete", "path=cache&days=5"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let body = json_body(response).await;
    assert_eq!(body["message"], "Old files deleted successfully");
    assert_eq!(body["path"], "cache");
    assert_eq!(body["days"], 5);
    assert_eq!(body["count"], 1);
    assert_eq!(body["deleted_count"], 1);
    assert!(!cache.join("old.txt").exists());
    assert!(cache.join("old-dir").exists());
    assert!(cache.join("new.txt").exists());

    let response = app(&state)
        .oneshot(form_request(
            Method::DELETE,
            "/delete",
            "path=cache&days=5&recursive=true",
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    assert_eq!(json_body(response).await["deleted_count"], 1);
    // Only empty directories are removed
    assert!(!cache.join("old-empty").exists());
    assert_eq!(fs::read(cache.join("old-dir/inner.txt")).unwrap(), b"x");
    assert!(cache.join("new.txt").exists());

    let response = app(&state)
        .oneshot(form_request(Method::DELETE, "/delete", "path=cache&days=30&recursive=1"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let body = json_body(response).await;
    assert_eq!(body["message"], "No old files found to delete");
    assert_eq!(body["count"], 0);
    assert!(body.get("deleted_count").is_none());
}

#[tokio::test]
async fn test_delete_old_files_invalid_parameters() {
    let (_temp_dir, state) = setup();

    let response = app(&state)
        .oneshot(form_request(Method::DELETE, "/delete", "path=&recursive=maybe"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["message"], "Invalid recursive parameter");

    let response = app(&state)
        .oneshot(form_request(Method::DELETE, "/delete", "path=..%2F..&days=1"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app(&state)
        .oneshot(form_request(Method::DELETE, "/delete", "path=missing&days=abc"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_head_last_modified() {
    let (_temp_dir, state) = setup();
    let file = state.root.join("artifact.bin");
    fs::write(&file, b"bits").unwrap();
    let modified = SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000);
    set_file_mtime(&file, FileTime::from_system_time(modified)).unwrap();

    let response = app(&state)
        .oneshot(
            Request::head("/artifact.bin")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::LAST_MODIFIED],
        "Tue, 14 Nov 2023 22:13:20 GMT"
    );

    let response = app(&state)
        .oneshot(Request::head("/missing.bin").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app(&state)
        .oneshot(
            Request::head("/a/%2E%2E/%2E%2E/etc/passwd")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_get_static_file() {
    let (_temp_dir, state) = setup();
    fs::create_dir_all(state.root.join("docs")).unwrap();
    fs::write(state.root.join("docs/readme.txt"), b"read me").unwrap();

    let response = app(&state)
        .oneshot(Request::get("/docs/readme.txt").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&bytes[..], b"read me");

    let response = app(&state)
        .oneshot(Request::get("/docs/nothing.txt").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_basic_auth() {
    let (_temp_dir, state) = setup_with_auth();
    fs::write(state.root.join("public.txt"), b"public").unwrap();

    // Downloads stay public
    let response = app(&state)
        .oneshot(Request::get("/public.txt").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = multipart_body(Some(("a.txt", b"a")), &[]);
    let response = app(&state).oneshot(upload_request(body)).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(
        response.headers()[header::WWW_AUTHENTICATE],
        "Basic realm=\"Restricted\""
    );

    let body = multipart_body(Some(("a.txt", b"a")), &[]);
    let mut request = upload_request(body);
    request.headers_mut().insert(
        header::AUTHORIZATION,
        "Basic dXNlcjp3cm9uZw==".parse().unwrap(),
    );
    let response = app(&state).oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(!state.root.join("a.txt").exists());

    let body = multipart_body(Some(("a.txt", b"a")), &[]);
    let mut request = upload_request(body);
    request.headers_mut().insert(
        header::AUTHORIZATION,
        "Basic dXNlcjpzZWNyZXQ=".parse().unwrap(),
    );
    let response = app(&state).oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    assert!(state.root.join("a.txt").exists());

    let response = app(&state)
        .oneshot(form_request(Method::DELETE, "/upload", "path=a.txt"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(state.root.join("a.txt").exists());
}
