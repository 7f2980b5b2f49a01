use std::path::{Path, PathBuf};
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

use crate::config::ServerSection;
use crate::state::AppState;

pub const INDEX_HTML: &str = "<!doctype html><title>photos</title><h1>Photo archive</h1>";

/// Create a wired-up router and AppState backed by a temp directory.
///
/// The temp dir holds `index.html` and an empty `photos/` root. Pacing is
/// disabled unless `configure` sets it.
pub fn setup_app(
    configure: impl FnOnce(&mut ServerSection),
) -> (Router, AppState, tempfile::TempDir) {
    let tmp = tempfile::tempdir().expect("create tempdir");
    std::fs::create_dir_all(tmp.path().join("photos")).unwrap();
    std::fs::write(tmp.path().join("index.html"), INDEX_HTML).unwrap();

    let mut config = ServerSection {
        photos_dir: tmp.path().join("photos").to_string_lossy().into_owned(),
        index_path: tmp.path().join("index.html").to_string_lossy().into_owned(),
        response_delay_secs: 0.0,
        ..Default::default()
    };
    configure(&mut config);

    let state = AppState::new(config, CancellationToken::new());
    let router = super::router(state.clone());
    (router, state, tmp)
}

/// Use `sh -c <script>` as the archive producer.
pub fn fake_producer(config: &mut ServerSection, script: &str) {
    config.zip_program = "sh".into();
    config.producer_args = vec!["-c".into(), script.into()];
}

/// Create `photos/<name>` containing the given files.
pub fn add_archive(tmp: &Path, name: &str, files: &[(&str, &[u8])]) -> PathBuf {
    let dir = tmp.join("photos").join(name);
    std::fs::create_dir_all(&dir).unwrap();
    for (file, contents) in files {
        std::fs::write(dir.join(file), contents).unwrap();
    }
    dir
}

/// Send an unauthenticated GET request.
pub async fn get(router: Router, path: &str) -> axum::response::Response {
    let req = Request::builder()
        .method("GET")
        .uri(path)
        .body(Body::empty())
        .unwrap();

    router.oneshot(req).await.unwrap()
}

/// Read full response body into `Vec<u8>`.
pub async fn body_bytes(response: axum::response::Response) -> Vec<u8> {
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("collect body")
        .to_vec()
}

/// Assert response has expected status.
pub fn assert_status(response: &axum::response::Response, expected: StatusCode) {
    assert_eq!(
        response.status(),
        expected,
        "expected {expected}, got {}",
        response.status()
    );
}

/// Poll until every producer has been reaped, failing after `limit`.
pub async fn wait_for_no_producers(state: &AppState, limit: Duration) {
    let deadline = tokio::time::Instant::now() + limit;
    while state.live_producers() != 0 {
        assert!(
            tokio::time::Instant::now() < deadline,
            "{} producer(s) still alive after {limit:?}",
            state.live_producers()
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// True when `pid` no longer exists in the process table.
pub fn process_gone(pid: u32) -> bool {
    !Path::new(&format!("/proc/{pid}")).exists()
}

pub fn zip_available() -> bool {
    std::process::Command::new("zip")
        .arg("-v")
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}
