//! API integration tests.
//!
//! FFmpeg is replaced by small shell scripts so the success and failure paths
//! run without a real transcoder. The end-to-end test with real FFmpeg is
//! ignored by default.
#![cfg(unix)]

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use cvd_api::{create_router, ApiConfig, AppState};
use cvd_models::ProcessResponse;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

const BOUNDARY: &str = "cvd-test-boundary";
const BASE_URL: &str = "http://testserver";

/// Copies the `-i` input to the last argument and logs all arguments.
const COPY_SCRIPT: &str = r#"printf '%s\n' "$@" > "$(dirname "$0")/args.txt"
in=""
out=""
while [ $# -gt 0 ]; do
  case "$1" in
    -i) in="$2"; shift 2 ;;
    *) out="$1"; shift ;;
  esac
done
cp "$in" "$out""#;

const FAIL_SCRIPT: &str = r#"echo "in.bin: Invalid data found when processing input" >&2
exit 1"#;

/// Runs longer than any timeout used here; `sleep` keeps stderr open.
const SLOW_SCRIPT: &str = "sleep 6";

/// Records start/end marks around a short sleep, then copies like COPY_SCRIPT.
const MARKING_SCRIPT: &str = r#"marks="$(dirname "$0")/marks.txt"
echo start >> "$marks"
sleep 0.5
in=""
out=""
while [ $# -gt 0 ]; do
  case "$1" in
    -i) in="$2"; shift 2 ;;
    *) out="$1"; shift ;;
  esac
done
cp "$in" "$out"
echo end >> "$marks""#;

const NOISY_FAIL_SCRIPT: &str = r#"i=0
while [ $i -lt 500 ]; do
  echo "frame error: corrupt macroblock at position $i" >&2
  i=$((i+1))
done
exit 183"#;

struct TestApp {
    router: Router,
    scratch: TempDir,
    tools: TempDir,
}

impl TestApp {
    async fn new(script: &str, retention_secs: u64) -> Self {
        Self::with_config(script, |config| {
            config.artifact_retention = Duration::from_secs(retention_secs);
        })
        .await
    }

    async fn with_config(script: &str, configure: impl FnOnce(&mut ApiConfig)) -> Self {
        let scratch = tempfile::tempdir().unwrap();
        let tools = tempfile::tempdir().unwrap();
        let ffmpeg = write_script(tools.path(), "ffmpeg", script);
        let router = build_router_with(scratch.path(), ffmpeg, configure).await;
        Self {
            router,
            scratch,
            tools,
        }
    }

    async fn send(&self, request: Request<Body>) -> axum::response::Response {
        self.router.clone().oneshot(request).await.unwrap()
    }

    fn scratch_files(&self) -> Vec<String> {
        scratch_files(self.scratch.path())
    }

    fn logged_args(&self) -> Vec<String> {
        std::fs::read_to_string(self.tools.path().join("args.txt"))
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect()
    }
}

async fn build_router(scratch: &Path, ffmpeg: PathBuf, retention_secs: u64) -> Router {
    build_router_with(scratch, ffmpeg, |config| {
        config.artifact_retention = Duration::from_secs(retention_secs);
    })
    .await
}

async fn build_router_with(
    scratch: &Path,
    ffmpeg: PathBuf,
    configure: impl FnOnce(&mut ApiConfig),
) -> Router {
    let mut config = ApiConfig {
        base_url: BASE_URL.to_string(),
        scratch_dir: scratch.to_path_buf(),
        ffmpeg_path: ffmpeg,
        ffmpeg_timeout_secs: 30,
        artifact_retention: Duration::ZERO,
        rate_limit_rps: 1000,
        ..Default::default()
    };
    configure(&mut config);
    let state = AppState::new(config).await.unwrap();
    create_router(state, None)
}

fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
    let mut perms = std::fs::metadata(&path).unwrap().permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&path, perms).unwrap();
    path
}

fn scratch_files(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
        .collect();
    names.sort();
    names
}

fn multipart_body(field: &str, file_name: &str, content: &[u8]) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
    body.extend_from_slice(
        format!(
            "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n",
            field, file_name
        )
        .as_bytes(),
    );
    body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
    body.extend_from_slice(content);
    body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());
    body
}

fn upload_request(query: &str, content: &[u8]) -> Request<Body> {
    upload_request_with_field(query, "file", content)
}

fn upload_request_with_field(query: &str, field: &str, content: &[u8]) -> Request<Body> {
    let uri = if query.is_empty() {
        "/process-video".to_string()
    } else {
        format!("/process-video?{}", query)
    };
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(multipart_body(field, "clip.mp4", content)))
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

/// Poll until the scratch directory holds no files.
async fn wait_for_empty(dir: &Path) -> bool {
    for _ in 0..100 {
        if scratch_files(dir).is_empty() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    false
}

fn file_name_from_url(url: &str) -> &str {
    url.strip_prefix(&format!("{}/files/", BASE_URL))
        .expect("url under /files/")
}

/// Test root info endpoint.
#[tokio::test]
async fn test_root_endpoint() {
    let app = TestApp::new(COPY_SCRIPT, 0).await;

    let response = app
        .send(Request::builder().uri("/").body(Body::empty()).unwrap())
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["message"], "Use POST /process-video (multipart/form-data)");
}

/// Test health endpoint.
#[tokio::test]
async fn test_health_endpoint() {
    let app = TestApp::new(COPY_SCRIPT, 0).await;

    let response = app
        .send(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["status"], "healthy");
}

/// Readiness sees the stand-in ffmpeg and a writable scratch dir.
#[tokio::test]
async fn test_ready_endpoint() {
    let app = TestApp::new(COPY_SCRIPT, 0).await;

    let response = app
        .send(Request::builder().uri("/ready").body(Body::empty()).unwrap())
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "ready");
    assert_eq!(body["checks"]["ffmpeg"]["status"], "ok");
    assert!(app.scratch_files().is_empty(), "readiness probe file left behind");
}

#[tokio::test]
async fn test_ready_reports_missing_ffmpeg() {
    let scratch = tempfile::tempdir().unwrap();
    let router = build_router(scratch.path(), PathBuf::from("/nonexistent/ffmpeg"), 0).await;

    let response = router
        .oneshot(Request::builder().uri("/ready").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body = body_json(response).await;
    assert_eq!(body["status"], "degraded");
    assert_eq!(body["checks"]["ffmpeg"]["status"], "error");
}

/// Test security headers.
#[tokio::test]
async fn test_security_headers() {
    let app = TestApp::new(COPY_SCRIPT, 0).await;

    let response = app
        .send(
            Request::builder()
                .uri("/health")
                .header("X-Request-ID", "req-123")
                .body(Body::empty())
                .unwrap(),
        )
        .await;

    let headers = response.headers();
    assert_eq!(headers.get("x-content-type-options").unwrap(), "nosniff");
    assert_eq!(headers.get("x-frame-options").unwrap(), "DENY");
    assert_eq!(headers.get("x-request-id").unwrap(), "req-123");
}

/// Test CORS headers.
#[tokio::test]
async fn test_cors_preflight() {
    let app = TestApp::new(COPY_SCRIPT, 0).await;

    let response = app
        .send(
            Request::builder()
                .method("OPTIONS")
                .uri("/process-video")
                .header("Origin", "https://app.flutterflow.io")
                .header("Access-Control-Request-Method", "POST")
                .body(Body::empty())
                .unwrap(),
        )
        .await;

    assert!(response.status() == StatusCode::OK || response.status() == StatusCode::NO_CONTENT);
    assert_eq!(
        response.headers().get("access-control-allow-origin").unwrap(),
        "*"
    );
}

#[tokio::test]
async fn test_success_returns_url_and_cleans_up() {
    let app = TestApp::new(COPY_SCRIPT, 0).await;

    let response = app.send(upload_request("filter=identity", b"fake video")).await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    let url = body["url"].as_str().expect("url in success body");
    let name = file_name_from_url(url);
    assert!(cvd_media::is_artifact_name(name), "unexpected name {}", name);
    assert!(body.get("ok").is_none());

    // Body consumed: both scratch files go away
    assert!(wait_for_empty(app.scratch.path()).await, "left: {:?}", app.scratch_files());
}

#[tokio::test]
async fn test_ffmpeg_receives_fixed_argument_template() {
    let app = TestApp::new(COPY_SCRIPT, 0).await;

    let response = app.send(upload_request("", b"fake video")).await;
    let body = body_json(response).await;
    let name = file_name_from_url(body["url"].as_str().unwrap()).to_string();

    let args = app.logged_args();
    assert_eq!(args.len(), 16, "args: {:?}", args);
    assert_eq!(args[0], "-y");
    assert_eq!(args[1], "-i");
    assert!(args[2].ends_with("_clip.mp4.bin"));
    assert_eq!(
        &args[3..15],
        &[
            "-vf",
            "colorchannelmixer=0.625:0.375:0:0:0.7:0.3:0:0:0:0.3:0.7:0",
            "-c:v",
            "libx264",
            "-preset",
            "veryfast",
            "-crf",
            "23",
            "-movflags",
            "+faststart",
            "-c:a",
            "copy",
        ]
    );
    assert!(args[15].ends_with(&name));
}

#[tokio::test]
async fn test_quality_and_preset_are_forwarded() {
    let app = TestApp::new(COPY_SCRIPT, 0).await;

    let response = app
        .send(upload_request("filter=tritanopia&crf=18&preset=slow", b"fake video"))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    body_json(response).await;

    let args = app.logged_args();
    let pos = |flag: &str| args.iter().position(|a| a == flag).unwrap();
    assert_eq!(args[pos("-crf") + 1], "18");
    assert_eq!(args[pos("-preset") + 1], "slow");
    assert_eq!(
        args[pos("-vf") + 1],
        "colorchannelmixer=0.95:0.05:0:0:0:0.43333:0.56667:0:0:0.475:0.525:0"
    );
}

#[tokio::test]
async fn test_published_file_is_served_during_retention() {
    let app = TestApp::new(COPY_SCRIPT, 60).await;

    let response = app.send(upload_request("filter=deuteranopia", b"fake video bytes")).await;
    let body = body_json(response).await;
    let name = file_name_from_url(body["url"].as_str().unwrap()).to_string();

    let response = app
        .send(
            Request::builder()
                .uri(format!("/files/{}", name))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers().get(header::CONTENT_TYPE).unwrap(), "video/mp4");
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(&bytes[..], b"fake video bytes");

    // Input is gone once the response finished; only the output remains
    for _ in 0..100 {
        if app.scratch_files() == vec![name.clone()] {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(app.scratch_files(), vec![name]);
}

#[tokio::test]
async fn test_ffmpeg_failure_returns_structured_body() {
    let app = TestApp::new(FAIL_SCRIPT, 0).await;

    let response = app.send(upload_request("filter=protanopia", b"not a video")).await;
    assert_eq!(response.status(), StatusCode::OK);

    // Input removed before the response was produced
    assert!(app.scratch_files().is_empty(), "left: {:?}", app.scratch_files());

    let body = body_json(response).await;
    assert_eq!(body["ok"], false);
    assert_eq!(body["error"], "ffmpeg_failed");
    assert!(body["detail"]
        .as_str()
        .unwrap()
        .contains("Invalid data found when processing input"));
    assert!(body.get("url").is_none());

    let parsed: ProcessResponse = serde_json::from_value(body).unwrap();
    assert!(!parsed.is_success());
}

#[tokio::test]
async fn test_ffmpeg_failure_detail_is_truncated() {
    let app = TestApp::new(NOISY_FAIL_SCRIPT, 0).await;

    let response = app.send(upload_request("", b"not a video")).await;
    let body = body_json(response).await;

    let detail = body["detail"].as_str().unwrap();
    assert!(detail.len() <= 4000, "detail is {} bytes", detail.len());
    assert!(detail.starts_with("frame error: corrupt macroblock at position 0"));
    assert!(app.scratch_files().is_empty());
}

#[tokio::test]
async fn test_ffmpeg_timeout_returns_failure_body_promptly() {
    let app = TestApp::with_config(SLOW_SCRIPT, |config| config.ffmpeg_timeout_secs = 1).await;

    let started = Instant::now();
    let response = app.send(upload_request("filter=protanopia", b"fake video")).await;
    let elapsed = started.elapsed();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(elapsed < Duration::from_secs(4), "request took {:?}", elapsed);
    assert!(app.scratch_files().is_empty(), "left: {:?}", app.scratch_files());

    let body = body_json(response).await;
    assert_eq!(body["ok"], false);
    assert_eq!(body["error"], "ffmpeg_failed");
    assert_eq!(body["detail"], "ffmpeg timed out after 1 seconds");
}

#[tokio::test]
async fn test_job_limit_serializes_transcodes() {
    let app = TestApp::with_config(MARKING_SCRIPT, |config| config.max_concurrent_jobs = 1).await;

    let (first, second) = tokio::join!(
        app.send(upload_request("", b"first video")),
        app.send(upload_request("", b"second video")),
    );
    assert!(body_json(first).await["url"].is_string());
    assert!(body_json(second).await["url"].is_string());

    let marks = std::fs::read_to_string(app.tools.path().join("marks.txt")).unwrap();
    let marks: Vec<&str> = marks.lines().collect();
    assert_eq!(marks, vec!["start", "end", "start", "end"]);
}

#[tokio::test]
async fn test_without_job_limit_transcodes_overlap() {
    let app = TestApp::new(MARKING_SCRIPT, 0).await;

    let (first, second) = tokio::join!(
        app.send(upload_request("", b"first video")),
        app.send(upload_request("", b"second video")),
    );
    body_json(first).await;
    body_json(second).await;

    let marks = std::fs::read_to_string(app.tools.path().join("marks.txt")).unwrap();
    let marks: Vec<&str> = marks.lines().collect();
    assert_eq!(marks, vec!["start", "start", "end", "end"]);
}

#[tokio::test]
async fn test_invalid_filter_is_rejected_before_processing() {
    let app = TestApp::new(COPY_SCRIPT, 0).await;

    let response = app.send(upload_request("filter=bogus", b"fake video")).await;

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert!(app.scratch_files().is_empty());
    assert!(!app.tools.path().join("args.txt").exists(), "ffmpeg was invoked");
}

#[tokio::test]
async fn test_crf_out_of_range_is_rejected() {
    let app = TestApp::new(COPY_SCRIPT, 0).await;

    for query in ["crf=17", "crf=33", "crf=abc", "crf=-1"] {
        let response = app.send(upload_request(query, b"fake video")).await;
        assert_eq!(
            response.status(),
            StatusCode::UNPROCESSABLE_ENTITY,
            "query {}",
            query
        );
    }
    assert!(app.scratch_files().is_empty());
}

#[tokio::test]
async fn test_missing_file_field_is_rejected() {
    let app = TestApp::new(COPY_SCRIPT, 0).await;

    let response = app
        .send(upload_request_with_field("", "video", b"fake video"))
        .await;

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert!(app.scratch_files().is_empty());
}

#[tokio::test]
async fn test_non_multipart_body_is_rejected() {
    let app = TestApp::new(COPY_SCRIPT, 0).await;

    let response = app
        .send(
            Request::builder()
                .method("POST")
                .uri("/process-video")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from("{}"))
                .unwrap(),
        )
        .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_files_route_only_serves_outputs() {
    let app = TestApp::new(COPY_SCRIPT, 0).await;
    std::fs::write(
        app.scratch.path().join("in_0123456789abcdef0123456789abcdef_clip.mp4.bin"),
        b"private",
    )
    .unwrap();

    for uri in [
        "/files/in_0123456789abcdef0123456789abcdef_clip.mp4.bin",
        "/files/out_0123456789abcdef0123456789abcdef.mp4",
        "/files/..%2Fetc%2Fpasswd",
    ] {
        let response = app
            .send(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND, "uri {}", uri);
    }
}

#[tokio::test]
async fn test_concurrent_uploads_get_distinct_outputs() {
    let app = TestApp::new(COPY_SCRIPT, 60).await;

    let (first, second) = tokio::join!(
        app.send(upload_request("filter=identity", b"first video")),
        app.send(upload_request("filter=identity", b"second video")),
    );
    let first = body_json(first).await;
    let second = body_json(second).await;

    let first_name = file_name_from_url(first["url"].as_str().unwrap()).to_string();
    let second_name = file_name_from_url(second["url"].as_str().unwrap()).to_string();
    assert_ne!(first_name, second_name);

    let first_bytes = std::fs::read(app.scratch.path().join(&first_name)).unwrap();
    let second_bytes = std::fs::read(app.scratch.path().join(&second_name)).unwrap();
    assert_eq!(first_bytes, b"first video");
    assert_eq!(second_bytes, b"second video");
}

/// End-to-end run with the real transcoder.
#[tokio::test]
#[ignore = "requires ffmpeg in PATH"]
async fn test_real_ffmpeg_end_to_end() {
    let scratch = tempfile::tempdir().unwrap();
    let fixtures = tempfile::tempdir().unwrap();
    let sample = fixtures.path().join("sample.mp4");

    let status = std::process::Command::new("ffmpeg")
        .args(["-y", "-v", "error", "-f", "lavfi", "-i"])
        .arg("testsrc=duration=1:size=128x72:rate=10")
        .args(["-c:v", "libx264", "-pix_fmt", "yuv420p"])
        .arg(&sample)
        .status()
        .unwrap();
    assert!(status.success());
    let video = std::fs::read(&sample).unwrap();

    let router = build_router(scratch.path(), PathBuf::from("ffmpeg"), 60).await;

    // Valid video, identity filter
    let response = router
        .clone()
        .oneshot(upload_request("filter=identity", &video))
        .await
        .unwrap();
    let body = body_json(response).await;
    let name = file_name_from_url(body["url"].as_str().expect("success body")).to_string();

    let response = router
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!("/files/{}", name))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(&bytes[4..8], b"ftyp");

    // Corrupt input
    let response = router
        .clone()
        .oneshot(upload_request("filter=protanopia", b"definitely not a video"))
        .await
        .unwrap();
    assert!(scratch_files(scratch.path()).iter().all(|n| !n.starts_with("in_")));
    let body = body_json(response).await;
    assert_eq!(body["ok"], false);
    assert_eq!(body["error"], "ffmpeg_failed");
}
