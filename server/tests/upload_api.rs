//! End-to-end tests of the booth server's HTTP surface, with a mock
//! media host standing in for the real provider.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use axum::extract::{Multipart, Path, State};
use axum::http::StatusCode;
use axum::response::Json;
use axum::routing::post;
use axum::Router;
use serde_json::{json, Value};
use tokio::net::TcpListener;

use snapbooth_server::provider::MediaHost;
use snapbooth_server::routes::{self, AppState};

const MAX_UPLOAD_BYTES: u64 = 50 * 1024 * 1024;

/// What the mock host saw in one upload request.
#[derive(Debug, Default, Clone)]
struct SeenUpload {
    resource_type: String,
    folder: String,
    tags: String,
    transformation: Option<String>,
    eager: Option<String>,
    eager_async: Option<String>,
    eager_notification_url: Option<String>,
    file_len: usize,
}

#[derive(Clone)]
struct MockHost {
    seen: Arc<Mutex<Vec<SeenUpload>>>,
    fail: bool,
}

async fn mock_upload(
    Path(resource_type): Path<String>,
    State(mock): State<MockHost>,
    mut multipart: Multipart,
) -> (StatusCode, Json<Value>) {
    let mut seen = SeenUpload {
        resource_type: resource_type.clone(),
        ..Default::default()
    };
    while let Some(field) = multipart.next_field().await.unwrap() {
        match field.name().unwrap_or("").to_string().as_str() {
            "file" => seen.file_len = field.bytes().await.unwrap().len(),
            "folder" => seen.folder = field.text().await.unwrap(),
            "tags" => seen.tags = field.text().await.unwrap(),
            "transformation" => seen.transformation = Some(field.text().await.unwrap()),
            "eager" => seen.eager = Some(field.text().await.unwrap()),
            "eager_async" => seen.eager_async = Some(field.text().await.unwrap()),
            "eager_notification_url" => {
                seen.eager_notification_url = Some(field.text().await.unwrap())
            }
            _ => {}
        }
    }
    mock.seen.lock().unwrap().push(seen);

    if mock.fail {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": {"message": "Invalid video file"}})),
        );
    }
    let body = if resource_type == "video" {
        json!({
            "secure_url": "https://cdn.example.com/photobooth/x.webm",
            "public_id": "photobooth/x",
            "format": "webm",
            "width": 1280,
            "height": 720,
            "duration": 9.5
        })
    } else {
        json!({
            "secure_url": "https://cdn.example.com/photobooth/x.jpg",
            "public_id": "photobooth/x",
            "format": "jpg",
            "width": 1200,
            "height": 900
        })
    };
    (StatusCode::OK, Json(body))
}

async fn serve(app: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

/// Spin up a mock host and a booth server pointed at it.  Returns the
/// booth server's base URL and the mock's request log.
async fn booth_server(fail_upstream: bool) -> (String, Arc<Mutex<Vec<SeenUpload>>>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let mock = MockHost {
        seen: seen.clone(),
        fail: fail_upstream,
    };
    let mock_app = Router::new()
        .route("/{resource_type}/upload", post(mock_upload))
        .with_state(mock);
    let mock_url = serve(mock_app).await;

    let host = MediaHost::new(
        mock_url.as_str(),
        "test-key",
        "photobooth",
        "http://localhost:3000/api/host-notification",
        std::time::Duration::from_secs(5),
    )
    .unwrap();
    let state = AppState::new(host, MAX_UPLOAD_BYTES);
    let app = routes::router(state, PathBuf::from("assets"));
    (serve(app).await, seen)
}

fn media_form(bytes: Vec<u8>, file_name: &str, content_type: &str) -> reqwest::multipart::Form {
    let part = reqwest::multipart::Part::bytes(bytes)
        .file_name(file_name.to_string())
        .mime_str(content_type)
        .unwrap();
    reqwest::multipart::Form::new().part("media", part)
}

#[tokio::test]
async fn test_image_upload_success() {
    let (base, seen) = booth_server(false).await;

    let form = media_form(vec![0xff, 0xd8, 0xff, 0xe0], "photo.jpg", "image/jpeg")
        .text("eventTag", "demo");
    let resp = reqwest::Client::new()
        .post(format!("{base}/api/upload"))
        .multipart(form)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["success"], true);
    assert_eq!(body["message"], "Image uploaded successfully!");
    assert_eq!(body["media"]["type"], "image");
    assert_eq!(body["media"]["url"], "https://cdn.example.com/photobooth/x.jpg");
    assert_eq!(body["media"]["publicId"], "photobooth/x");
    assert!(body["media"].get("durationSeconds").is_none());

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].resource_type, "image");
    assert_eq!(seen[0].folder, "photobooth");
    assert_eq!(seen[0].tags, "demo");
    assert_eq!(seen[0].transformation.as_deref(), Some("c_limit,w_1200/q_auto"));
    assert!(seen[0].eager.is_none());
    assert_eq!(seen[0].file_len, 4);
}

#[tokio::test]
async fn test_video_upload_requests_eager_rendition() {
    let (base, seen) = booth_server(false).await;

    let form = media_form(vec![0x1a, 0x45, 0xdf, 0xa3], "recording.webm", "video/webm")
        .text("eventTag", "demo")
        .text("fileType", "video");
    let resp = reqwest::Client::new()
        .post(format!("{base}/api/upload"))
        .multipart(form)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["success"], true);
    assert_eq!(body["message"], "Video uploaded successfully!");
    assert_eq!(body["media"]["type"], "video");
    assert_eq!(body["media"]["durationSeconds"], 9.5);

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].resource_type, "video");
    assert_eq!(seen[0].eager.as_deref(), Some("c_limit,w_720/q_auto"));
    assert_eq!(seen[0].eager_async.as_deref(), Some("true"));
    assert_eq!(
        seen[0].eager_notification_url.as_deref(),
        Some("http://localhost:3000/api/host-notification")
    );
    assert!(seen[0].transformation.is_none());
}

#[tokio::test]
async fn test_missing_media_field() {
    let (base, seen) = booth_server(false).await;

    let form = reqwest::multipart::Form::new().text("eventTag", "demo");
    let resp = reqwest::Client::new()
        .post(format!("{base}/api/upload"))
        .multipart(form)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["success"], false);
    assert_eq!(body["message"], "No file selected");
    assert!(seen.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_oversized_payload_rejected_before_forwarding() {
    let (base, seen) = booth_server(false).await;

    let form = media_form(
        vec![0u8; (MAX_UPLOAD_BYTES + 1) as usize],
        "big.webm",
        "video/webm",
    );
    let resp = reqwest::Client::new()
        .post(format!("{base}/api/upload"))
        .multipart(form)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 413);

    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["success"], false);
    assert_eq!(body["message"], "File too large. Maximum size is 50MB");
    // Never forwarded.
    assert!(seen.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_upstream_failure_maps_to_envelope() {
    let (base, seen) = booth_server(true).await;

    let form = media_form(vec![1, 2, 3], "recording.webm", "video/webm")
        .text("fileType", "video");
    let resp = reqwest::Client::new()
        .post(format!("{base}/api/upload"))
        .multipart(form)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 500);

    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["success"], false);
    let message = body["message"].as_str().unwrap();
    assert!(message.starts_with("Error uploading video:"), "{message}");
    assert!(message.contains("Invalid video file"), "{message}");
    assert_eq!(seen.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_health() {
    let (base, _) = booth_server(false).await;

    let resp = reqwest::get(format!("{base}/api/health")).await.unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_themed_pages() {
    let (base, _) = booth_server(false).await;
    let client = reqwest::Client::new();

    let home = client
        .get(base.clone())
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert!(home.contains("Pam Production Orlando"));

    let wedding = client
        .get(format!("{base}/wedding"))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert!(wedding.contains("Wedding Memories"));

    let party = client
        .get(format!("{base}/party"))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert!(party.contains("Party Memories"));
}

#[tokio::test]
async fn test_host_notification_acknowledged() {
    let (base, _) = booth_server(false).await;

    let resp = reqwest::Client::new()
        .post(format!("{base}/api/host-notification"))
        .json(&json!({"notification_type": "eager", "public_id": "photobooth/x"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
}
