#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::Router;
use axum::body::Bytes;
use axum::extract::{Path as UrlPath, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::put;

use lut_grader::config::settings::{AppConfig, SourceMode};
use lut_grader::infrastructure::asset_store::{
    AssetStore, AssetStoreError, RemoteAsset, UploadChunk, UploadPlan, VersionStack,
};

pub const WEBHOOK_SECRET: &str = "test-webhook-secret";
pub const ADMIN_TOKEN: &str = "test-admin-token";

/// 2x2x2 identity cube, red varying fastest.
pub fn identity_lut() -> Vec<u8> {
    let mut text = String::from("TITLE \"Identity Rec709\"\nLUT_3D_SIZE 2\n");
    for b in 0..2 {
        for g in 0..2 {
            for r in 0..2 {
                text.push_str(&format!("{}.0 {}.0 {}.0\n", r, g, b));
            }
        }
    }
    text.into_bytes()
}

pub fn test_config(root: &Path) -> AppConfig {
    AppConfig {
        server_port: 0,
        database_url: None,
        lut_storage_dir: root.join("luts"),
        lut_import_dir: None,
        work_dir: root.join("work"),
        webhook_secret: WEBHOOK_SECRET.to_string(),
        signature_tolerance_secs: 300,
        admin_api_token: Some(ADMIN_TOKEN.to_string()),
        asset_api_url: "http://assets.invalid".to_string(),
        asset_api_token: "asset-token".to_string(),
        ffmpeg_bin: PathBuf::from("/nonexistent/ffmpeg"),
        ffprobe_bin: PathBuf::from("/nonexistent/ffprobe"),
        transcode_timeout_secs: 30,
        max_asset_bytes: 1024 * 1024,
        max_lut_bytes: 1024 * 1024,
        source_mode: SourceMode::Download,
        job_retention_secs: 3600,
        temp_max_age_secs: 3600,
        sweep_interval_secs: 60,
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    GetAsset(String),
    MediaUrl(String),
    CreateUpload { folder: String, name: String, size: u64 },
    VersionStack(Vec<String>),
    Comment(String),
}

/// In-process asset store. Uploads are planned as two chunks against `upload_base`.
pub struct FakeAssetStore {
    pub source: PathBuf,
    pub upload_base: String,
    pub fail_comment: bool,
    pub calls: Mutex<Vec<Call>>,
}

impl FakeAssetStore {
    pub fn new(source: PathBuf, upload_base: impl Into<String>) -> Self {
        Self {
            source,
            upload_base: upload_base.into(),
            fail_comment: false,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl AssetStore for FakeAssetStore {
    async fn get_asset(&self, _account_id: &str, asset_id: &str) -> Result<RemoteAsset, AssetStoreError> {
        self.record(Call::GetAsset(asset_id.to_string()));
        let size = std::fs::metadata(&self.source).map(|m| m.len()).ok();
        Ok(RemoteAsset {
            id: asset_id.to_string(),
            name: "clip.mov".to_string(),
            file_size: size,
            parent_id: Some("folder-1".to_string()),
            media_type: Some("video/quicktime".to_string()),
        })
    }

    async fn original_media_url(&self, _account_id: &str, asset_id: &str) -> Result<String, AssetStoreError> {
        self.record(Call::MediaUrl(asset_id.to_string()));
        Ok(self.source.to_string_lossy().into_owned())
    }

    async fn create_upload(
        &self,
        _account_id: &str,
        folder_id: &str,
        name: &str,
        size: u64,
    ) -> Result<UploadPlan, AssetStoreError> {
        self.record(Call::CreateUpload {
            folder: folder_id.to_string(),
            name: name.to_string(),
            size,
        });
        let first = size / 2;
        Ok(UploadPlan {
            file_id: "graded-file-1".to_string(),
            media_type: None,
            chunks: vec![
                UploadChunk {
                    url: format!("{}/upload/0", self.upload_base),
                    size: first,
                },
                UploadChunk {
                    url: format!("{}/upload/1", self.upload_base),
                    size: size - first,
                },
            ],
        })
    }

    async fn create_version_stack(
        &self,
        _account_id: &str,
        _folder_id: &str,
        file_ids: &[String],
    ) -> Result<VersionStack, AssetStoreError> {
        self.record(Call::VersionStack(file_ids.to_vec()));
        Ok(VersionStack {
            id: "stack-1".to_string(),
        })
    }

    async fn post_comment(&self, _account_id: &str, _file_id: &str, text: &str) -> Result<(), AssetStoreError> {
        self.record(Call::Comment(text.to_string()));
        if self.fail_comment {
            return Err(AssetStoreError::Http {
                status: 500,
                body: "comments unavailable".to_string(),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct ReceivedChunk {
    pub part: String,
    pub content_type: Option<String>,
    pub acl: Option<String>,
    pub content_length: Option<String>,
    pub body: Vec<u8>,
}

#[derive(Clone, Default)]
pub struct UploadSink {
    pub received: Arc<Mutex<Vec<ReceivedChunk>>>,
    /// Parts answered with 403.
    pub reject: Arc<Mutex<Vec<String>>>,
}

impl UploadSink {
    pub fn received(&self) -> Vec<ReceivedChunk> {
        self.received.lock().unwrap().clone()
    }
}

async fn receive_chunk(
    State(sink): State<UploadSink>,
    UrlPath(part): UrlPath<String>,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    if sink.reject.lock().unwrap().contains(&part) {
        return StatusCode::FORBIDDEN;
    }
    let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok()).map(String::from);
    sink.received.lock().unwrap().push(ReceivedChunk {
        part,
        content_type: header("content-type"),
        acl: header("x-amz-acl"),
        content_length: header("content-length"),
        body: body.to_vec(),
    });
    StatusCode::OK
}

/// Serves `app` on an ephemeral port; returns its base URL.
pub async fn serve(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

/// Serves `PUT /upload/{part}`; returns its base URL.
pub async fn spawn_upload_sink(sink: UploadSink) -> String {
    serve(
        Router::new()
            .route("/upload/{part}", put(receive_chunk))
            .with_state(sink),
    )
    .await
}

pub fn local_client() -> reqwest::Client {
    reqwest::Client::builder().no_proxy().build().unwrap()
}

#[cfg(unix)]
pub fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

/// ffprobe stand-in describing a 2 second h264 clip with AAC audio.
pub const FAKE_FFPROBE: &str = r#"cat <<'JSON'
{"streams": [
  {"codec_type": "video", "codec_name": "h264", "width": 1280, "height": 720,
   "pix_fmt": "yuv420p", "avg_frame_rate": "25/1", "color_transfer": "bt709", "color_primaries": "bt709"},
  {"codec_type": "audio", "codec_name": "aac"}
 ],
 "format": {"duration": "2.000000", "format_name": "mov,mp4,m4a,3gp,3g2,mj2"}}
JSON"#;

/// Bytes the ffmpeg stand-in writes as its output file.
pub const GRADED_BYTES: &str = "graded-output-0123456789abcdef";

/// ffmpeg stand-in: reports progress on stderr and writes its last argument.
pub fn fake_ffmpeg() -> String {
    format!(
        r#"for last; do :; done
printf 'frame=25 fps=25.0 q=28.0 size=100kB time=00:00:01.00 bitrate=N/A speed=1x\r' >&2
printf 'frame=50 fps=25.0 q=28.0 size=200kB time=00:00:02.00 bitrate=N/A speed=1x\n' >&2
printf '%s' '{}' > "$last""#,
        GRADED_BYTES
    )
}

pub const FAILING_FFMPEG: &str = r#"echo 'Error initializing filter lut3d' >&2
exit 1"#;

/// ffmpeg stand-in that waits before opening the LUT named in its filter graph,
/// and fails the way ffmpeg does when that file is gone.
pub fn slow_lut_reading_ffmpeg() -> String {
    format!(
        r#"lut=
for arg; do
  case "$arg" in
    *file=*) lut=$(printf '%s' "$arg" | sed -n "s/.*file='\([^']*\)'.*/\1/p") ;;
  esac
  last=$arg
done
sleep 1
if [ ! -f "$lut" ]; then
  echo "lut3d: cannot open $lut" >&2
  exit 1
fi
printf '%s' '{}' > "$last""#,
        GRADED_BYTES
    )
}
