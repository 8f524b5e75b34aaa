use std::path::{Path, PathBuf};
use std::process::Stdio;

use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tracing::debug;
use utoipa::ToSchema;

use crate::common::error::PipelineError;
use crate::modules::lut::model::ColorSpace;

/// What the pipeline needs to know about a clip before building a recipe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MediaMetadata {
    pub duration_seconds: f64,
    pub video_codec: String,
    pub width: u32,
    pub height: u32,
    pub frame_rate: Option<f64>,
    pub pixel_format: Option<String>,
    pub color_space: ColorSpace,
    pub has_audio: bool,
    pub audio_codec: Option<String>,
    pub format_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
    format: Option<ProbeFormat>,
}

#[derive(Debug, Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
    format_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    codec_type: Option<String>,
    codec_name: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    pix_fmt: Option<String>,
    avg_frame_rate: Option<String>,
    r_frame_rate: Option<String>,
    color_transfer: Option<String>,
    color_primaries: Option<String>,
    duration: Option<String>,
}

#[derive(Clone, Debug)]
pub struct MediaProber {
    ffprobe_bin: PathBuf,
}

impl MediaProber {
    pub fn new(ffprobe_bin: impl Into<PathBuf>) -> Self {
        Self {
            ffprobe_bin: ffprobe_bin.into(),
        }
    }

    /// Probes a local path or a URL ffprobe can open directly.
    pub async fn probe(&self, input: &str) -> Result<MediaMetadata, PipelineError> {
        let output = Command::new(&self.ffprobe_bin)
            .args(["-v", "quiet"])
            .args(["-print_format", "json"])
            .args(["-show_format", "-show_streams"])
            .arg(input)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| PipelineError::Spawn {
                program: self.ffprobe_bin.display().to_string(),
                source,
            })?;

        if !output.status.success() {
            return Err(PipelineError::Probe(format!(
                "ffprobe exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let metadata = parse_probe_output(&output.stdout)?;
        debug!(?metadata, "Probed media");
        Ok(metadata)
    }

    pub async fn probe_path(&self, path: &Path) -> Result<MediaMetadata, PipelineError> {
        self.probe(&path.to_string_lossy()).await
    }
}

pub fn parse_probe_output(json: &[u8]) -> Result<MediaMetadata, PipelineError> {
    let probe: ProbeOutput = serde_json::from_slice(json)
        .map_err(|e| PipelineError::Probe(format!("unreadable ffprobe output: {}", e)))?;

    let video = probe
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"))
        .ok_or_else(|| PipelineError::Probe("no video stream found".to_string()))?;
    let audio = probe
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("audio"));

    let duration_seconds = probe
        .format
        .as_ref()
        .and_then(|f| f.duration.as_deref())
        .or(video.duration.as_deref())
        .and_then(|d| d.parse::<f64>().ok())
        .unwrap_or(0.0);

    let frame_rate = video
        .avg_frame_rate
        .as_deref()
        .and_then(parse_rational)
        .or_else(|| video.r_frame_rate.as_deref().and_then(parse_rational));

    Ok(MediaMetadata {
        duration_seconds,
        video_codec: video.codec_name.clone().unwrap_or_default(),
        width: video.width.unwrap_or(0),
        height: video.height.unwrap_or(0),
        frame_rate,
        pixel_format: video.pix_fmt.clone(),
        color_space: color_space_from_tags(
            video.color_transfer.as_deref(),
            video.color_primaries.as_deref(),
        ),
        has_audio: audio.is_some(),
        audio_codec: audio.and_then(|a| a.codec_name.clone()),
        format_name: probe.format.and_then(|f| f.format_name),
    })
}

/// Maps ffprobe transfer/primaries tags onto the color spaces the pipeline knows.
pub fn color_space_from_tags(transfer: Option<&str>, primaries: Option<&str>) -> ColorSpace {
    match (transfer, primaries) {
        (Some("arib-std-b67"), _) => ColorSpace::Hlg,
        (Some("smpte2084"), _) => ColorSpace::Pq,
        (Some("linear"), _) => ColorSpace::Linear,
        (_, Some("smpte432")) => ColorSpace::P3D65,
        (Some("bt709"), _) | (None, Some("bt709")) => ColorSpace::Rec709,
        _ => ColorSpace::Unknown,
    }
}

fn parse_rational(value: &str) -> Option<f64> {
    let (num, den) = value.split_once('/')?;
    let num: f64 = num.parse().ok()?;
    let den: f64 = den.parse().ok()?;
    if den == 0.0 || num == 0.0 {
        return None;
    }
    Some(num / den)
}
