use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::config::env::{self, EnvKey};

const GIB: u64 = 1024 * 1024 * 1024;
const MIB: usize = 1024 * 1024;

/// How the pipeline acquires the original media before transcoding.
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SourceMode {
    /// Stream the original to the job's work dir first.
    #[default]
    Download,
    /// Hand the signed URL straight to ffmpeg.
    Stream,
}

impl std::str::FromStr for SourceMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "download" => Ok(SourceMode::Download),
            "stream" => Ok(SourceMode::Stream),
            other => Err(format!("unknown source mode: {}", other)),
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct AppConfig {
    pub server_port: u16,
    pub database_url: Option<String>,
    pub lut_storage_dir: PathBuf,
    pub lut_import_dir: Option<PathBuf>,
    pub work_dir: PathBuf,
    pub webhook_secret: String,
    pub signature_tolerance_secs: u64,
    pub admin_api_token: Option<String>,
    pub asset_api_url: String,
    pub asset_api_token: String,
    pub ffmpeg_bin: PathBuf,
    pub ffprobe_bin: PathBuf,
    pub transcode_timeout_secs: u64,
    pub max_asset_bytes: u64,
    pub max_lut_bytes: usize,
    pub source_mode: SourceMode,
    pub job_retention_secs: u64,
    pub temp_max_age_secs: u64,
    pub sweep_interval_secs: u64,
}

impl AppConfig {
    pub fn new() -> Result<Self, std::env::VarError> {
        Ok(Self {
            server_port: env::get_parsed(EnvKey::ServerPort, 3000),
            database_url: env::get_opt(EnvKey::DatabaseUrl),
            lut_storage_dir: PathBuf::from(env::get_or(EnvKey::LutStorageDir, "./data/luts")),
            lut_import_dir: env::get_opt(EnvKey::LutImportDir).map(PathBuf::from),
            work_dir: PathBuf::from(env::get_or(EnvKey::WorkDir, "/tmp/lut-grader")),
            webhook_secret: env::get(EnvKey::WebhookSecret)?,
            signature_tolerance_secs: env::get_parsed(EnvKey::SignatureToleranceSecs, 300),
            admin_api_token: env::get_opt(EnvKey::AdminApiToken),
            asset_api_url: env::get(EnvKey::AssetApiUrl)?,
            asset_api_token: env::get(EnvKey::AssetApiToken)?,
            ffmpeg_bin: PathBuf::from(env::get_or(EnvKey::FfmpegBin, "ffmpeg")),
            ffprobe_bin: PathBuf::from(env::get_or(EnvKey::FfprobeBin, "ffprobe")),
            transcode_timeout_secs: env::get_parsed(EnvKey::TranscodeTimeoutSecs, 1800),
            max_asset_bytes: env::get_parsed(EnvKey::MaxAssetBytes, 10 * GIB),
            max_lut_bytes: env::get_parsed(EnvKey::MaxLutBytes, 16 * MIB),
            source_mode: env::get_parsed(EnvKey::SourceMode, SourceMode::Download),
            job_retention_secs: env::get_parsed(EnvKey::JobRetentionSecs, 86_400),
            temp_max_age_secs: env::get_parsed(EnvKey::TempMaxAgeSecs, 21_600),
            sweep_interval_secs: env::get_parsed(EnvKey::SweepIntervalSecs, 900),
        })
    }

    pub fn transcode_timeout(&self) -> Duration {
        Duration::from_secs(self.transcode_timeout_secs)
    }

    pub fn signature_tolerance(&self) -> Duration {
        Duration::from_secs(self.signature_tolerance_secs)
    }
}
