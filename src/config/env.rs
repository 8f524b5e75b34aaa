use std::env;
use std::str::FromStr;

pub enum EnvKey {
    ServerPort,
    DatabaseUrl,
    LutStorageDir,
    LutImportDir,
    WorkDir,
    WebhookSecret,
    SignatureToleranceSecs,
    AdminApiToken,
    AssetApiUrl,
    AssetApiToken,
    FfmpegBin,
    FfprobeBin,
    TranscodeTimeoutSecs,
    MaxAssetBytes,
    MaxLutBytes,
    SourceMode,
    JobRetentionSecs,
    TempMaxAgeSecs,
    SweepIntervalSecs,
}

impl EnvKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            EnvKey::ServerPort => "APP_PORT",
            EnvKey::DatabaseUrl => "DATABASE_URL",
            EnvKey::LutStorageDir => "LUT_STORAGE_DIR",
            EnvKey::LutImportDir => "LUT_IMPORT_DIR",
            EnvKey::WorkDir => "WORK_DIR",
            EnvKey::WebhookSecret => "WEBHOOK_SECRET",
            EnvKey::SignatureToleranceSecs => "SIGNATURE_TOLERANCE_SECS",
            EnvKey::AdminApiToken => "ADMIN_API_TOKEN",
            EnvKey::AssetApiUrl => "ASSET_API_URL",
            EnvKey::AssetApiToken => "ASSET_API_TOKEN",
            EnvKey::FfmpegBin => "FFMPEG_BIN",
            EnvKey::FfprobeBin => "FFPROBE_BIN",
            EnvKey::TranscodeTimeoutSecs => "TRANSCODE_TIMEOUT_SECS",
            EnvKey::MaxAssetBytes => "MAX_ASSET_BYTES",
            EnvKey::MaxLutBytes => "MAX_LUT_BYTES",
            EnvKey::SourceMode => "SOURCE_MODE",
            EnvKey::JobRetentionSecs => "JOB_RETENTION_SECS",
            EnvKey::TempMaxAgeSecs => "TEMP_MAX_AGE_SECS",
            EnvKey::SweepIntervalSecs => "SWEEP_INTERVAL_SECS",
        }
    }
}

pub fn get(key: EnvKey) -> Result<String, env::VarError> {
    env::var(key.as_str())
}

pub fn get_opt(key: EnvKey) -> Option<String> {
    env::var(key.as_str()).ok().filter(|v| !v.trim().is_empty())
}

pub fn get_or(key: EnvKey, default: &str) -> String {
    env::var(key.as_str()).unwrap_or_else(|_| default.to_string())
}

pub fn get_parsed<T: FromStr>(key: EnvKey, default: T) -> T {
    match get(key) {
        Ok(val) => val.parse::<T>().unwrap_or(default),
        Err(_) => default,
    }
}
