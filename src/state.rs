use std::sync::Arc;

use crate::common::error::PipelineError;
use crate::common::security::SignatureVerifier;
use crate::common::transfer::TransferEngine;
use crate::config::settings::AppConfig;
use crate::infrastructure::asset_store::AssetStore;
use crate::media::probe::MediaProber;
use crate::media::runner::TranscodeRunner;
use crate::modules::job::service::JobCoordinator;
use crate::modules::lut::repository::LutCatalog;
use crate::modules::lut::service::LutRegistry;
use crate::workers::transcoder::GradingPipeline;

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub registry: LutRegistry,
    pub jobs: JobCoordinator,
    pub verifier: SignatureVerifier,
}

impl AppState {
    pub fn new(config: AppConfig, registry: LutRegistry, jobs: JobCoordinator) -> Self {
        let verifier = SignatureVerifier::new(&config.webhook_secret, config.signature_tolerance());
        Self {
            config,
            registry,
            jobs,
            verifier,
        }
    }

    /// Wires the registry and the grading pipeline from configuration.
    pub fn assemble(
        config: AppConfig,
        catalog: Arc<dyn LutCatalog>,
        assets: Arc<dyn AssetStore>,
    ) -> Result<Self, PipelineError> {
        let registry = LutRegistry::new(catalog, &config.lut_storage_dir);
        let pipeline = GradingPipeline::new(
            registry.clone(),
            assets,
            TransferEngine::new(config.max_asset_bytes)?,
            MediaProber::new(&config.ffprobe_bin),
            TranscodeRunner::new(&config.ffmpeg_bin, config.transcode_timeout()),
            &config.work_dir,
            config.source_mode,
        );
        let jobs = JobCoordinator::new(pipeline);

        Ok(Self::new(config, registry, jobs))
    }
}
