use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::fs;
use tracing::{info, warn};
use uuid::Uuid;

use crate::common::error::PipelineError;
use crate::common::transfer::{TransferEngine, TransferProgress};
use crate::config::settings::SourceMode;
use crate::infrastructure::asset_store::AssetStore;
use crate::media::filter_graph::{LutRef, build_recipe};
use crate::media::probe::MediaProber;
use crate::media::runner::{TranscodeProgress, TranscodeRunner};
use crate::modules::job::model::{AppliedLut, JobProgress, JobResult, JobStage, JobStatus, MediaSummary};
use crate::modules::job::store::JobStore;
use crate::modules::lut::error::LutError;
use crate::modules::lut::service::LutRegistry;

const LUT_COPY_NAME: &str = "lut.cube";

/// Everything one grading job needs, shared by all jobs.
#[derive(Clone)]
pub struct GradingPipeline {
    registry: LutRegistry,
    assets: Arc<dyn AssetStore>,
    transfer: TransferEngine,
    prober: MediaProber,
    runner: TranscodeRunner,
    work_root: PathBuf,
    source_mode: SourceMode,
}

impl GradingPipeline {
    pub fn new(
        registry: LutRegistry,
        assets: Arc<dyn AssetStore>,
        transfer: TransferEngine,
        prober: MediaProber,
        runner: TranscodeRunner,
        work_root: impl Into<PathBuf>,
        source_mode: SourceMode,
    ) -> Self {
        Self {
            registry,
            assets,
            transfer,
            prober,
            runner,
            work_root: work_root.into(),
            source_mode,
        }
    }

    pub fn registry(&self) -> &LutRegistry {
        &self.registry
    }

    pub fn work_root(&self) -> &Path {
        &self.work_root
    }

    pub fn work_dir_for(&self, job_id: Uuid) -> PathBuf {
        self.work_root.join(job_id.to_string())
    }

    /// Drives one job from `pending` to `uploading` and returns what the
    /// completed record should hold. The caller owns the final transition.
    pub async fn run(&self, job_id: Uuid, store: &JobStore) -> Result<JobResult, PipelineError> {
        let job = store
            .snapshot(job_id)
            .ok_or_else(|| PipelineError::Internal(format!("job {} vanished before start", job_id)))?;
        store
            .transition(job_id, JobStatus::Processing)
            .map_err(|e| PipelineError::Internal(e.to_string()))?;
        let request = &job.request;

        let lut = self.registry.resolve(request.lut_id).await.map_err(|e| match e {
            LutError::NotFound(id) => PipelineError::LutNotFound(id),
            other => PipelineError::Internal(other.to_string()),
        })?;
        info!(job_id = %job_id, lut_id = %lut.id, asset_id = %request.asset_id, "🎥 Grading asset");

        let work_dir = self.work_dir_for(job_id);
        fs::create_dir_all(&work_dir)
            .await
            .map_err(|e| PipelineError::io(&work_dir, e))?;
        // The job grades with its own copy; catalog deletes from here on do not reach it.
        let lut_copy = work_dir.join(LUT_COPY_NAME);
        fs::copy(&lut.storage_path, &lut_copy)
            .await
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => PipelineError::LutNotFound(lut.id),
                _ => PipelineError::io(&lut_copy, e),
            })?;

        let asset = self
            .assets
            .get_asset(&request.account_id, &request.asset_id)
            .await?;
        if let Some(size) = asset.file_size {
            if size > self.transfer.max_download_bytes() {
                return Err(PipelineError::AssetTooLarge {
                    size,
                    limit: self.transfer.max_download_bytes(),
                });
            }
        }
        let folder_id = asset.parent_id.clone().ok_or_else(|| {
            PipelineError::Validation(format!("asset {} has no parent folder", asset.id))
        })?;
        let media_url = self
            .assets
            .original_media_url(&request.account_id, &request.asset_id)
            .await?;

        let input = match self.source_mode {
            SourceMode::Download => {
                let dest = work_dir.join(format!("source.{}", extension_of(&asset.name, "bin")));
                let mut report = transfer_reporter(store, job_id, JobStage::Downloading);
                report(TransferProgress {
                    bytes: 0,
                    total: asset.file_size,
                });
                self.transfer.fetch(&media_url, &dest, report).await?;
                dest.to_string_lossy().into_owned()
            }
            SourceMode::Stream => media_url,
        };

        let source_meta = self.prober.probe(&input).await?;
        let recipe = build_recipe(
            &source_meta,
            &LutRef {
                path: lut_copy.clone(),
                dimension: lut.dimension,
            },
            &request.options,
        );
        for note in &recipe.notes {
            info!(job_id = %job_id, "{}", note);
        }

        let output = work_dir.join(output_name(&asset.name, &lut.name, recipe.output_extension()));
        set_progress(store, job_id, JobStage::Transcoding, 0, None, Some(0.0));
        self.runner
            .run(
                &recipe,
                &input,
                &output,
                source_meta.duration_seconds,
                |p: TranscodeProgress| {
                    set_progress(
                        store,
                        job_id,
                        JobStage::Transcoding,
                        p.percent,
                        p.fps,
                        Some(p.media_seconds),
                    )
                },
            )
            .await?
            .into_result()?;

        store
            .transition(job_id, JobStatus::Uploading)
            .map_err(|e| PipelineError::Internal(e.to_string()))?;
        set_progress(store, job_id, JobStage::Uploading, 0, None, None);

        let size = fs::metadata(&output)
            .await
            .map_err(|e| PipelineError::io(&output, e))?
            .len();
        let file_name = output
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| format!("graded.{}", recipe.output_extension()));

        let plan = self
            .assets
            .create_upload(&request.account_id, &folder_id, &file_name, size)
            .await?;
        let content_type = plan
            .media_type
            .clone()
            .unwrap_or_else(|| recipe.content_type().to_string());
        self.transfer
            .upload(
                &plan.chunks,
                &output,
                &content_type,
                transfer_reporter(store, job_id, JobStage::Uploading),
            )
            .await?;
        info!(job_id = %job_id, file_id = %plan.file_id, "⬆️ Uploaded graded file");

        let stack = self
            .assets
            .create_version_stack(
                &request.account_id,
                &folder_id,
                &[asset.id.clone(), plan.file_id.clone()],
            )
            .await?;

        let comment = format!("Color graded with LUT \"{}\" ({})", lut.name, lut.id);
        if let Err(e) = self
            .assets
            .post_comment(&request.account_id, &plan.file_id, &comment)
            .await
        {
            warn!(job_id = %job_id, "Failed to post confirmation comment: {}", e);
        }

        let output_summary = match self.prober.probe_path(&output).await {
            Ok(meta) => Some(MediaSummary::from(&meta)),
            Err(e) => {
                warn!(job_id = %job_id, "Could not probe graded output: {}", e);
                None
            }
        };

        Ok(JobResult {
            output_asset_id: plan.file_id,
            version_stack_id: stack.id,
            input: MediaSummary::from(&source_meta),
            output: output_summary,
            lut_applied: AppliedLut::from(&lut),
        })
    }
}

fn set_progress(
    store: &JobStore,
    job_id: Uuid,
    stage: JobStage,
    percent: u8,
    fps: Option<f32>,
    elapsed_seconds: Option<f64>,
) {
    store.update(job_id, |job| {
        job.progress = Some(JobProgress {
            percent,
            stage,
            fps,
            elapsed_seconds,
        });
    });
}

fn transfer_reporter(
    store: &JobStore,
    job_id: Uuid,
    stage: JobStage,
) -> impl FnMut(TransferProgress) + Send + '_ {
    let mut last: Option<u8> = None;
    move |progress: TransferProgress| {
        let percent = progress.percent().unwrap_or(0);
        if last.is_some_and(|seen| seen >= percent) {
            return;
        }
        last = Some(percent);
        set_progress(store, job_id, stage, percent, None, None);
    }
}

fn extension_of<'a>(name: &'a str, fallback: &'a str) -> &'a str {
    Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .filter(|e| !e.is_empty() && e.chars().all(|c| c.is_ascii_alphanumeric()))
        .unwrap_or(fallback)
}

/// `clip.mov` graded with "Kodak 2383" becomes `clip_kodak-2383.<ext>`.
fn output_name(asset_name: &str, lut_name: &str, extension: &str) -> String {
    let stem = Path::new(asset_name)
        .file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .unwrap_or("graded");
    let mut slug = String::with_capacity(lut_name.len());
    for c in lut_name.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.ends_with('-') && !slug.is_empty() {
            slug.push('-');
        }
    }
    let slug = slug.trim_end_matches('-');
    if slug.is_empty() {
        format!("{}_graded.{}", stem, extension)
    } else {
        format!("{}_{}.{}", stem, slug, extension)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_names_carry_the_lut() {
        assert_eq!(output_name("clip.mov", "Kodak 2383", "mp4"), "clip_kodak-2383.mp4");
        assert_eq!(output_name("clip.mov", "!!", "mov"), "clip_graded.mov");
        assert_eq!(output_name("", "Teal/Orange", "mp4"), "graded_teal-orange.mp4");
    }

    #[test]
    fn odd_extensions_fall_back() {
        assert_eq!(extension_of("a.MOV", "bin"), "MOV");
        assert_eq!(extension_of("noext", "bin"), "bin");
        assert_eq!(extension_of("weird.m p4", "bin"), "bin");
    }
}
