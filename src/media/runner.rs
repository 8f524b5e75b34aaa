use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::LazyLock;
use std::time::Duration;

use futures_util::StreamExt;
use regex::Regex;
use tokio::process::Command;
use tokio_util::codec::{AnyDelimiterCodec, FramedRead};
use tracing::{debug, warn};

use super::filter_graph::TransformRecipe;
use crate::common::error::PipelineError;

const STDERR_TAIL_LINES: usize = 20;
const STDERR_LINE_MAX: usize = 512;

static TIME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"time=\s*(-?\d+):(\d{2}):(\d{2}(?:\.\d+)?)").expect("valid time regex")
});
static FPS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"fps=\s*(\d+(?:\.\d+)?)").expect("valid fps regex"));

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TranscodeProgress {
    pub percent: u8,
    pub fps: Option<f32>,
    pub media_seconds: f64,
}

/// Turns ffmpeg status lines into strictly increasing percentages.
#[derive(Debug)]
pub struct ProgressTracker {
    total_seconds: f64,
    last_percent: u8,
}

impl ProgressTracker {
    pub fn new(total_seconds: f64) -> Self {
        Self {
            total_seconds,
            last_percent: 0,
        }
    }

    pub fn observe(&mut self, line: &str) -> Option<TranscodeProgress> {
        if !(self.total_seconds > 0.0) {
            return None;
        }

        let caps = TIME_RE.captures(line)?;
        let hours: f64 = caps[1].parse().ok()?;
        let minutes: f64 = caps[2].parse().ok()?;
        let seconds: f64 = caps[3].parse().ok()?;
        let media_seconds = hours * 3600.0 + minutes * 60.0 + seconds;
        if media_seconds < 0.0 {
            return None;
        }

        let percent = ((media_seconds / self.total_seconds) * 100.0).floor().min(100.0) as u8;
        if percent <= self.last_percent {
            return None;
        }
        self.last_percent = percent;

        let fps = FPS_RE
            .captures(line)
            .and_then(|c| c[1].parse::<f32>().ok());

        Some(TranscodeProgress {
            percent,
            fps,
            media_seconds,
        })
    }
}

#[derive(Debug)]
struct StderrTail {
    lines: VecDeque<String>,
    capacity: usize,
}

impl StderrTail {
    fn new(capacity: usize) -> Self {
        Self {
            lines: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    fn push(&mut self, line: &str) {
        if self.lines.len() == self.capacity {
            self.lines.pop_front();
        }
        let mut line = line.to_string();
        if line.len() > STDERR_LINE_MAX {
            let mut cut = STDERR_LINE_MAX;
            while !line.is_char_boundary(cut) {
                cut -= 1;
            }
            line.truncate(cut);
        }
        self.lines.push_back(line);
    }

    fn joined(&self) -> String {
        self.lines.iter().cloned().collect::<Vec<_>>().join("\n")
    }
}

#[derive(Debug, Clone)]
pub struct TranscodeOutcome {
    pub exit_ok: bool,
    pub status: String,
    /// Last non-progress stderr lines.
    pub error_output: String,
}

impl TranscodeOutcome {
    pub fn into_result(self) -> Result<(), PipelineError> {
        if self.exit_ok {
            Ok(())
        } else {
            Err(PipelineError::Transcode {
                status: self.status,
                diagnostics: self.error_output,
            })
        }
    }
}

#[derive(Clone, Debug)]
pub struct TranscodeRunner {
    ffmpeg_bin: PathBuf,
    timeout: Duration,
}

impl TranscodeRunner {
    pub fn new(ffmpeg_bin: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            ffmpeg_bin: ffmpeg_bin.into(),
            timeout,
        }
    }

    pub async fn run<F>(
        &self,
        recipe: &TransformRecipe,
        input: &str,
        output: &Path,
        total_duration_seconds: f64,
        on_progress: F,
    ) -> Result<TranscodeOutcome, PipelineError>
    where
        F: FnMut(TranscodeProgress) + Send,
    {
        let args = recipe.to_args(input, output);
        debug!(graph = %recipe.filter_graph(), "Running ffmpeg");
        self.run_command(&self.ffmpeg_bin, &args, total_duration_seconds, on_progress)
            .await
    }

    /// Supervises any ffmpeg-like command: stderr progress, bounded tail, timeout.
    pub async fn run_command<F>(
        &self,
        program: &Path,
        args: &[String],
        total_duration_seconds: f64,
        mut on_progress: F,
    ) -> Result<TranscodeOutcome, PipelineError>
    where
        F: FnMut(TranscodeProgress) + Send,
    {
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| PipelineError::Spawn {
                program: program.display().to_string(),
                source,
            })?;

        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| PipelineError::Internal("ffmpeg stderr was not captured".into()))?;

        let mut frames = FramedRead::new(
            stderr,
            AnyDelimiterCodec::new(b"\r\n".to_vec(), Vec::new()),
        );
        let mut tracker = ProgressTracker::new(total_duration_seconds);
        let mut tail = StderrTail::new(STDERR_TAIL_LINES);

        let supervised = async {
            while let Some(frame) = frames.next().await {
                let frame = match frame {
                    Ok(frame) => frame,
                    Err(e) => {
                        warn!("Stopped reading ffmpeg stderr: {}", e);
                        break;
                    }
                };
                let text = String::from_utf8_lossy(&frame);
                let line = text.trim();
                if line.is_empty() {
                    continue;
                }
                match tracker.observe(line) {
                    Some(progress) => on_progress(progress),
                    None if !TIME_RE.is_match(line) => tail.push(line),
                    None => {}
                }
            }
            child.wait().await
        };

        let waited = tokio::time::timeout(self.timeout, supervised).await;
        match waited {
            Ok(Ok(status)) => Ok(TranscodeOutcome {
                exit_ok: status.success(),
                status: status.to_string(),
                error_output: tail.joined(),
            }),
            Ok(Err(e)) => Err(PipelineError::Internal(format!(
                "failed to wait for ffmpeg: {}",
                e
            ))),
            Err(_) => {
                if let Err(e) = child.kill().await {
                    warn!("Failed to kill timed out ffmpeg: {}", e);
                }
                Err(PipelineError::Timeout(self.timeout))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_only_moves_forward() {
        let mut tracker = ProgressTracker::new(10.0);
        let lines = [
            "frame=  10 fps=25.0 q=28.0 size=256kB time=00:00:01.00 bitrate=N/A speed=1x",
            "frame=  12 fps=25.0 q=28.0 size=256kB time=00:00:01.05 bitrate=N/A speed=1x",
            "frame=   5 fps=24.0 q=28.0 size=256kB time=00:00:00.50 bitrate=N/A speed=1x",
            "frame=  75 fps=30.5 q=28.0 size=900kB time=00:00:03.00 bitrate=N/A speed=1x",
            "Stream mapping:",
            "frame= 300 fps=30.0 q=28.0 size=4096kB time=00:00:12.00 bitrate=N/A speed=1x",
        ];

        let seen: Vec<TranscodeProgress> = lines.iter().filter_map(|l| tracker.observe(l)).collect();
        let percents: Vec<u8> = seen.iter().map(|p| p.percent).collect();
        assert_eq!(percents, vec![10, 30, 100]);
        assert_eq!(seen[1].fps, Some(30.5));
    }

    #[test]
    fn unknown_duration_reports_nothing() {
        let mut tracker = ProgressTracker::new(0.0);
        assert!(tracker.observe("time=00:00:05.00 fps=25").is_none());
    }

    #[test]
    fn tail_keeps_the_last_lines() {
        let mut tail = StderrTail::new(2);
        tail.push("one");
        tail.push("two");
        tail.push("three");
        assert_eq!(tail.joined(), "two\nthree");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn failing_command_reports_progress_and_diagnostics() {
        let runner = TranscodeRunner::new("ffmpeg", Duration::from_secs(10));
        let script = "printf 'frame=1 fps=25 time=00:00:01.00\\r' >&2; \
                      printf 'frame=2 fps=25 time=00:00:02.00\\n' >&2; \
                      echo 'Invalid data found when processing input' >&2; exit 3";
        let mut percents = Vec::new();

        let outcome = runner
            .run_command(Path::new("sh"), &["-c".into(), script.into()], 2.0, |p| {
                percents.push(p.percent)
            })
            .await
            .unwrap();

        assert_eq!(percents, vec![50, 100]);
        assert!(!outcome.exit_ok);
        assert!(outcome.error_output.contains("Invalid data"));
        assert!(!outcome.error_output.contains("time="));

        let err = outcome.into_result().unwrap_err();
        assert_eq!(err.code(), "TRANSCODE_FAILED");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn hung_process_is_killed_on_timeout() {
        let runner = TranscodeRunner::new("ffmpeg", Duration::from_millis(200));
        let err = runner
            .run_command(Path::new("sh"), &["-c".into(), "sleep 30".into()], 1.0, |_| {})
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::Timeout(_)));
        assert_eq!(err.code(), "TRANSCODE_TIMEOUT");
    }

    #[tokio::test]
    async fn missing_binary_is_a_retryable_spawn_error() {
        let runner = TranscodeRunner::new("/nonexistent/ffmpeg", Duration::from_secs(1));
        let err = runner
            .run_command(Path::new("/nonexistent/ffmpeg"), &[], 1.0, |_| {})
            .await
            .unwrap_err();

        assert_eq!(err.code(), "SPAWN_ERROR");
        assert!(err.retryable());
    }
}
