use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use time::OffsetDateTime;
use tokio::fs;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::modules::job::store::JobStore;

#[derive(Debug, Clone, Copy)]
pub struct SweepPolicy {
    pub interval: Duration,
    pub job_retention: Duration,
    pub temp_max_age: Duration,
}

/// Periodically forgets finished jobs and clears abandoned work dirs.
pub async fn run_sweeper(
    store: Arc<JobStore>,
    work_root: impl AsRef<Path>,
    policy: SweepPolicy,
    shutdown: CancellationToken,
) {
    let work_root = work_root.as_ref().to_path_buf();
    let mut ticker = tokio::time::interval(policy.interval);
    info!("🧹 Sweeper running every {}s", policy.interval.as_secs());

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                info!("🧹 Sweeper stopped");
                break;
            }
            _ = ticker.tick() => {
                let purged = store.purge_expired(OffsetDateTime::now_utc(), policy.job_retention);
                let removed = remove_stale_entries(&work_root, policy.temp_max_age, SystemTime::now()).await;
                if purged > 0 || removed > 0 {
                    info!(purged_jobs = purged, removed_temp = removed, "🧹 Sweep finished");
                }
            }
        }
    }
}

/// Deletes direct children of `root` last modified more than `max_age` before `now`.
pub async fn remove_stale_entries(root: &Path, max_age: Duration, now: SystemTime) -> usize {
    let mut entries = match fs::read_dir(root).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return 0,
        Err(e) => {
            warn!("Cannot scan {}: {}", root.display(), e);
            return 0;
        }
    };

    let mut removed = 0;
    loop {
        let entry = match entries.next_entry().await {
            Ok(Some(entry)) => entry,
            Ok(None) => break,
            Err(e) => {
                warn!("Cannot scan {}: {}", root.display(), e);
                break;
            }
        };

        let path = entry.path();
        let Ok(meta) = entry.metadata().await else {
            continue;
        };
        let age = meta
            .modified()
            .ok()
            .and_then(|modified| now.duration_since(modified).ok())
            .unwrap_or_default();
        if age <= max_age {
            continue;
        }

        let result = if meta.is_dir() {
            fs::remove_dir_all(&path).await
        } else {
            fs::remove_file(&path).await
        };
        match result {
            Ok(()) => {
                debug!(path = %path.display(), "Removed stale temp entry");
                removed += 1;
            }
            Err(e) => warn!("Failed to remove {}: {}", path.display(), e),
        }
    }
    removed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn only_old_entries_are_removed() {
        let root = tempfile::tempdir().unwrap();
        std::fs::create_dir(root.path().join("job-a")).unwrap();
        std::fs::write(root.path().join("job-a").join("source.mov"), b"x").unwrap();
        std::fs::write(root.path().join("stray.tmp"), b"y").unwrap();

        let now = SystemTime::now();
        assert_eq!(remove_stale_entries(root.path(), Duration::from_secs(3600), now).await, 0);

        let later = now + Duration::from_secs(7200);
        assert_eq!(remove_stale_entries(root.path(), Duration::from_secs(3600), later).await, 2);
        assert!(std::fs::read_dir(root.path()).unwrap().next().is_none());
    }

    #[tokio::test]
    async fn missing_root_is_not_an_error() {
        let root = tempfile::tempdir().unwrap();
        let gone = root.path().join("nope");
        assert_eq!(remove_stale_entries(&gone, Duration::ZERO, SystemTime::now()).await, 0);
    }

    #[tokio::test]
    async fn cancellation_stops_the_loop() {
        let root = tempfile::tempdir().unwrap();
        let token = CancellationToken::new();
        let policy = SweepPolicy {
            interval: Duration::from_millis(10),
            job_retention: Duration::from_secs(60),
            temp_max_age: Duration::from_secs(60),
        };
        let handle = tokio::spawn(run_sweeper(
            Arc::new(JobStore::new()),
            root.path().to_path_buf(),
            policy,
            token.clone(),
        ));

        token.cancel();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
