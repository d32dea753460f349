use crate::config::Config;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::fs;
use tracing::{error, info, warn};

/// Remove scratch entries older than `max_age`. Request handlers delete their
/// own scratch directories; anything this finds was left by a crash or kill.
/// Returns the number of entries removed.
pub async fn sweep_scratch_dir(dir: &Path, max_age: Duration) -> anyhow::Result<usize> {
    if !fs::try_exists(dir).await? {
        return Ok(0);
    }

    let now = SystemTime::now();
    let mut deleted = 0;
    let mut entries = fs::read_dir(dir).await?;

    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();

        let metadata = match fs::symlink_metadata(&path).await {
            Ok(m) => m,
            Err(e) => {
                warn!("[cleanup] Failed to get metadata for {:?}: {}", path, e);
                continue;
            }
        };

        let age = match metadata.modified().map(|m| now.duration_since(m)) {
            Ok(Ok(age)) => age,
            // unreadable or in the future
            _ => continue,
        };
        if age <= max_age {
            continue;
        }

        let removed = if metadata.is_dir() {
            fs::remove_dir_all(&path).await
        } else {
            fs::remove_file(&path).await
        };

        match removed {
            Ok(()) => {
                deleted += 1;
                info!(
                    "[cleanup] Deleted stale scratch entry {:?} (age: {:.1} min)",
                    path,
                    age.as_secs_f64() / 60.0
                );
            }
            Err(e) => error!("[cleanup] Failed to delete {:?}: {}", path, e),
        }
    }

    Ok(deleted)
}

/// Start a background task that periodically sweeps the scratch directory
pub fn start_cleanup_task(config: Arc<Config>) -> tokio::task::JoinHandle<()> {
    let max_age = Duration::from_secs(config.limits.scratch_max_age_seconds);
    let cleanup_interval = Duration::from_secs(config.limits.cleanup_interval_seconds.max(1));

    tokio::spawn(async move {
        let mut interval = tokio::time::interval(cleanup_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        info!(
            "[cleanup] Starting scratch sweeper for {:?} (interval: {:.1} min, max age: {:.1} min)",
            config.scratch_dir,
            cleanup_interval.as_secs_f64() / 60.0,
            max_age.as_secs_f64() / 60.0
        );

        loop {
            interval.tick().await;

            match sweep_scratch_dir(&config.scratch_dir, max_age).await {
                Ok(0) => {}
                Ok(deleted) => info!("[cleanup] Removed {} stale scratch entries", deleted),
                Err(e) => error!("[cleanup] Periodic cleanup error: {}", e),
            }
        }
    })
}
