//! Logging setup with daily files and cleanup
//!
//! Logs always go to stderr. With a log directory configured they are also
//! appended to one file per day, and files older than 7 days are removed at
//! startup.

use anyhow::Result;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

const LOG_RETENTION_DAYS: u64 = 7;
const LOG_PREFIX: &str = "csbot";

pub struct LogManager {
    log_dir: PathBuf,
}

impl LogManager {
    pub fn new(log_dir: PathBuf) -> Self {
        Self { log_dir }
    }

    pub fn current_log_path(&self) -> PathBuf {
        let today = chrono::Local::now().format("%Y-%m-%d");
        self.log_dir.join(format!("{}.{}.log", LOG_PREFIX, today))
    }

    fn is_log_file(path: &Path) -> bool {
        path.is_file()
            && path
                .file_name()
                .and_then(|n| n.to_str())
                .map(|n| n.starts_with(LOG_PREFIX) && n.ends_with(".log"))
                .unwrap_or(false)
    }

    /// Removes log files last modified before `cutoff`; returns how many went.
    pub fn cleanup_before(&self, cutoff: SystemTime) -> Result<usize> {
        let mut deleted = 0;
        for entry in fs::read_dir(&self.log_dir)? {
            let entry = entry?;
            let path = entry.path();
            if !Self::is_log_file(&path) {
                continue;
            }
            if entry.metadata()?.modified()? >= cutoff {
                continue;
            }
            match fs::remove_file(&path) {
                Ok(()) => deleted += 1,
                Err(e) => eprintln!("Failed to delete old log {}: {}", path.display(), e),
            }
        }
        Ok(deleted)
    }

    pub fn cleanup_old_logs(&self) -> Result<usize> {
        let retention = Duration::from_secs(LOG_RETENTION_DAYS * 24 * 60 * 60);
        self.cleanup_before(SystemTime::now() - retention)
    }
}

pub struct LoggingGuard {
    _guard: Option<WorkerGuard>,
}

fn env_filter(log_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new("info"))
    })
}

pub fn init_logging(log_dir: Option<&Path>, log_level: &str) -> Result<LoggingGuard> {
    let Some(log_dir) = log_dir else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_ansi(true)
                    .with_target(true)
                    .with_filter(env_filter(log_level)),
            )
            .try_init()?;
        return Ok(LoggingGuard { _guard: None });
    };

    fs::create_dir_all(log_dir)?;
    let manager = LogManager::new(log_dir.to_path_buf());
    let cleaned = manager.cleanup_old_logs()?;

    let file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(manager.current_log_path())?;
    let (non_blocking, guard) = tracing_appender::non_blocking(file);

    let file_layer = fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_target(true)
        .with_line_number(true)
        .with_filter(env_filter(log_level));

    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(true)
        .with_target(true)
        .with_filter(env_filter(log_level));

    tracing_subscriber::registry()
        .with(file_layer)
        .with(stderr_layer)
        .try_init()?;

    if cleaned > 0 {
        tracing::info!("Cleaned up {} old log file(s)", cleaned);
    }
    Ok(LoggingGuard {
        _guard: Some(guard),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("csbot-logs-{}", uuid::Uuid::new_v4()));
        fs::create_dir_all(&dir).expect("create scratch dir");
        dir
    }

    #[test]
    fn current_log_is_prefixed_and_dated() {
        let manager = LogManager::new(PathBuf::from("/var/log/csbot"));
        let name = manager
            .current_log_path()
            .file_name()
            .and_then(|n| n.to_str())
            .map(str::to_string)
            .expect("file name");
        assert!(name.starts_with("csbot."));
        assert!(name.ends_with(".log"));
    }

    #[test]
    fn cleanup_only_touches_bot_logs() {
        let dir = scratch_dir();
        fs::write(dir.join("csbot.2020-01-01.log"), "old").expect("write");
        fs::write(dir.join("other.log"), "keep").expect("write");
        fs::write(dir.join("csbot.notes.txt"), "keep").expect("write");

        let manager = LogManager::new(dir.clone());
        let future = SystemTime::now() + Duration::from_secs(60);
        assert_eq!(manager.cleanup_before(future).expect("cleanup"), 1);

        assert!(!dir.join("csbot.2020-01-01.log").exists());
        assert!(dir.join("other.log").exists());
        assert!(dir.join("csbot.notes.txt").exists());
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn recent_logs_survive_retention_cleanup() {
        let dir = scratch_dir();
        fs::write(dir.join("csbot.today.log"), "fresh").expect("write");

        let manager = LogManager::new(dir.clone());
        assert_eq!(manager.cleanup_old_logs().expect("cleanup"), 0);
        assert!(dir.join("csbot.today.log").exists());
        let _ = fs::remove_dir_all(&dir);
    }
}
