//! Process logging for the sidecar.
//!
//! Stdout carries the IPC protocol, so log records go to stderr unless
//! `CURRICULUMD_LOG_DIR` points at an absolute directory, in which case a
//! size-rotated file is written there instead. `CURRICULUMD_LOG` picks the
//! level. Initialization happens at most once per process and never panics.

use flexi_logger::{
    detailed_format, Cleanup, Criterion, FileSpec, Logger, LoggerHandle, Naming, WriteMode,
};
use log::info;
use once_cell::sync::OnceCell;
use std::path::{Path, PathBuf};

pub const LEVEL_ENV: &str = "CURRICULUMD_LOG";
pub const DIR_ENV: &str = "CURRICULUMD_LOG_DIR";

const LOG_FILE_BASENAME: &str = "curriculumd";
const MAX_LOG_FILE_SIZE_BYTES: u64 = 5 * 1024 * 1024;
const MAX_LOG_FILES: usize = 3;

static LOGGER: OnceCell<LoggerHandle> = OnceCell::new();

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogTarget {
    Stderr,
    Directory(PathBuf),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    pub level: &'static str,
    pub target: LogTarget,
}

impl LogConfig {
    /// Reads the level and target from the environment. Unusable values fall
    /// back to the defaults and are reported in the returned warnings.
    pub fn from_env() -> (Self, Vec<String>) {
        let mut warnings = Vec::new();
        let level = match std::env::var(LEVEL_ENV) {
            Ok(raw) => normalize_level(&raw).unwrap_or_else(|e| {
                warnings.push(e);
                default_level()
            }),
            Err(_) => default_level(),
        };
        let target = match std::env::var(DIR_ENV) {
            Ok(raw) if !raw.trim().is_empty() => match normalize_log_dir(&raw) {
                Ok(dir) => LogTarget::Directory(dir),
                Err(e) => {
                    warnings.push(e);
                    LogTarget::Stderr
                }
            },
            _ => LogTarget::Stderr,
        };
        (Self { level, target }, warnings)
    }
}

pub fn default_level() -> &'static str {
    if cfg!(debug_assertions) {
        "debug"
    } else {
        "info"
    }
}

pub fn init_logging(config: &LogConfig) -> Result<(), String> {
    if LOGGER.get().is_some() {
        return Ok(());
    }
    let logger = Logger::try_with_str(config.level)
        .map_err(|e| format!("invalid log level `{}`: {e}", config.level))?;
    let logger = match &config.target {
        LogTarget::Stderr => logger.log_to_stderr().format(detailed_format),
        LogTarget::Directory(dir) => {
            std::fs::create_dir_all(dir)
                .map_err(|e| format!("failed to create log directory `{}`: {e}", dir.display()))?;
            logger
                .log_to_file(
                    FileSpec::default()
                        .directory(dir.as_path())
                        .basename(LOG_FILE_BASENAME),
                )
                .rotate(
                    Criterion::Size(MAX_LOG_FILE_SIZE_BYTES),
                    Naming::Numbers,
                    Cleanup::KeepLogFiles(MAX_LOG_FILES),
                )
                .write_mode(WriteMode::BufferAndFlush)
                .append()
                .format_for_files(detailed_format)
        }
    };
    let handle = logger
        .start()
        .map_err(|e| format!("failed to start logger: {e}"))?;
    // A concurrent init losing the race keeps the first handle alive.
    let _ = LOGGER.set(handle);

    info!(
        "event=sidecar_start level={} target={} version={}",
        config.level,
        match &config.target {
            LogTarget::Stderr => "stderr".to_string(),
            LogTarget::Directory(d) => d.display().to_string(),
        },
        env!("CARGO_PKG_VERSION")
    );
    Ok(())
}

fn normalize_level(level: &str) -> Result<&'static str, String> {
    match level.trim().to_ascii_lowercase().as_str() {
        "off" => Ok("off"),
        "trace" => Ok("trace"),
        "debug" => Ok("debug"),
        "info" => Ok("info"),
        "warn" | "warning" => Ok("warn"),
        "error" => Ok("error"),
        other => Err(format!(
            "unsupported log level `{other}`; expected off|trace|debug|info|warn|error"
        )),
    }
}

fn normalize_log_dir(raw: &str) -> Result<PathBuf, String> {
    let trimmed = raw.trim();
    let path = Path::new(trimmed);
    if !path.is_absolute() {
        return Err(format!("log directory must be absolute, got `{trimmed}`"));
    }
    Ok(path.to_path_buf())
}
