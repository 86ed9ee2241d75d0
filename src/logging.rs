//! Logging bootstrap
//!
//! `RUST_LOG` wins when set; otherwise the configured level applies to this
//! crate and to the HTTP trace layer.

use crate::error::{IedpError, Result};
use std::path::PathBuf;
use tracing::Level;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Map a configured level name to a tracing level
///
/// Accepts DEBUG, INFO, WARNING (or WARN), ERROR and CRITICAL, any case.
pub fn parse_level(level: &str) -> Option<Level> {
    match level.trim().to_ascii_uppercase().as_str() {
        "TRACE" => Some(Level::TRACE),
        "DEBUG" => Some(Level::DEBUG),
        "INFO" => Some(Level::INFO),
        "WARNING" | "WARN" => Some(Level::WARN),
        "ERROR" | "CRITICAL" => Some(Level::ERROR),
        _ => None,
    }
}

/// `minutely`, `hourly`, `daily` or `never`, any case
pub fn parse_rotation(rotation: &str) -> Option<Rotation> {
    match rotation.trim().to_ascii_lowercase().as_str() {
        "minutely" => Some(Rotation::MINUTELY),
        "hourly" => Some(Rotation::HOURLY),
        "daily" => Some(Rotation::DAILY),
        "never" => Some(Rotation::NEVER),
        _ => None,
    }
}

/// Where and how the log file rolls
#[derive(Debug, Clone)]
pub struct LogFile {
    /// `logs/iedp.log` rolls into `logs/iedp.<date>.log`
    pub path: PathBuf,
    pub rotation: Rotation,
    /// Rolled files kept on disk; the oldest are deleted past this
    pub max_files: usize,
}

impl LogFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            rotation: Rotation::DAILY,
            max_files: 7,
        }
    }

    pub fn with_rotation(mut self, rotation: Rotation, max_files: usize) -> Self {
        self.rotation = rotation;
        self.max_files = max_files;
        self
    }
}

/// Open the rolling appender for `file`, creating its directory
pub fn rolling_appender(file: &LogFile) -> Result<RollingFileAppender> {
    let directory = match file.path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&directory).map_err(|e| IedpError::Io {
        source: e,
        context: format!("Failed to create log directory: {:?}", directory),
    })?;

    let prefix = file
        .path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "iedp".to_string());

    let mut builder = RollingFileAppender::builder()
        .rotation(file.rotation.clone())
        .filename_prefix(prefix)
        .max_log_files(file.max_files.max(1));
    if let Some(extension) = file.path.extension() {
        builder = builder.filename_suffix(extension.to_string_lossy().into_owned());
    }

    builder.build(&directory).map_err(|e| IedpError::InvalidConfigValue {
        path: "app.log_file".to_string(),
        message: format!("Failed to open log file in {:?}: {}", directory, e),
    })
}

/// Install the global subscriber: compact stderr output plus an optional
/// plain-text rolling file. Calling this again after a subscriber exists does
/// nothing.
pub fn init_logging(level: &str, log_file: Option<&LogFile>) -> Result<()> {
    let level = parse_level(level).ok_or_else(|| IedpError::InvalidConfigValue {
        path: "app.log_level".to_string(),
        message: format!("Unknown log level: {}", level),
    })?;
    let directive = level.as_str().to_ascii_lowercase();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("iedp={directive},tower_http={directive}"))
    });

    let file_layer = match log_file {
        Some(file) => Some(
            fmt::layer()
                .with_ansi(false)
                .with_writer(rolling_appender(file)?),
        ),
        None => None,
    };

    let stderr_layer = fmt::layer()
        .compact()
        .with_target(false)
        .with_writer(std::io::stderr);

    if tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
        .is_err()
    {
        tracing::debug!("Logging already initialized");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::path::Path;
    use tempfile::TempDir;

    /// Files in `dir` whose names start with `prefix`
    fn files_with_prefix(dir: &Path, prefix: &str) -> Vec<String> {
        std::fs::read_dir(dir)
            .map(|entries| {
                entries
                    .filter_map(|e| e.ok())
                    .map(|e| e.file_name().to_string_lossy().into_owned())
                    .filter(|name| name.starts_with(prefix))
                    .collect()
            })
            .unwrap_or_default()
    }

    #[test]
    fn test_parse_level() {
        assert_eq!(parse_level("debug"), Some(Level::DEBUG));
        assert_eq!(parse_level("WARNING"), Some(Level::WARN));
        assert_eq!(parse_level("Critical"), Some(Level::ERROR));
        assert_eq!(parse_level("verbose"), None);
    }

    #[test]
    fn test_parse_rotation() {
        assert_eq!(parse_rotation("Daily"), Some(Rotation::DAILY));
        assert_eq!(parse_rotation("never"), Some(Rotation::NEVER));
        assert_eq!(parse_rotation("weekly"), None);
    }

    #[test]
    fn test_rolled_file_is_dated() {
        let temp = TempDir::new().unwrap();
        let file = LogFile::new(temp.path().join("logs").join("iedp.log"));

        let mut appender = rolling_appender(&file).unwrap();
        appender.write_all(b"hello\n").unwrap();
        appender.flush().unwrap();

        let names = files_with_prefix(&temp.path().join("logs"), "iedp.");
        assert_eq!(names.len(), 1);
        let today = chrono::Utc::now().format("%Y-%m-%d").to_string();
        assert_eq!(names[0], format!("iedp.{}.log", today));
    }

    #[test]
    fn test_never_rotation_keeps_plain_name() {
        let temp = TempDir::new().unwrap();
        let file = LogFile::new(temp.path().join("app.log")).with_rotation(Rotation::NEVER, 3);

        rolling_appender(&file).unwrap();
        assert!(temp.path().join("app.log").exists());
    }

    #[test]
    fn test_init_twice_is_noop() {
        let temp = TempDir::new().unwrap();
        let file = LogFile::new(temp.path().join("logs").join("iedp.log"));

        init_logging("INFO", Some(&file)).unwrap();
        init_logging("DEBUG", None).unwrap();
        assert_eq!(files_with_prefix(&temp.path().join("logs"), "iedp.").len(), 1);
    }

    #[test]
    fn test_unknown_level_rejected() {
        assert!(init_logging("LOUD", None).is_err());
    }
}
