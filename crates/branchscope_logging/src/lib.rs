//! Logging utilities for Branchscope.
//!
//! Two pieces live here:
//! - [`init_logging`] installs the process subscriber (rolling file + stderr).
//! - [`LogLevel`] is the per-call verbosity that engine operations accept in
//!   place of a global debug toggle.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

const DEFAULT_LOG_FILTER: &str = "branchscope=info,branchscope_db=info";
const VERBOSE_LOG_FILTER: &str = "branchscope=debug,branchscope_db=debug";
const MAX_LOG_FILES: usize = 5;
const MAX_LOG_FILE_SIZE: u64 = 10 * 1024 * 1024;

/// Verbosity of a single engine call.
///
/// `Verbose` turns on per-query logging (SQL shape, counts, timings) for
/// that call only. It never changes results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Quiet,
    #[default]
    Normal,
    Verbose,
}

impl LogLevel {
    pub fn from_debug_flag(debug: bool) -> Self {
        if debug {
            LogLevel::Verbose
        } else {
            LogLevel::Normal
        }
    }

    pub fn is_verbose(self) -> bool {
        self == LogLevel::Verbose
    }

    pub fn is_quiet(self) -> bool {
        self == LogLevel::Quiet
    }
}

/// Logging configuration for the `branchscope` binary.
pub struct LogConfig<'a> {
    pub app_name: &'a str,
    pub verbose: bool,
}

/// Initialize tracing with a rolling file writer and stderr output.
pub fn init_logging(config: LogConfig<'_>) -> Result<()> {
    let log_dir = ensure_logs_dir().context("Failed to ensure log directory")?;
    let file_writer = SharedRollingWriter::new(log_dir, config.app_name)
        .context("Failed to initialize rolling log writer")?;

    let default_filter = if config.verbose {
        VERBOSE_LOG_FILTER
    } else {
        DEFAULT_LOG_FILTER
    };
    let file_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    let console_filter = if config.verbose {
        file_filter.clone()
    } else {
        EnvFilter::new("warn")
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(file_writer)
                .with_ansi(false)
                .with_filter(file_filter),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_filter(console_filter),
        )
        .try_init()
        .context("Global tracing subscriber already installed")?;

    Ok(())
}

/// Get the Branchscope home directory: ~/.branchscope
pub fn branchscope_home() -> Result<PathBuf> {
    if let Ok(override_path) = std::env::var("BRANCHSCOPE_HOME") {
        return Ok(PathBuf::from(override_path));
    }
    dirs::home_dir()
        .map(|home| home.join(".branchscope"))
        .context("Could not determine home directory; set BRANCHSCOPE_HOME")
}

/// Get the logs directory: ~/.branchscope/logs
pub fn logs_dir() -> Result<PathBuf> {
    Ok(branchscope_home()?.join("logs"))
}

/// Ensure the logs directory exists.
pub fn ensure_logs_dir() -> Result<PathBuf> {
    let logs = logs_dir()?;
    fs::create_dir_all(&logs)
        .with_context(|| format!("Failed to create logs directory: {}", logs.display()))?;
    Ok(logs)
}

struct RollingFileAppender {
    dir: PathBuf,
    base_name: String,
    max_files: usize,
    max_size: u64,
    file: Option<File>,
    current_size: u64,
}

impl RollingFileAppender {
    fn new(dir: PathBuf, base_name: &str, max_files: usize, max_size: u64) -> io::Result<Self> {
        fs::create_dir_all(&dir)?;
        let mut appender = Self {
            dir,
            base_name: sanitize_name(base_name),
            max_files: max_files.max(1),
            max_size,
            file: None,
            current_size: 0,
        };
        let (file, size) = appender.open_current_file()?;
        appender.file = Some(file);
        appender.current_size = size;
        if appender.current_size > appender.max_size {
            appender.rotate()?;
        }
        Ok(appender)
    }

    fn open_current_file(&self) -> io::Result<(File, u64)> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.current_path())?;
        let size = file.metadata()?.len();
        Ok((file, size))
    }

    fn current_path(&self) -> PathBuf {
        self.dir.join(format!("{}.log", self.base_name))
    }

    fn rotated_path(&self, index: usize) -> PathBuf {
        self.dir.join(format!("{}.log.{}", self.base_name, index))
    }

    fn rotate(&mut self) -> io::Result<()> {
        if let Some(mut file) = self.file.take() {
            let _ = file.flush();
        }

        let max_index = self.max_files.saturating_sub(1);
        if max_index > 0 {
            let oldest = self.rotated_path(max_index);
            if oldest.exists() {
                fs::remove_file(&oldest)?;
            }
            for idx in (1..max_index).rev() {
                let src = self.rotated_path(idx);
                if src.exists() {
                    fs::rename(&src, self.rotated_path(idx + 1))?;
                }
            }
            let current = self.current_path();
            if current.exists() {
                fs::rename(current, self.rotated_path(1))?;
            }
        }

        let (file, size) = self.open_current_file()?;
        self.file = Some(file);
        self.current_size = size;
        Ok(())
    }
}

impl Write for RollingFileAppender {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.current_size + buf.len() as u64 > self.max_size {
            self.rotate()?;
        }

        let file = self
            .file
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "log file unavailable"))?;
        let bytes = file.write(buf)?;
        self.current_size += bytes as u64;
        Ok(bytes)
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.file.as_mut() {
            Some(file) => file.flush(),
            None => Ok(()),
        }
    }
}

#[derive(Clone)]
struct SharedRollingWriter {
    inner: Arc<Mutex<RollingFileAppender>>,
}

impl SharedRollingWriter {
    fn new(dir: PathBuf, base_name: &str) -> Result<Self> {
        let appender = RollingFileAppender::new(dir, base_name, MAX_LOG_FILES, MAX_LOG_FILE_SIZE)
            .with_context(|| format!("Failed to open log file for {}", base_name))?;
        Ok(Self {
            inner: Arc::new(Mutex::new(appender)),
        })
    }
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for SharedRollingWriter {
    type Writer = SharedRollingWriter;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

impl Write for SharedRollingWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut guard = self
            .inner
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "log writer lock poisoned"))?;
        guard.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        let mut guard = self
            .inner
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "log writer lock poisoned"))?;
        guard.flush()
    }
}

fn sanitize_name(name: &str) -> String {
    name.chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' {
                ch
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn debug_flag_maps_to_verbose() {
        assert_eq!(LogLevel::from_debug_flag(true), LogLevel::Verbose);
        assert_eq!(LogLevel::from_debug_flag(false), LogLevel::Normal);
        assert!(LogLevel::Verbose.is_verbose());
        assert!(LogLevel::Quiet.is_quiet());
    }

    #[test]
    fn appender_rotates_when_size_exceeded() {
        let tmp = TempDir::new().unwrap();
        let mut appender =
            RollingFileAppender::new(tmp.path().to_path_buf(), "branch scope", 3, 16).unwrap();

        appender.write_all(b"0123456789").unwrap();
        appender.write_all(b"0123456789").unwrap();
        appender.flush().unwrap();

        assert!(tmp.path().join("branch_scope.log").exists());
        assert!(tmp.path().join("branch_scope.log.1").exists());
    }
}
