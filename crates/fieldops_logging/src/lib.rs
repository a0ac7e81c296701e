//! Tracing setup for FieldOps binaries.
//!
//! Events go to a size-capped log file under `$FIELDOPS_HOME/logs` and, for
//! warnings (or everything with `--verbose`), to stderr.

use anyhow::{Context, Result};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

const DEFAULT_LOG_FILTER: &str = "fieldops=info,fieldops_filters=info";
const HOME_ENV: &str = "FIELDOPS_HOME";
const KEPT_GENERATIONS: usize = 5;
const MAX_FILE_BYTES: u64 = 10 * 1024 * 1024;

pub struct LogConfig<'a> {
    /// Used as the log file stem, sanitized.
    pub app_name: &'a str,
    /// Mirror the file filter on stderr instead of warnings only.
    pub verbose: bool,
}

/// Install the global subscriber. `RUST_LOG` overrides the default filter.
pub fn init_logging(config: LogConfig<'_>) -> Result<()> {
    let dir = ensure_logs_dir()?;
    let writer = RollingLog::open(&dir, config.app_name, KEPT_GENERATIONS, MAX_FILE_BYTES)
        .with_context(|| format!("Failed to open log file in {}", dir.display()))?;

    let file_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let stderr_filter = if config.verbose {
        file_filter.clone()
    } else {
        EnvFilter::new("warn")
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_filter(file_filter),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(io::stderr)
                .with_target(false)
                .with_filter(stderr_filter),
        )
        .try_init()
        .context("Tracing subscriber already installed")?;

    Ok(())
}

/// `$FIELDOPS_HOME`, else `~/.fieldops`, else `./.fieldops`.
pub fn fieldops_home() -> PathBuf {
    match std::env::var_os(HOME_ENV) {
        Some(path) if !path.is_empty() => PathBuf::from(path),
        _ => dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".fieldops"),
    }
}

pub fn logs_dir() -> PathBuf {
    fieldops_home().join("logs")
}

pub fn ensure_logs_dir() -> Result<PathBuf> {
    let dir = logs_dir();
    fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create logs directory: {}", dir.display()))?;
    Ok(dir)
}

// ============================================================================
// Size-rolled log file
// ============================================================================

/// `<name>.log` plus up to `generations - 1` older files `<name>.log.1`
/// (newest) through `<name>.log.N`. The live file is rolled before a write
/// would push it past `max_bytes`.
struct LogFile {
    live: PathBuf,
    generations: usize,
    max_bytes: u64,
    file: File,
    written: u64,
}

impl LogFile {
    fn open(dir: &Path, name: &str, generations: usize, max_bytes: u64) -> io::Result<Self> {
        fs::create_dir_all(dir)?;
        let live = dir.join(format!("{}.log", sanitize_name(name)));
        let (file, written) = open_append(&live)?;
        let mut log = Self {
            live,
            generations: generations.max(1),
            max_bytes,
            file,
            written,
        };
        if log.written > log.max_bytes {
            log.roll()?;
        }
        Ok(log)
    }

    fn generation(&self, index: usize) -> PathBuf {
        let mut name = self.live.clone().into_os_string();
        name.push(format!(".{}", index));
        PathBuf::from(name)
    }

    fn roll(&mut self) -> io::Result<()> {
        self.file.flush()?;
        let oldest = self.generations - 1;
        if oldest == 0 {
            // Nothing is kept: start the live file over.
            self.file = File::create(&self.live)?;
            self.written = 0;
            return Ok(());
        }

        remove_if_present(&self.generation(oldest))?;
        for index in (1..oldest).rev() {
            rename_if_present(&self.generation(index), &self.generation(index + 1))?;
        }
        rename_if_present(&self.live, &self.generation(1))?;

        let (file, written) = open_append(&self.live)?;
        self.file = file;
        self.written = written;
        Ok(())
    }
}

impl Write for LogFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.written > 0 && self.written + buf.len() as u64 > self.max_bytes {
            self.roll()?;
        }
        let n = self.file.write(buf)?;
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

fn open_append(path: &Path) -> io::Result<(File, u64)> {
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    let len = file.metadata()?.len();
    Ok((file, len))
}

fn remove_if_present(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Err(err) if err.kind() != io::ErrorKind::NotFound => Err(err),
        _ => Ok(()),
    }
}

fn rename_if_present(from: &Path, to: &Path) -> io::Result<()> {
    match fs::rename(from, to) {
        Err(err) if err.kind() != io::ErrorKind::NotFound => Err(err),
        _ => Ok(()),
    }
}

/// `MakeWriter` over a shared [`LogFile`]. Each event locks the file for the
/// duration of one write.
#[derive(Clone)]
struct RollingLog {
    file: Arc<Mutex<LogFile>>,
}

impl RollingLog {
    fn open(dir: &Path, name: &str, generations: usize, max_bytes: u64) -> io::Result<Self> {
        Ok(Self {
            file: Arc::new(Mutex::new(LogFile::open(dir, name, generations, max_bytes)?)),
        })
    }
}

struct RollingLogWriter<'a> {
    file: &'a Mutex<LogFile>,
}

impl<'a> MakeWriter<'a> for RollingLog {
    type Writer = RollingLogWriter<'a>;

    fn make_writer(&'a self) -> Self::Writer {
        RollingLogWriter { file: &self.file }
    }
}

impl Write for RollingLogWriter<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.file
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .flush()
    }
}

fn sanitize_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|ch| match ch {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '-' | '_' => ch,
            _ => '_',
        })
        .collect();
    if cleaned.is_empty() {
        "fieldops".to_string()
    } else {
        cleaned
    }
}
