use log::{Level, LevelFilter, Log, Metadata, Record};
use once_cell::sync::Lazy;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

static LOGGER: Lazy<FileLogger> = Lazy::new(|| FileLogger::new(exe_dir().join("seltrans.log")));

pub(crate) fn exe_dir() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(|d| d.to_path_buf()))
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Appends one line per record to a file. The file is opened on first use and
/// reopened lazily if that failed.
pub struct FileLogger {
    path: PathBuf,
    file: Mutex<Option<File>>,
}

impl FileLogger {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), file: Mutex::new(None) }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn open(&self) -> Option<File> {
        OpenOptions::new().create(true).append(true).open(&self.path).ok()
    }

    fn write_line(&self, line: &str) {
        let Ok(mut guard) = self.file.lock() else { return };
        if guard.is_none() {
            *guard = self.open();
        }
        if let Some(f) = guard.as_mut() {
            let _ = writeln!(f, "{}", line);
            let _ = f.flush();
        }
    }
}

impl Log for FileLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        self.write_line(&format_record(record));
    }

    fn flush(&self) {
        if let Ok(mut guard) = self.file.lock() {
            if let Some(f) = guard.as_mut() {
                let _ = f.flush();
            }
        }
    }
}

fn ts() -> String {
    let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
    format!("{}.{:03}", now.as_secs(), now.subsec_millis())
}

fn format_record(record: &Record) -> String {
    format!("[{}] {:<5} {}: {}", ts(), record.level(), record.target(), record.args())
}

/// Level from `SELTRANS_LOG` (`error`..`trace`, `off`), `info` otherwise.
pub fn level_from_env() -> LevelFilter {
    std::env::var("SELTRANS_LOG")
        .ok()
        .and_then(|v| v.trim().parse::<LevelFilter>().ok())
        .unwrap_or(LevelFilter::Info)
}

/// Installs the file logger. Calling it twice keeps the first logger.
pub fn init() {
    let level = level_from_env();
    if log::set_logger(&*LOGGER).is_ok() {
        log::set_max_level(level);
        LOGGER.write_line("===== seltrans start =====");
        log::log!(Level::Info, "logging to {}", LOGGER.path().display());
    }
}
