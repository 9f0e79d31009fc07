// context.rs - Per-run state: worker pool, run log, cancellation and failures

use crate::error::{HcError, Result};
use chrono::{DateTime, Utc};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::fmt;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Shared flag that stops dispatch of new work units
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Token cancelled by Ctrl-C. Can be installed once per process.
    pub fn on_interrupt() -> Result<Self> {
        let token = Self::new();
        ctrlc::set_handler(interrupt_handler(token.clone()))
            .map_err(|e| HcError::Config(format!("cannot install interrupt handler: {}", e)))?;
        Ok(token)
    }
}

/// First interrupt stops dispatch and lets the run write its records;
/// a second one exits at once.
fn interrupt_handler(token: CancelToken) -> impl FnMut() + Send + 'static {
    move || {
        if token.is_cancelled() {
            eprintln!("\n❌ Interrupted again, exiting");
            std::process::exit(130);
        }
        eprintln!("\n⚠️  Interrupt received, waiting for running jobs (Ctrl-C again to abort)");
        token.cancel();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
}

/// Timestamped run log, safe to append from worker threads
#[derive(Debug, Default)]
pub struct RunLog {
    entries: Mutex<Vec<LogEntry>>,
}

impl RunLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, level: LogLevel, message: impl Into<String>) {
        let entry = LogEntry {
            timestamp: Utc::now(),
            level,
            message: message.into(),
        };
        if let Ok(mut entries) = self.entries.lock() {
            entries.push(entry);
        }
    }

    pub fn info(&self, message: impl Into<String>) {
        self.push(LogLevel::Info, message);
    }

    pub fn warn(&self, message: impl Into<String>) {
        self.push(LogLevel::Warn, message);
    }

    pub fn error(&self, message: impl Into<String>) {
        self.push(LogLevel::Error, message);
    }

    pub fn entries(&self) -> Vec<LogEntry> {
        self.entries.lock().map(|e| e.clone()).unwrap_or_default()
    }

    pub fn count(&self, level: LogLevel) -> usize {
        self.entries
            .lock()
            .map(|e| e.iter().filter(|entry| entry.level == level).count())
            .unwrap_or(0)
    }

    /// Write every entry as `<rfc3339> [LEVEL] message`
    pub fn write_to(&self, path: &Path) -> Result<()> {
        let file = File::create(path).map_err(|e| HcError::io(path, e))?;
        let mut writer = BufWriter::new(file);
        for entry in self.entries() {
            writeln!(
                writer,
                "{} [{}] {}",
                entry.timestamp.format("%Y-%m-%dT%H:%M:%SZ"),
                entry.level,
                entry.message
            )
            .map_err(|e| HcError::io(path, e))?;
        }
        writer.flush().map_err(|e| HcError::io(path, e))?;
        Ok(())
    }
}

/// A failure recorded against one unit (group or target) without aborting the batch
#[derive(Debug, Clone, Serialize)]
pub struct UnitFailure {
    pub unit: String,
    pub group_id: Option<u32>,
    pub sequence_id: Option<String>,
    pub stage: Option<u32>,
    pub message: String,
}

impl UnitFailure {
    pub fn group(group_id: u32, message: impl Into<String>) -> Self {
        Self {
            unit: format!("group {}", group_id),
            group_id: Some(group_id),
            sequence_id: None,
            stage: None,
            message: message.into(),
        }
    }

    pub fn sequence(sequence_id: &str, stage: u32, message: impl Into<String>) -> Self {
        Self {
            unit: format!("sequence {}", sequence_id),
            group_id: None,
            sequence_id: Some(sequence_id.to_string()),
            stage: Some(stage),
            message: message.into(),
        }
    }
}

/// State scoped to a single clustering or classification run.
///
/// Owns its own rayon pool so concurrent runs in one process do not share
/// workers, counters or logs.
pub struct RunContext {
    pub log: RunLog,
    cancel: CancelToken,
    deadline: Option<Instant>,
    pool: rayon::ThreadPool,
    cores: usize,
    failures: Mutex<Vec<UnitFailure>>,
    started: Instant,
    show_progress: bool,
}

impl RunContext {
    pub fn new(cores: usize) -> Result<Self> {
        if cores == 0 {
            return Err(HcError::Config("core count must be at least 1".to_string()));
        }
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(cores)
            .build()
            .map_err(|e| HcError::Config(format!("failed to build worker pool: {}", e)))?;

        Ok(Self {
            log: RunLog::new(),
            cancel: CancelToken::new(),
            deadline: None,
            pool,
            cores,
            failures: Mutex::new(Vec::new()),
            started: Instant::now(),
            show_progress: true,
        })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.deadline = Some(Instant::now() + timeout);
        self
    }

    pub fn with_cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = token;
        self
    }

    /// Disable progress bars (tests, non-interactive runs)
    pub fn quiet(mut self) -> Self {
        self.show_progress = false;
        self
    }

    pub fn cores(&self) -> usize {
        self.cores
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// True once cancelled or past the deadline; workers check before each unit
    pub fn should_stop(&self) -> bool {
        if self.cancel.is_cancelled() {
            return true;
        }
        match self.deadline {
            Some(deadline) => Instant::now() >= deadline,
            None => false,
        }
    }

    pub fn check_cancelled(&self, during: &str) -> Result<()> {
        if self.should_stop() {
            let reason = if self.cancel.is_cancelled() {
                format!("interrupted during {}", during)
            } else {
                format!("timeout reached during {}", during)
            };
            return Err(HcError::Cancelled(reason));
        }
        Ok(())
    }

    /// Run `op` inside this run's worker pool
    pub fn install<R, F>(&self, op: F) -> R
    where
        F: FnOnce() -> R + Send,
        R: Send,
    {
        self.pool.install(op)
    }

    pub fn record_failure(&self, failure: UnitFailure) {
        self.log.error(format!("{}: {}", failure.unit, failure.message));
        if let Ok(mut failures) = self.failures.lock() {
            failures.push(failure);
        }
    }

    pub fn failures(&self) -> Vec<UnitFailure> {
        self.failures.lock().map(|f| f.clone()).unwrap_or_default()
    }

    pub fn progress_bar(&self, len: usize, message: &str) -> ProgressBar {
        if !self.show_progress {
            return ProgressBar::hidden();
        }
        let pb = ProgressBar::new(len as u64);
        if let Ok(style) = ProgressStyle::default_bar().template(
            "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg}",
        ) {
            pb.set_style(style.progress_chars("#>-"));
        }
        pb.set_message(message.to_string());
        pb
    }
}
