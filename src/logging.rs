//! Process logging: one line per event, to the console and to a dated file.
//!
//! Lines look like `2026-10-17 09:30:00 - INFO - message`. The file sink
//! goes through a non-blocking writer, so the returned [`LogGuard`] must be
//! kept alive for as long as the process logs and dropped at shutdown to
//! flush what is still buffered.
//!
//! Line timestamps are local time, while the daily file rotation follows the
//! UTC date, so around local midnight a record can sit in the file named for
//! the neighbouring day.

use chrono::Local;
use std::any::Any;
use std::backtrace::Backtrace;
use std::fmt;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::{NonBlockingBuilder, WorkerGuard};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_core::{Event, Subscriber};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::LookupSpan;

use crate::error::{Result, WebhookError};

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const DEFAULT_FILE_PREFIX: &str = "webhook";
const DEFAULT_FILTER: &str = "info";

/// `<timestamp> - <LEVEL> - <message>` event format shared by both sinks
#[derive(Debug, Clone, Copy, Default)]
pub struct LineFormat;

impl<S, N> FormatEvent<S, N> for LineFormat
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        write!(
            writer,
            "{} - {} - ",
            Local::now().format(TIMESTAMP_FORMAT),
            event.metadata().level()
        )?;
        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

/// Wraps the log file so a failed write is reported on stderr instead
/// of being lost or surfacing to the code that logged.
struct FileSink<W> {
    inner: W,
}

impl<W: Write> Write for FileSink<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if let Err(e) = self.inner.write_all(buf) {
            eprintln!(
                "{} - ERROR - failed to write log record to file: {}",
                Local::now().format(TIMESTAMP_FORMAT),
                e
            );
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Best-effort text of a panic payload.
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Route panics through the log sinks with their location and a backtrace,
/// regardless of `RUST_BACKTRACE`.
pub fn install_panic_hook() {
    std::panic::set_hook(Box::new(|info| {
        let location = info
            .location()
            .map(|l| format!("{}:{}:{}", l.file(), l.line(), l.column()))
            .unwrap_or_else(|| "unknown location".to_string());
        let thread = std::thread::current();
        tracing::error!(
            "Thread '{}' panicked at {}: {}\n{}",
            thread.name().unwrap_or("<unnamed>"),
            location,
            panic_message(info.payload()),
            Backtrace::force_capture()
        );
    }));
}

/// Registry with the console layer and, when given, a file layer writing
/// through `sink` on a background worker.
fn layered<W>(
    sink: Option<W>,
) -> (impl Subscriber + Send + Sync + 'static, Option<WorkerGuard>)
where
    W: Write + Send + 'static,
{
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let console_layer = tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .event_format(LineFormat)
        .with_writer(io::stdout);

    let (file_layer, worker) = match sink {
        Some(inner) => {
            let (writer, worker) = NonBlockingBuilder::default()
                .lossy(false)
                .finish(FileSink { inner });
            let layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .event_format(LineFormat)
                .with_writer(writer);
            (Some(layer), Some(worker))
        }
        None => (None, None),
    };

    let subscriber = tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer);

    (subscriber, worker)
}

/// Keeps the file sink alive; dropping it flushes pending records.
pub struct LogGuard {
    _worker: Option<WorkerGuard>,
    log_directory: Option<PathBuf>,
    fallback_reason: Option<String>,
}

impl LogGuard {
    /// Directory of the file sink, `None` when running console-only.
    pub fn log_directory(&self) -> Option<&Path> {
        self.log_directory.as_deref()
    }

    /// Why the file sink could not be opened, if it could not.
    pub fn fallback_reason(&self) -> Option<&str> {
        self.fallback_reason.as_deref()
    }
}

pub struct LogFacility {
    log_directory: PathBuf,
    file_prefix: String,
    rotation: Rotation,
}

impl LogFacility {
    pub fn new(log_directory: impl Into<PathBuf>) -> Self {
        Self {
            log_directory: log_directory.into(),
            file_prefix: DEFAULT_FILE_PREFIX.to_string(),
            rotation: Rotation::DAILY,
        }
    }

    pub fn with_file_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.file_prefix = prefix.into();
        self
    }

    pub fn with_rotation(mut self, rotation: Rotation) -> Self {
        self.rotation = rotation;
        self
    }

    fn open_file_sink(&self) -> std::result::Result<RollingFileAppender, String> {
        // Safe to call when the directory already exists
        std::fs::create_dir_all(&self.log_directory).map_err(|e| {
            format!(
                "failed to create log directory {}: {}",
                self.log_directory.display(),
                e
            )
        })?;

        RollingFileAppender::builder()
            .rotation(self.rotation.clone())
            .filename_prefix(&self.file_prefix)
            .filename_suffix("log")
            .build(&self.log_directory)
            .map_err(|e| format!("failed to open log file: {}", e))
    }

    /// Build the subscriber without installing it.
    ///
    /// Falls back to console-only output when the file sink cannot be opened.
    pub fn build(&self) -> (impl Subscriber + Send + Sync + 'static, LogGuard) {
        match self.open_file_sink() {
            Ok(appender) => {
                let (subscriber, worker) = layered(Some(appender));
                let guard = LogGuard {
                    _worker: worker,
                    log_directory: Some(self.log_directory.clone()),
                    fallback_reason: None,
                };
                (subscriber, guard)
            }
            Err(reason) => {
                let (subscriber, worker) = layered(None::<RollingFileAppender>);
                let guard = LogGuard {
                    _worker: worker,
                    log_directory: None,
                    fallback_reason: Some(reason),
                };
                (subscriber, guard)
            }
        }
    }

    /// Build the subscriber, install it as the process-wide default and
    /// send panics through it.
    pub fn initialize(&self) -> Result<LogGuard> {
        let (subscriber, guard) = self.build();
        tracing::subscriber::set_global_default(subscriber)
            .map_err(|e| WebhookError::LoggingError(e.to_string()))?;
        install_panic_hook();

        if let Some(reason) = guard.fallback_reason() {
            tracing::warn!("Logging to console only: {}", reason);
        }
        Ok(guard)
    }
}
