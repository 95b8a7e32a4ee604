//! Bridge from the `log` facade to a host-provided logger.
//!
//! Mobile shells implement [`Logger`] (exported through UniFFI with the `ffi`
//! feature) and register it once with [`set_logger`]. Desktop hosts can skip
//! this and install any `log`-compatible subscriber instead.

use std::sync::{Arc, OnceLock};

/// Receives log records from the persistence core.
///
/// # Examples
///
/// ```rust
/// use atlas_core::logger::{LogLevel, Logger};
///
/// struct StderrLogger;
///
/// impl Logger for StderrLogger {
///     fn log(&self, level: LogLevel, message: String) {
///         eprintln!("[{level:?}] {message}");
///     }
/// }
/// ```
///
/// ## Swift
///
/// ```swift
/// final class AtlasLoggerBridge: AtlasCore.Logger {
///     func log(level: AtlasCore.LogLevel, message: String) {
///         os_log("%{public}@", message)
///     }
/// }
///
/// AtlasCore.setLogger(logger: AtlasLoggerBridge()) // once, at launch
/// ```
#[cfg_attr(feature = "ffi", uniffi::export(with_foreign))]
pub trait Logger: Sync + Send {
    /// Logs `message` at `level`.
    fn log(&self, level: LogLevel, message: String);
}

/// Severity of a log record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "ffi", derive(uniffi::Enum))]
pub enum LogLevel {
    /// Very detailed tracing.
    Trace,
    /// Debugging information.
    Debug,
    /// Normal progress.
    Info,
    /// Recoverable problems, such as a discarded snapshot.
    Warn,
    /// Failures, such as an absorbed save error.
    Error,
}

impl From<log::Level> for LogLevel {
    fn from(level: log::Level) -> Self {
        match level {
            log::Level::Error => Self::Error,
            log::Level::Warn => Self::Warn,
            log::Level::Info => Self::Info,
            log::Level::Debug => Self::Debug,
            log::Level::Trace => Self::Trace,
        }
    }
}

/// Forwards `log` records to the registered [`Logger`].
struct ForeignLogger;

impl ForeignLogger {
    /// Debug and trace records are only forwarded from this crate; other
    /// crates' chatter stays out of the host's log.
    fn should_forward(record: &log::Metadata<'_>) -> bool {
        let verbose = matches!(record.level(), log::Level::Debug | log::Level::Trace);
        !verbose || record.target().starts_with("atlas")
    }
}

impl log::Log for ForeignLogger {
    fn enabled(&self, metadata: &log::Metadata<'_>) -> bool {
        Self::should_forward(metadata)
    }

    fn log(&self, record: &log::Record<'_>) {
        if !Self::should_forward(record.metadata()) {
            return;
        }

        if let Some(logger) = LOGGER_INSTANCE.get() {
            logger.log(record.level().into(), record.args().to_string());
        } else {
            eprintln!("logger not set: {}", record.args());
        }
    }

    fn flush(&self) {}
}

static LOGGER_INSTANCE: OnceLock<Arc<dyn Logger>> = OnceLock::new();

/// Registers the host logger and routes the `log` facade to it.
///
/// Only the first call takes effect; later calls are reported on stderr and
/// otherwise ignored.
#[cfg_attr(feature = "ffi", uniffi::export)]
pub fn set_logger(logger: Arc<dyn Logger>) {
    if LOGGER_INSTANCE.set(logger).is_err() {
        eprintln!("logger already set");
    }

    if let Err(e) = init_logger() {
        eprintln!("failed to install logger: {e}");
    }
}

fn init_logger() -> Result<(), log::SetLoggerError> {
    static LOGGER: ForeignLogger = ForeignLogger;
    log::set_logger(&LOGGER)?;
    log::set_max_level(log::LevelFilter::Trace);
    Ok(())
}
