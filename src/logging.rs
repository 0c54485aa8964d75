//! Process-wide `log` backend.
//!
//! On Android records go to logcat under the `PdfViewer` tag; on every other
//! target (unit tests, desktop tooling) `env_logger` is used.

use std::sync::Once;

static INIT: Once = Once::new();

/// Installs the logger once; later calls are no-ops.
pub fn init() {
    INIT.call_once(|| {
        if let Err(e) = install() {
            // Another logger (e.g. a test harness) won the race.
            log::debug!("logger already installed: {e}");
        }
    });
}

#[cfg(target_os = "android")]
fn install() -> Result<(), log::SetLoggerError> {
    static LOGGER: logcat::LogcatLogger = logcat::LogcatLogger;
    log::set_logger(&LOGGER)?;
    log::set_max_level(log::LevelFilter::Debug);
    Ok(())
}

#[cfg(not(target_os = "android"))]
fn install() -> Result<(), log::SetLoggerError> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .try_init()
}

#[cfg(target_os = "android")]
mod logcat {
    use android_log_sys::LogPriority;
    use log::{Level, Log, Metadata, Record};
    use std::ffi::CString;

    const TAG: &[u8] = b"PdfViewer\0";

    pub struct LogcatLogger;

    fn priority(level: Level) -> LogPriority {
        match level {
            Level::Error => LogPriority::ERROR,
            Level::Warn => LogPriority::WARN,
            Level::Info => LogPriority::INFO,
            Level::Debug => LogPriority::DEBUG,
            Level::Trace => LogPriority::VERBOSE,
        }
    }

    impl Log for LogcatLogger {
        fn enabled(&self, metadata: &Metadata) -> bool {
            metadata.level() <= log::max_level()
        }

        fn log(&self, record: &Record) {
            if !self.enabled(record.metadata()) {
                return;
            }
            let msg = format!("{}: {}", record.target(), record.args()).replace('\0', "\u{fffd}");
            let Ok(c_msg) = CString::new(msg) else {
                return;
            };
            unsafe {
                android_log_sys::__android_log_write(
                    priority(record.level()) as _,
                    TAG.as_ptr() as *const _,
                    c_msg.as_ptr(),
                );
            }
        }

        fn flush(&self) {}
    }
}
