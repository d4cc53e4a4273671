//! Host-facing message sink.
//!
//! The library reports through the `log` facade. Hosts either install the
//! callback sink here — every record is forwarded to one severity-leveled
//! text callback — or fall back to the default sink, which writes to the
//! process's standard streams gated by severity (warnings and errors go to
//! stderr).

use log::{Level, LevelFilter, Log, Metadata, Record};

/// Severity attached to a forwarded message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum MessageLevel {
    Verbose,
    Debug,
    Notify,
    Warning,
    Error,
}

impl From<Level> for MessageLevel {
    fn from(level: Level) -> Self {
        match level {
            Level::Trace => Self::Verbose,
            Level::Debug => Self::Debug,
            Level::Info => Self::Notify,
            Level::Warn => Self::Warning,
            Level::Error => Self::Error,
        }
    }
}

/// Severity-leveled text callback supplied by the host.
pub type MessageCallback = Box<dyn Fn(MessageLevel, &str) + Send + Sync>;

struct CallbackSink {
    level: LevelFilter,
    callback: MessageCallback,
}

impl Log for CallbackSink {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let line = format!("{}", record.args());
        (self.callback)(record.level().into(), &line);
    }

    fn flush(&self) {}
}

struct StandardSink {
    level: LevelFilter,
}

impl Log for StandardSink {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let line = format!("[{}] {}", record.level(), record.args());
        if record.level() <= Level::Warn {
            eprintln!("{}", line);
        } else {
            println!("{}", line);
        }
    }

    fn flush(&self) {}
}

/// Route all library messages to a host callback.
///
/// Returns `false` if a logger was already installed for this process.
pub fn install_callback(level: LevelFilter, callback: MessageCallback) -> bool {
    let installed = log::set_boxed_logger(Box::new(CallbackSink { level, callback })).is_ok();
    if installed {
        log::set_max_level(level);
    }
    installed
}

/// Install the default standard-stream sink.
///
/// Returns `false` if a logger was already installed for this process.
pub fn init_default(level: LevelFilter) -> bool {
    let installed = log::set_boxed_logger(Box::new(StandardSink { level })).is_ok();
    if installed {
        log::set_max_level(level);
    }
    installed
}
