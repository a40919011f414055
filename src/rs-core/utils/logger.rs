use std::{fmt, rc::Rc};

use crate::bindings::{jsLog, LogLevel};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum LoggerLevel {
    None = 0,
    Error = 1,
    Warn = 2,
    Info = 3,
    Debug = 4,
}

impl fmt::Display for LoggerLevel {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{}",
            match self {
                LoggerLevel::None => "NONE",
                LoggerLevel::Error => "ERROR",
                LoggerLevel::Warn => "WARNING",
                LoggerLevel::Info => "INFO",
                LoggerLevel::Debug => "DEBUG",
            }
        )
    }
}

/// Destination of the logs emitted through a `Logger`.
pub trait LogSink {
    /// Output the given already-formatted `text`, emitted with the given `level`.
    ///
    /// `level` is never `LoggerLevel::None`.
    fn log(&self, level: LoggerLevel, text: &str);
}

/// `LogSink` forwarding logs to the JavaScript console through the `jsLog` binding.
///
/// Only usable when running in a JavaScript environment.
pub struct JsConsoleSink;

impl LogSink for JsConsoleSink {
    fn log(&self, level: LoggerLevel, text: &str) {
        let js_level = match level {
            LoggerLevel::Error | LoggerLevel::None => LogLevel::Error,
            LoggerLevel::Warn => LogLevel::Warn,
            LoggerLevel::Info => LogLevel::Info,
            LoggerLevel::Debug => LogLevel::Debug,
        };
        jsLog(js_level, text);
    }
}

/// `LogSink` forwarding logs to the `tracing` ecosystem, for native embedders.
pub struct TracingSink;

impl LogSink for TracingSink {
    fn log(&self, level: LoggerLevel, text: &str) {
        match level {
            LoggerLevel::None => {}
            LoggerLevel::Error => tracing::error!("{}", text),
            LoggerLevel::Warn => tracing::warn!("{}", text),
            LoggerLevel::Info => tracing::info!("{}", text),
            LoggerLevel::Debug => tracing::debug!("{}", text),
        }
    }
}

/// Logger instance given to each component at construction.
///
/// A `Logger` created through `Logger::default()` discards every log. Cloning a `Logger` is
/// cheap and clones share the same sink.
#[derive(Clone)]
pub struct Logger {
    sink: Option<Rc<dyn LogSink>>,
    max_level: LoggerLevel,
}

impl Default for Logger {
    fn default() -> Self {
        Self {
            sink: None,
            max_level: LoggerLevel::None,
        }
    }
}

impl fmt::Debug for Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Logger")
            .field("has_sink", &self.sink.is_some())
            .field("max_level", &self.max_level)
            .finish()
    }
}

impl Logger {
    /// Creates a new `Logger` emitting logs with a level up to `max_level` to `sink`.
    pub fn new(sink: Rc<dyn LogSink>, max_level: LoggerLevel) -> Self {
        Self {
            sink: Some(sink),
            max_level,
        }
    }

    /// Returns a clone of this `Logger` with a different maximum level.
    pub fn with_level(&self, max_level: LoggerLevel) -> Self {
        Self {
            sink: self.sink.clone(),
            max_level,
        }
    }

    /// Returns `true` if logs of the given level would currently be emitted.
    pub fn has_level(&self, level: LoggerLevel) -> bool {
        level != LoggerLevel::None && self.sink.is_some() && self.max_level >= level
    }

    pub fn error(&self, text: &str) {
        self.emit(LoggerLevel::Error, text);
    }

    pub fn warn(&self, text: &str) {
        self.emit(LoggerLevel::Warn, text);
    }

    pub fn info(&self, text: &str) {
        self.emit(LoggerLevel::Info, text);
    }

    pub fn debug(&self, text: &str) {
        self.emit(LoggerLevel::Debug, text);
    }

    pub fn lazy_info(&self, func: &dyn Fn() -> String) {
        if self.has_level(LoggerLevel::Info) {
            self.emit(LoggerLevel::Info, &func());
        }
    }

    pub fn lazy_debug(&self, func: &dyn Fn() -> String) {
        if self.has_level(LoggerLevel::Debug) {
            self.emit(LoggerLevel::Debug, &func());
        }
    }

    fn emit(&self, level: LoggerLevel, text: &str) {
        if let Some(sink) = &self.sink {
            if level != LoggerLevel::None && self.max_level >= level {
                sink.log(level, text);
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use super::test_utils::MemorySink;
    use super::*;

    #[test]
    fn test_default_logger_is_silent() {
        let logger = Logger::default();
        assert!(!logger.has_level(LoggerLevel::Error));
        logger.error("nothing");
    }

    #[test]
    fn test_level_filtering() {
        let sink = Rc::new(MemorySink::default());
        let logger = Logger::new(sink.clone(), LoggerLevel::Warn);
        logger.error("e");
        logger.warn("w");
        logger.info("i");
        logger.debug("d");
        logger.lazy_debug(&|| panic!("should not be called"));
        let logs = sink.logs.borrow();
        assert_eq!(logs.len(), 2);
        assert_eq!(logs[0], (LoggerLevel::Error, "e".to_owned()));
        assert_eq!(logs[1], (LoggerLevel::Warn, "w".to_owned()));
    }

    #[test]
    fn test_with_level_shares_sink() {
        let sink = Rc::new(MemorySink::default());
        let logger = Logger::new(sink.clone(), LoggerLevel::Error);
        let verbose = logger.with_level(LoggerLevel::Debug);
        verbose.lazy_debug(&|| "lazy".to_owned());
        logger.debug("ignored");
        assert_eq!(sink.logs.borrow().len(), 1);
    }
}
