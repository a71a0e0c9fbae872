use std::fs::OpenOptions;
use std::io::{ self, Write };
use std::str::FromStr;
use std::sync::Mutex;
use chrono::Utc;
//  order of log (Debug < Info < Warning < Error).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Debug = 0,
    Info = 1,
    Warning = 2,
    Error = 3,
}

impl LogLevel {
    fn as_str(&self) -> &str {
        match self {
            LogLevel::Info => "INFO",
            LogLevel::Warning => "WARN",
            LogLevel::Error => "ERROR",
            LogLevel::Debug => "DEBUG",
        }
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warning" | "warn" => Ok(LogLevel::Warning),
            "error" => Ok(LogLevel::Error),
            other =>
                Err(
                    format!("Invalid log level: {}. Valid options: debug, info, warning, error", other)
                ),
        }
    }
}

/// Appends timestamped lines to a match log. A disabled logger swallows everything,
/// which is what library callers get unless they hand one in.
pub struct Logger {
    file_path: Option<String>,
    file_mutex: Mutex<()>,
    echo: bool,
    min_level: LogLevel,
}

impl Logger {
    pub fn new(file_path: &str, min_level: LogLevel) -> Result<Self, io::Error> {
        // ensure file exists
        OpenOptions::new().create(true).append(true).open(file_path)?;
        Ok(Logger {
            file_path: Some(file_path.to_string()),
            file_mutex: Mutex::new(()),
            echo: false,
            min_level,
        })
    }

    /// Logger that only writes to stderr.
    pub fn console(min_level: LogLevel) -> Self {
        Logger {
            file_path: None,
            file_mutex: Mutex::new(()),
            echo: true,
            min_level,
        }
    }

    pub fn disabled() -> Self {
        Logger {
            file_path: None,
            file_mutex: Mutex::new(()),
            echo: false,
            min_level: LogLevel::Error,
        }
    }

    pub fn with_echo(mut self, echo: bool) -> Self {
        self.echo = echo;
        self
    }

    fn should_log(&self, level: LogLevel) -> bool {
        (self.file_path.is_some() || self.echo) && level >= self.min_level
    }

    pub fn log(&self, level: LogLevel, message: &str) -> Result<(), io::Error> {
        if !self.should_log(level) {
            return Ok(());
        }

        // a poisoned lock only means another writer panicked mid-line
        let _guard = self.file_mutex.lock().unwrap_or_else(|e| e.into_inner());

        let formatted_message = format!(
            "[{}] [{}] {}\n",
            Utc::now().format("%Y-%m-%d %H:%M:%S UTC"),
            level.as_str(),
            message
        );

        if self.echo {
            eprint!("{}", formatted_message);
        }
        if let Some(path) = &self.file_path {
            let mut file = OpenOptions::new().create(true).append(true).open(path)?;
            file.write_all(formatted_message.as_bytes())?;
            file.flush()?;
        }
        Ok(())
    }

    pub fn log_fmt(&self, level: LogLevel, args: std::fmt::Arguments) -> Result<(), io::Error> {
        if !self.should_log(level) {
            return Ok(());
        }
        self.log(level, &format!("{}", args))
    }

    pub fn info(&self, message: &str) -> Result<(), io::Error> {
        self.log(LogLevel::Info, message)
    }
    pub fn warn(&self, message: &str) -> Result<(), io::Error> {
        self.log(LogLevel::Warning, message)
    }
    pub fn error(&self, message: &str) -> Result<(), io::Error> {
        self.log(LogLevel::Error, message)
    }
    pub fn debug(&self, message: &str) -> Result<(), io::Error> {
        self.log(LogLevel::Debug, message)
    }

    pub fn info_fmt(&self, args: std::fmt::Arguments) -> Result<(), io::Error> {
        self.log_fmt(LogLevel::Info, args)
    }
    pub fn warn_fmt(&self, args: std::fmt::Arguments) -> Result<(), io::Error> {
        self.log_fmt(LogLevel::Warning, args)
    }
    pub fn error_fmt(&self, args: std::fmt::Arguments) -> Result<(), io::Error> {
        self.log_fmt(LogLevel::Error, args)
    }
    pub fn debug_fmt(&self, args: std::fmt::Arguments) -> Result<(), io::Error> {
        self.log_fmt(LogLevel::Debug, args)
    }

    pub fn file_path(&self) -> Option<&str> {
        self.file_path.as_deref()
    }
}

// The engine never fails a run because a log line could not be written, so these
// macros discard the io::Result. Use the methods directly where that matters.
#[macro_export]
macro_rules! log_info {
    (
        $logger:expr,
        $($arg:tt)*
    ) => {
        { let _ = $logger.info_fmt(format_args!($($arg)*)); }
    };
}
#[macro_export]
macro_rules! log_warn {
    (
        $logger:expr,
        $($arg:tt)*
    ) => {
        { let _ = $logger.warn_fmt(format_args!($($arg)*)); }
    };
}
#[macro_export]
macro_rules! log_error {
    (
        $logger:expr,
        $($arg:tt)*
    ) => {
        { let _ = $logger.error_fmt(format_args!($($arg)*)); }
    };
}
#[macro_export]
macro_rules! log_debug {
    (
        $logger:expr,
        $($arg:tt)*
    ) => {
        { let _ = $logger.debug_fmt(format_args!($($arg)*)); }
    };
}
