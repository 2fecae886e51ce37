use crate::log::{LogMessage, Severity};
use crossbeam_channel::{unbounded, Receiver, Sender};
use std::fs::{create_dir_all, File, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::sync::{Mutex, OnceLock};

/// Global logger instance
static GLOBAL_LOGGER: OnceLock<Logger> = OnceLock::new();

/// Log file configuration
const LOG_FILE_MAX_SIZE: u64 = 1024 * 1024; // 1MB
const LOG_FILE_MAX_COUNT: usize = 5;
const LOG_FILE_NAME: &str = "player.log";

/// File-based log writer with rotation
#[derive(Debug)]
pub struct LogFileWriter {
    log_dir: PathBuf,
    current_file: Option<File>,
    current_size: u64,
    max_size: u64,
}

impl LogFileWriter {
    /// Writes under `<config dir>/sova/logs`.
    pub fn new() -> Result<Self, std::io::Error> {
        let mut path = dirs::config_dir()
            .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));
        path.push("sova");
        path.push("logs");
        Self::in_dir(path, LOG_FILE_MAX_SIZE)
    }

    pub fn in_dir(log_dir: PathBuf, max_size: u64) -> Result<Self, std::io::Error> {
        create_dir_all(&log_dir)?;
        Ok(LogFileWriter {
            log_dir,
            current_file: None,
            current_size: 0,
            max_size,
        })
    }

    fn current_log_path(&self) -> PathBuf {
        self.log_dir.join(LOG_FILE_NAME)
    }

    fn rotate_logs(&mut self) -> Result<(), std::io::Error> {
        self.current_file = None;

        for i in (1..LOG_FILE_MAX_COUNT).rev() {
            let old_path = self.log_dir.join(format!("{}.{}", LOG_FILE_NAME, i));
            if !old_path.exists() {
                continue;
            }
            if i == LOG_FILE_MAX_COUNT - 1 {
                std::fs::remove_file(&old_path)?;
            } else {
                let new_path = self.log_dir.join(format!("{}.{}", LOG_FILE_NAME, i + 1));
                std::fs::rename(&old_path, &new_path)?;
            }
        }

        let current_path = self.current_log_path();
        if current_path.exists() {
            std::fs::rename(&current_path, self.log_dir.join(format!("{}.1", LOG_FILE_NAME)))?;
        }

        self.current_size = 0;
        Ok(())
    }

    fn ensure_file_open(&mut self) -> Result<(), std::io::Error> {
        if self.current_file.is_none() {
            let path = self.current_log_path();
            self.current_file = Some(OpenOptions::new().create(true).append(true).open(&path)?);
            if let Ok(metadata) = std::fs::metadata(&path) {
                self.current_size = metadata.len();
            }
        }
        Ok(())
    }

    pub fn write_log(&mut self, log_msg: &LogMessage) -> Result<(), std::io::Error> {
        self.ensure_file_open()?;

        let formatted = format!("{}\n", log_msg);
        let bytes = formatted.as_bytes();

        if self.current_size + bytes.len() as u64 > self.max_size {
            self.rotate_logs()?;
            self.ensure_file_open()?;
        }

        if let Some(file) = self.current_file.as_mut() {
            file.write_all(bytes)?;
            file.flush()?;
            self.current_size += bytes.len() as u64;
        }
        Ok(())
    }

    pub fn log_file_path(&self) -> PathBuf {
        self.current_log_path()
    }
}

/// Logger operating mode
#[derive(Debug, Clone)]
pub enum LoggerMode {
    /// Terminal only
    Standalone,
    /// Forward to a channel, typically drained by a UI
    Embedded(Sender<LogMessage>),
    /// Rotating log file only
    File,
    /// Rotating log file and terminal
    Full,
}

/// Process-wide logger shared by the player, its worker thread and the host.
///
/// Never call it from the render thread: every mode may lock or block.
pub struct Logger {
    mode: Mutex<LoggerMode>,
    file_writer: Mutex<Option<LogFileWriter>>,
    min_level: Mutex<Severity>,
}

impl Logger {
    pub fn new(mode: LoggerMode) -> Self {
        let needs_file = matches!(mode, LoggerMode::File | LoggerMode::Full);
        let logger = Logger {
            mode: Mutex::new(mode),
            file_writer: Mutex::new(None),
            min_level: Mutex::new(Severity::Debug),
        };
        if needs_file {
            logger.open_file_writer();
        }
        logger
    }

    fn open_file_writer(&self) {
        if let Ok(mut file_writer) = self.file_writer.lock() {
            if file_writer.is_none() {
                *file_writer = match LogFileWriter::new() {
                    Ok(writer) => Some(writer),
                    Err(e) => {
                        eprintln!("Failed to create log file writer: {}", e);
                        None
                    }
                };
            }
        }
    }

    pub fn set_mode(&self, mode: LoggerMode) {
        let needs_file = matches!(mode, LoggerMode::File | LoggerMode::Full);
        if let Ok(mut current) = self.mode.lock() {
            *current = mode;
        }
        if needs_file {
            self.open_file_writer();
        }
    }

    /// Replaces the file writer, e.g. to log into a specific directory.
    pub fn set_file_writer(&self, writer: LogFileWriter) {
        if let Ok(mut file_writer) = self.file_writer.lock() {
            *file_writer = Some(writer);
        }
    }

    /// Messages less severe than `level` are discarded.
    pub fn set_min_level(&self, level: Severity) {
        if let Ok(mut min) = self.min_level.lock() {
            *min = level;
        }
    }

    pub fn log_file_path(&self) -> Option<PathBuf> {
        self.file_writer
            .lock()
            .ok()
            .and_then(|w| w.as_ref().map(|w| w.log_file_path()))
    }

    fn to_terminal(log_msg: &LogMessage) {
        match log_msg.level {
            Severity::Fatal | Severity::Error => {
                eprintln!("{}", log_msg);
                let _ = std::io::stderr().flush();
            }
            _ => {
                println!("{}", log_msg);
                let _ = std::io::stdout().flush();
            }
        }
    }

    fn to_file(&self, log_msg: &LogMessage) {
        if let Ok(mut file_writer) = self.file_writer.lock() {
            if let Some(writer) = file_writer.as_mut() {
                if let Err(e) = writer.write_log(log_msg) {
                    eprintln!("Failed to write to log file: {}", e);
                }
            }
        }
    }

    /// Log a message with the specified severity
    pub fn log(&self, level: Severity, msg: String) {
        if self.min_level.lock().map(|min| level > *min).unwrap_or(false) {
            return;
        }
        let log_msg = LogMessage::new(level, msg);

        if let Ok(mode) = self.mode.lock() {
            match &*mode {
                LoggerMode::Standalone => Self::to_terminal(&log_msg),
                LoggerMode::Embedded(sender) => {
                    if sender.try_send(log_msg.clone()).is_err() {
                        eprintln!("Logger channel error: {}", log_msg);
                    }
                }
                LoggerMode::File => self.to_file(&log_msg),
                LoggerMode::Full => {
                    self.to_file(&log_msg);
                    Self::to_terminal(&log_msg);
                }
            }
        }
    }

    pub fn debug(&self, msg: String) {
        self.log(Severity::Debug, msg);
    }

    pub fn info(&self, msg: String) {
        self.log(Severity::Info, msg);
    }

    pub fn warn(&self, msg: String) {
        self.log(Severity::Warn, msg);
    }

    pub fn error(&self, msg: String) {
        self.log(Severity::Error, msg);
    }

    pub fn fatal(&self, msg: String) {
        self.log(Severity::Fatal, msg);
    }
}

/// Initialize the global logger. Later calls are ignored; use
/// [`Logger::set_mode`] to switch modes at runtime.
pub fn init(mode: LoggerMode) {
    let _ = GLOBAL_LOGGER.set(Logger::new(mode));
}

/// Create a logging channel pair for [`LoggerMode::Embedded`]
pub fn create_log_channel() -> (Sender<LogMessage>, Receiver<LogMessage>) {
    unbounded()
}

/// Get the global logger instance, standalone by default
pub fn get_logger() -> &'static Logger {
    GLOBAL_LOGGER.get_or_init(|| Logger::new(LoggerMode::Standalone))
}

#[macro_export]
macro_rules! log_debug {
    ($($arg:tt)*) => {
        $crate::logger::get_logger().debug(format!($($arg)*))
    };
}

#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {
        $crate::logger::get_logger().info(format!($($arg)*))
    };
}

#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {
        $crate::logger::get_logger().warn(format!($($arg)*))
    };
}

#[macro_export]
macro_rules! log_error {
    ($($arg:tt)*) => {
        $crate::logger::get_logger().error(format!($($arg)*))
    };
}

#[macro_export]
macro_rules! log_fatal {
    ($($arg:tt)*) => {
        $crate::logger::get_logger().fatal(format!($($arg)*))
    };
}

/// Drop-in replacement for println! that goes through the logging system
#[macro_export]
macro_rules! log_println {
    () => {
        $crate::logger::get_logger().info(String::new())
    };
    ($($arg:tt)*) => {
        $crate::logger::get_logger().info(format!($($arg)*))
    };
}

/// Drop-in replacement for eprintln! that goes through the logging system
#[macro_export]
macro_rules! log_eprintln {
    () => {
        $crate::logger::get_logger().error(String::new())
    };
    ($($arg:tt)*) => {
        $crate::logger::get_logger().error(format!($($arg)*))
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_writer_rotates() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = LogFileWriter::in_dir(dir.path().to_path_buf(), 64).unwrap();
        for i in 0..10 {
            writer
                .write_log(&LogMessage::new(Severity::Info, format!("line number {}", i)))
                .unwrap();
        }
        assert!(writer.log_file_path().exists());
        assert!(dir.path().join("player.log.1").exists());
        assert!(!dir.path().join("player.log.5").exists());
    }

    #[test]
    fn embedded_mode_forwards_and_filters() {
        let (tx, rx) = create_log_channel();
        let logger = Logger::new(LoggerMode::Embedded(tx));
        logger.set_min_level(Severity::Info);
        logger.debug("hidden".to_string());
        logger.warn("shown".to_string());
        let msg = rx.try_recv().unwrap();
        assert_eq!(msg.level, Severity::Warn);
        assert_eq!(msg.to_string(), "[WARN] shown");
        assert!(rx.try_recv().is_err());
    }
}
