//! Logging and output control
//!
//! This module provides the [`Logger`] handed to the pipeline, the registry client and the
//! pruner. It supports quiet, verbose and captured output. Log lines go to stderr so that
//! report tables written to stdout stay machine-readable.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Logger responsible for all diagnostic output
#[derive(Debug, Clone)]
pub struct Logger {
    pub verbose: bool,
    pub quiet: bool,
    pub start_time: Option<Instant>,
    captured: Option<Arc<Mutex<Vec<String>>>>,
}

impl Logger {
    pub fn new(verbose: bool) -> Self {
        Self {
            verbose,
            quiet: false,
            start_time: Some(Instant::now()),
            captured: None,
        }
    }

    pub fn new_quiet() -> Self {
        Self {
            verbose: false,
            quiet: true,
            start_time: Some(Instant::now()),
            captured: None,
        }
    }

    /// Records every line (all levels) in memory instead of printing it.
    pub fn capturing() -> Self {
        Self {
            verbose: true,
            quiet: true,
            start_time: None,
            captured: Some(Arc::new(Mutex::new(Vec::new()))),
        }
    }

    /// Lines recorded by a [`Logger::capturing`] logger, in emission order
    pub fn captured_lines(&self) -> Vec<String> {
        match &self.captured {
            Some(lines) => lines.lock().map(|l| l.clone()).unwrap_or_default(),
            None => Vec::new(),
        }
    }

    /// Main section heading
    pub fn section(&self, title: &str) {
        self.emit("SECTION", title, !self.quiet);
    }

    /// Sub-section heading
    pub fn subsection(&self, title: &str) {
        self.emit("SUBSECTION", title, self.verbose && !self.quiet);
    }

    pub fn debug(&self, message: &str) {
        self.emit("DEBUG", message, self.verbose && !self.quiet);
    }

    /// Information message
    pub fn info(&self, message: &str) {
        self.emit("INFO", message, !self.quiet);
    }

    /// Success message
    pub fn success(&self, message: &str) {
        self.emit("SUCCESS", message, !self.quiet);
    }

    /// Warning message
    pub fn warning(&self, message: &str) {
        self.emit("WARN", message, !self.quiet);
    }

    /// Error message, printed even in quiet mode
    pub fn error(&self, message: &str) {
        self.emit("ERROR", message, self.captured.is_none());
    }

    /// Detailed information (only shown in verbose mode)
    pub fn detail(&self, message: &str) {
        self.emit("DETAIL", message, self.verbose && !self.quiet);
    }

    /// Key-value pair summary display
    pub fn summary_kv(&self, title: &str, items: &[(&str, String)]) {
        self.section(title);
        for (key, value) in items {
            self.info(&format!("  {}: {}", key, value));
        }
    }

    /// Format duration in human-readable format
    pub fn format_duration(&self, duration: Duration) -> String {
        let secs = duration.as_secs();
        if secs < 60 {
            format!("{:.1}s", duration.as_secs_f64())
        } else if secs < 3600 {
            format!("{}m{:02}s", secs / 60, secs % 60)
        } else {
            format!("{}h{:02}m{:02}s", secs / 3600, (secs % 3600) / 60, secs % 60)
        }
    }

    pub fn elapsed_time(&self) -> String {
        match self.start_time {
            Some(start_time) => self.format_duration(start_time.elapsed()),
            None => "Unknown".to_string(),
        }
    }

    fn emit(&self, level: &str, message: &str, visible: bool) {
        if let Some(lines) = &self.captured {
            if let Ok(mut lines) = lines.lock() {
                lines.push(format!("{} {}", level, message));
            }
            return;
        }
        if !visible {
            return;
        }

        let prefix = match level {
            "SECTION" => "\n📋",
            "SUBSECTION" => "  📂",
            "DEBUG" => "🐛 DEBUG:",
            "INFO" => "ℹ️ ",
            "SUCCESS" => "✅",
            "WARN" => "⚠️  WARNING:",
            "ERROR" => "❌ ERROR:",
            _ => "   ",
        };

        if self.verbose {
            let timestamp = match self.start_time {
                Some(start_time) => format!("[{:8.3}s] ", start_time.elapsed().as_secs_f64()),
                None => String::new(),
            };
            eprintln!("{}{} {}", timestamp, prefix, message);
        } else {
            eprintln!("{} {}", prefix, message);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capturing_logger_records_all_levels() {
        let logger = Logger::capturing();
        logger.debug("one");
        logger.warning("two");
        logger.error("three");

        let lines = logger.captured_lines();
        assert_eq!(lines, vec!["DEBUG one", "WARN two", "ERROR three"]);
    }

    #[test]
    fn test_clones_share_capture_buffer() {
        let logger = Logger::capturing();
        let clone = logger.clone();
        clone.info("from clone");
        assert_eq!(logger.captured_lines(), vec!["INFO from clone"]);
    }

    #[test]
    fn test_format_duration() {
        let logger = Logger::new_quiet();
        assert_eq!(logger.format_duration(Duration::from_millis(1500)), "1.5s");
        assert_eq!(logger.format_duration(Duration::from_secs(125)), "2m05s");
        assert_eq!(logger.format_duration(Duration::from_secs(3725)), "1h02m05s");
    }
}
