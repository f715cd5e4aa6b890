// rloraprs - Logging Module
// Leveled console/file logger and hex dump helper

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::sync::{Arc, Mutex};

pub const LOG_ERROR: u8 = 3;
pub const LOG_WARN: u8 = 4;
pub const LOG_NOTICE: u8 = 5;
pub const LOG_INFO: u8 = 6;
pub const LOG_DEBUG: u8 = 7;

pub struct Logger {
    file: Option<Arc<Mutex<File>>>,
    log_level: u8,
    log_to_console: bool,
}

impl Logger {
    pub fn new(logfile: Option<String>, log_level: u8, log_to_console: bool) -> Result<Self, std::io::Error> {
        let file = if let Some(path) = logfile {
            let f = OpenOptions::new().create(true).append(true).open(path)?;
            Some(Arc::new(Mutex::new(f)))
        } else { None };
        Ok(Logger { file, log_level, log_to_console })
    }

    /// Logger that swallows everything.
    #[cfg(test)]
    pub fn silent() -> Self {
        Logger { file: None, log_level: 0, log_to_console: false }
    }

    pub fn enabled(&self, level: u8) -> bool {
        level <= self.log_level
    }

    pub fn log(&self, message: &str, level: u8) {
        if !self.enabled(level) { return; }
        let timestamp = chrono::Local::now().format("%Y-%m-%d %H:%M:%S");
        let log_line = format!("[{}] [{}] {}\n", timestamp, level_name(level), message);
        if self.log_to_console { print!("{}", log_line); }
        if let Some(ref file) = self.file {
            if let Ok(mut f) = file.lock() {
                let _ = f.write_all(log_line.as_bytes());
            }
        }
    }
}

pub fn level_name(level: u8) -> &'static str {
    match level {
        0 => "EMERG", 1 => "ALERT", 2 => "CRIT", 3 => "ERROR", 4 => "WARN",
        5 => "NOTICE", 6 => "INFO", 7 => "DEBUG", 8 => "TRACE", 9 => "VERBOSE",
        _ => "UNKNOWN",
    }
}

/// xxd-style dump, 16 bytes per row.
pub fn hex_dump(data: &[u8], title: &str) -> String {
    let mut out = format!("=== {} ({} bytes) ===\n", title, data.len());
    for (i, chunk) in data.chunks(16).enumerate() {
        out.push_str(&format!("{:08x}: ", i * 16));
        for (j, byte) in chunk.iter().enumerate() {
            out.push_str(&format!("{:02x} ", byte));
            if j == 7 { out.push(' '); }
        }
        for j in chunk.len()..16 {
            if j == 8 { out.push(' '); }
            out.push_str("   ");
        }
        out.push(' ');
        for byte in chunk {
            out.push(if (0x20..=0x7e).contains(byte) { *byte as char } else { '.' });
        }
        out.push('\n');
    }
    out
}
