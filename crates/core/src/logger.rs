use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;
use std::sync::{mpsc, Mutex, MutexGuard, OnceLock};

use chrono::Local;

static LOGGER: OnceLock<Mutex<Logger>> = OnceLock::new();

struct Logger {
    file: Option<File>,
    ui_tx: Option<mpsc::Sender<String>>,
    echo: bool,
    prefixes: HashMap<String, u8>, // prefix -> color index
}

// Color indices understood by the TUI log panel
pub const COLOR_GRAY: u8 = 1;
pub const COLOR_BLUE: u8 = 2;
pub const COLOR_MAGENTA: u8 = 3;
pub const COLOR_GREEN: u8 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Info,
    Warn,
    Error,
}

impl Level {
    fn tag(self) -> &'static str {
        match self {
            Level::Info => "INFO",
            Level::Warn => "WARN",
            Level::Error => "ERROR",
        }
    }
}

fn lock() -> Option<MutexGuard<'static, Logger>> {
    LOGGER
        .get()
        .map(|l| l.lock().unwrap_or_else(|poisoned| poisoned.into_inner()))
}

/// Initialize the global logger, truncating `lastsec.log` in `log_dir`.
pub fn init(log_dir: &Path) -> io::Result<()> {
    fs::create_dir_all(log_dir)?;
    let file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(log_dir.join("lastsec.log"))?;

    LOGGER
        .set(Mutex::new(Logger {
            file: Some(file),
            ui_tx: None,
            echo: false,
            prefixes: HashMap::new(),
        }))
        .ok();
    Ok(())
}

/// Route log lines to the TUI log panel.
pub fn set_ui_sender(tx: mpsc::Sender<String>) {
    if let Some(mut l) = lock() {
        l.ui_tx = Some(tx);
    }
}

/// Also print plain lines to stdout (headless mode).
pub fn set_echo(echo: bool) {
    if let Some(mut l) = lock() {
        l.echo = echo;
    }
}

/// Register a prefix with a color used by `*_p` calls.
pub fn register_prefix(prefix: &str, color: u8) {
    if let Some(mut l) = lock() {
        l.prefixes.insert(prefix.to_string(), color);
    }
}

/// UI lines use \x1f as field separator:
/// level\x1fprefix\x1fcolor\x1ftimestamp\x1fmessage
fn write_log(level: Level, prefix: &str, msg: &str) {
    let Some(mut l) = lock() else { return };
    let ts = Local::now().format("%H:%M:%S%.3f").to_string();
    let color = l.prefixes.get(prefix).copied().unwrap_or(0);

    let plain = if prefix.is_empty() {
        format!("[{}] [{}] {}", ts, level.tag(), msg)
    } else {
        format!("[{}] [{}] [{}] {}", ts, level.tag(), prefix, msg)
    };

    if let Some(file) = l.file.as_mut() {
        writeln!(file, "{}", plain).ok();
    }
    if l.echo {
        println!("{}", plain);
    }
    if let Some(tx) = &l.ui_tx {
        tx.send(format!("{}\x1f{}\x1f{}\x1f{}\x1f{}", level.tag(), prefix, color, ts, msg))
            .ok();
    }
}

pub fn info(msg: &str) {
    write_log(Level::Info, "", msg);
}

pub fn warn(msg: &str) {
    write_log(Level::Warn, "", msg);
}

pub fn error(msg: &str) {
    write_log(Level::Error, "", msg);
}

pub fn info_p(prefix: &str, msg: &str) {
    write_log(Level::Info, prefix, msg);
}

pub fn warn_p(prefix: &str, msg: &str) {
    write_log(Level::Warn, prefix, msg);
}

pub fn error_p(prefix: &str, msg: &str) {
    write_log(Level::Error, prefix, msg);
}
