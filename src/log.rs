//! Logging setup for stagegate.
//!
//! Log levels:
//! - ERROR: Storage faults and failed rollbacks
//! - WARN: Recoverable surprises (rollbacks, unreadable listing entries)
//! - INFO: Entity lifecycle (created, transitioned, archived, deleted)
//! - DEBUG: Field updates, review bookkeeping, event delivery
//!
//! Debug mode can be enabled with `--debug` flag or `STAGEGATE_DEBUG=1` env var.
//! `RUST_LOG` overrides the level filter entirely.

use std::fs::File;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

static DEBUG_ENABLED: AtomicBool = AtomicBool::new(false);

/// Initialize logging to ~/.stagegate/stagegate.log
pub fn init() {
    init_with_debug(false);
}

/// Initialize logging with explicit debug mode setting.
///
/// Safe to call more than once; only the first call installs a subscriber.
pub fn init_with_debug(debug: bool) {
    let debug_enabled = debug || env_flag(std::env::var("STAGEGATE_DEBUG").ok().as_deref());
    DEBUG_ENABLED.store(debug_enabled, Ordering::SeqCst);

    let default_level = if debug_enabled { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("stagegate={}", default_level)));

    // Truncate file on startup
    let file = log_path().and_then(|path| {
        let dir = path.parent()?;
        std::fs::create_dir_all(dir).ok()?;
        File::create(&path).ok()
    });
    let stderr = file.is_none().then(|| {
        fmt::layer()
            .with_target(false)
            .with_writer(std::io::stderr)
    });
    let file = file.map(|file| {
        fmt::layer()
            .with_ansi(false)
            .with_writer(Mutex::new(file))
    });

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(file)
        .with(stderr)
        .try_init();
}

/// Where the log file lives, if a home directory is known.
pub fn log_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".stagegate").join("stagegate.log"))
}

/// Check if debug mode is enabled.
pub fn is_debug() -> bool {
    DEBUG_ENABLED.load(Ordering::Relaxed)
}

fn env_flag(value: Option<&str>) -> bool {
    value
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}
