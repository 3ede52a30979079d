use env_logger::{Builder, Env, Logger};
use log::{Level, LevelFilter};
use log_reload::{ReloadHandle, ReloadLog};
use std::sync::OnceLock;

static LOG_HANDLE: OnceLock<ReloadHandle<log_reload::LevelFilter<Logger>>> = OnceLock::new();

/// Initializes logging at `log_level` for the given crates, leaving dependencies at warn.
/// Safe to call more than once: later calls swap the level on the installed logger.
pub fn init_logger(log_level: &str, crates: &[&str]) -> anyhow::Result<()> {
    let level = parse_level(log_level);

    let log_handle = LOG_HANDLE.get_or_init(|| {
        let reload_log = ReloadLog::new(build_logger(level, crates));
        let handle = reload_log.handle();

        if let Err(err) = log::set_boxed_logger(Box::new(reload_log)) {
            log::warn!("Failed to set the logger: {}", err);
        }

        handle
    });

    log_handle
        .replace(build_logger(level, crates))
        .map_err(|e| anyhow::anyhow!(e))
}

/// Unknown level names fall back to info.
pub fn parse_level(log_level: &str) -> Level {
    match log_level.trim().to_lowercase().as_str() {
        "error" => Level::Error,
        "warn" | "warning" => Level::Warn,
        "info" => Level::Info,
        "debug" => Level::Debug,
        "trace" => Level::Trace,
        _ => Level::Info,
    }
}

fn build_logger(level: Level, crates: &[&str]) -> log_reload::LevelFilter<Logger> {
    let level_filter = level.to_level_filter();

    // RUST_LOG still wins for anything it names
    let mut builder = Builder::from_env(Env::default());
    builder.filter_level(LevelFilter::Warn);
    for crate_name in crates {
        builder.filter_module(&crate_name.replace('-', "_"), level_filter);
    }

    let logger = builder.build();
    log::set_max_level(level_filter.max(LevelFilter::Warn));

    log_reload::LevelFilter::new(level, logger)
}
