// Logging setup for handover.
//
// Built on the `tracing` ecosystem. The library itself only emits events;
// embedders (and tests) can use these helpers to install a subscriber
// instead of wiring tracing-subscriber by hand.

use std::sync::Once;

use tracing::Level;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Configuration for the logging subscriber.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Minimum log level to display.
    pub level: Level,
    /// Whether to include file and line information.
    pub show_file_line: bool,
    /// Whether to include thread name/id. Worker threads are named by
    /// their pool, so this is usually worth keeping on.
    pub show_thread_info: bool,
    /// Target filter expressions ("target=level,target2=level2,...").
    pub target_filters: Option<String>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            show_file_line: false,
            show_thread_info: true,
            target_filters: None,
        }
    }
}

static INIT: Once = Once::new();

/// Installs the global subscriber with the given configuration. Safe to
/// call multiple times; only the first call takes effect.
pub fn init(config: LogConfig) {
    INIT.call_once(|| {
        let mut env_filter = EnvFilter::from_default_env().add_directive(config.level.into());
        if let Some(filters) = config.target_filters {
            for filter in filters.split(',') {
                if let Ok(directive) = filter.parse() {
                    env_filter = env_filter.add_directive(directive);
                }
            }
        }

        let fmt_layer = fmt::layer()
            .with_file(config.show_file_line)
            .with_line_number(config.show_file_line)
            .with_thread_names(config.show_thread_info)
            .with_thread_ids(config.show_thread_info);

        let subscriber = tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer);
        if let Err(err) = tracing::subscriber::set_global_default(subscriber) {
            eprintln!("Error setting global tracing subscriber: {}", err);
        }
    });
}

/// Initialize with default settings (INFO level, console output).
pub fn init_default() {
    init(LogConfig::default());
}

/// Development-friendly settings: DEBUG level with file/line info.
pub fn init_development() {
    init(LogConfig {
        level: Level::DEBUG,
        show_file_line: true,
        ..Default::default()
    });
}
