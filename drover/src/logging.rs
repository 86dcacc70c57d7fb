// Logging System for Drover
//
// This module provides a unified logging interface for the drover task
// execution core, built on the `tracing` ecosystem.
//
// # Usage Examples
//
// ```rust
// use drover::logging;
//
// // Initialize with default settings (INFO level, console output)
// logging::init_default();
//
// // Or initialize with custom settings
// let config = logging::LogConfig {
//     level: tracing::Level::DEBUG,
//     json_format: false,
//     ..Default::default()
// };
// logging::init(config);
// ```

use std::sync::Once;
use tracing::{Level, Subscriber};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Configuration for the drover logging system
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Minimum log level to display
    pub level: Level,
    /// Whether to use JSON format for logs
    pub json_format: bool,
    /// Whether to include file and line information
    pub show_file_line: bool,
    /// Whether to include thread name/id
    pub show_thread_info: bool,
    /// Target filter expressions (format: "target=level,target2=level2,...")
    pub target_filters: Option<String>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            json_format: false,
            show_file_line: true,
            show_thread_info: true,
            target_filters: None,
        }
    }
}

// Initialization guard to ensure we only initialize once
static INIT: Once = Once::new();

/// Initialize the logging system with the given configuration
///
/// Sets up the global tracing subscriber. Safe to call multiple times; only
/// the first call takes effect.
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
            .with_ansi(atty::is(atty::Stream::Stdout))
            .with_file(config.show_file_line)
            .with_line_number(config.show_file_line)
            .with_thread_names(config.show_thread_info)
            .with_thread_ids(config.show_thread_info);

        let registry = tracing_subscriber::registry().with(env_filter);

        let subscriber: Box<dyn Subscriber + Send + Sync> = if config.json_format {
            Box::new(registry.with(fmt::layer().json().flatten_event(true)))
        } else {
            Box::new(registry.with(fmt_layer))
        };

        if let Err(err) = tracing::subscriber::set_global_default(subscriber) {
            eprintln!("Error setting global tracing subscriber: {}", err);
        }
    });
}

/// Initialize default logging (INFO level, human-readable console output)
pub fn init_default() {
    init(LogConfig::default());
}

/// Initialize logging optimized for development environments
///
/// DEBUG level overall, TRACE for pool internals, file/line information on.
pub fn init_development() {
    init(LogConfig {
        level: Level::DEBUG,
        json_format: false,
        show_file_line: true,
        show_thread_info: true,
        target_filters: Some("drover=debug,drover::pool=trace".to_string()),
    });
}

/// Initialize logging optimized for production environments
///
/// JSON format for log aggregators, no file/line information.
pub fn init_production() {
    init(LogConfig {
        level: Level::INFO,
        json_format: true,
        show_file_line: false,
        show_thread_info: true,
        target_filters: None,
    });
}

/// Initialize logging for testing
///
/// Warnings and errors only, compact output.
pub fn init_test() {
    init(LogConfig {
        level: Level::WARN,
        json_format: false,
        show_file_line: true,
        show_thread_info: false,
        target_filters: None,
    });
}

/// Log pool scheduling events
///
/// # Examples
///
/// ```rust,ignore
/// log_pool!("dispatch", "work_admitted", queue_depth = 10, priority = 50);
/// ```
#[macro_export]
macro_rules! log_pool {
    ($component:expr, $event:expr) => {
        tracing::debug!(component = $component, event = $event);
    };
    ($component:expr, $event:expr, $($fields:tt)*) => {
        tracing::debug!(component = $component, event = $event, $($fields)*);
    };
}

/// Log action-manager lifecycle events
///
/// # Examples
///
/// ```rust,ignore
/// log_manager!("purge-queues", "completed", success = 1000, error = 0);
/// ```
#[macro_export]
macro_rules! log_manager {
    ($name:expr, $event:expr) => {
        tracing::info!(manager = $name, event = $event);
    };
    ($name:expr, $event:expr, $($fields:tt)*) => {
        tracing::info!(manager = $name, event = $event, $($fields)*);
    };
}

// Re-export the most commonly used tracing macros for convenience
pub use tracing::{debug, error, info, trace, warn};
