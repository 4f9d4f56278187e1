//! Utilities for logging.

use std::sync::Once;

use tracing::Level;
use tracing::subscriber::SetGlobalDefaultError;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::SubscriberBuilder;

/// Output format for the global subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Compact,
    Json,
}

fn env_filter(level: Level) -> EnvFilter {
    EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy()
}

fn builder(level: Level) -> SubscriberBuilder<
    tracing_subscriber::fmt::format::DefaultFields,
    tracing_subscriber::fmt::format::Format,
    EnvFilter,
> {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter(level))
        .with_file(true)
        .with_line_number(true)
}

/// Configure the global subscriber.
///
/// `RUST_LOG` takes precedence over `level` when set.
pub fn configure_global_logger(
    level: Level,
    format: LogFormat,
) -> Result<(), SetGlobalDefaultError> {
    match format {
        LogFormat::Pretty => {
            tracing::subscriber::set_global_default(builder(level).pretty().finish())
        }
        LogFormat::Compact => {
            tracing::subscriber::set_global_default(builder(level).compact().finish())
        }
        LogFormat::Json => tracing::subscriber::set_global_default(builder(level).json().finish()),
    }
}

static TEST_INIT: Once = Once::new();

/// Install a subscriber writing through the test harness.
///
/// Safe to call from every test, only the first call has an effect.
pub fn init_test() {
    TEST_INIT.call_once(|| {
        let subscriber = builder(Level::DEBUG).with_test_writer().finish();
        // Another harness may have installed a subscriber already.
        let _ = tracing::subscriber::set_global_default(subscriber);
    });
}
