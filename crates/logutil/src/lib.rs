//! Utilities for logging.
use tracing::Level;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::MakeWriter;

/// Output format of the global logger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    HumanReadable,
    Json,
}

/// Configure the global tracing subscriber.
///
/// `default_level` is used when `RUST_LOG` isn't set. Noisy http dependencies
/// are capped at info regardless.
///
/// Does nothing if a global subscriber has already been set.
pub fn configure_global_logger<W>(default_level: Level, format: LogFormat, writer: W)
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let env_filter = env_filter(default_level);

    let result = match format {
        LogFormat::HumanReadable => {
            let subscriber = tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_writer(writer)
                .with_file(true)
                .with_line_number(true)
                .finish();
            tracing::subscriber::set_global_default(subscriber)
        }
        LogFormat::Json => {
            let subscriber = tracing_subscriber::fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(writer)
                .with_current_span(true)
                .finish();
            tracing::subscriber::set_global_default(subscriber)
        }
    };

    if let Err(e) = result {
        eprintln!("Global logger already configured: {e}");
    }
}

/// Initialize a logger for tests.
///
/// Output is captured by the test harness. Safe to call multiple times.
pub fn init_test() {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(env_filter(Level::DEBUG))
        .with_test_writer()
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}

fn env_filter(default_level: Level) -> EnvFilter {
    let mut filter = EnvFilter::builder()
        .with_default_directive(default_level.into())
        .from_env_lossy();
    for directive in ["h2=info", "hyper=info", "hyper_util=info", "reqwest=info", "rustls=info"] {
        if let Ok(directive) = directive.parse() {
            filter = filter.add_directive(directive);
        }
    }
    filter
}
