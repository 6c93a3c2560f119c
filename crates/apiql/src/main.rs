use std::io::{self, BufWriter, Read};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use apiql_core::config::{OutputFormat, RuntimeConfig};
use apiql_core::engine::InMemoryEngine;
use apiql_core::errors::{ApiqlError, ExecutionError, RegistryError};
use apiql_core::exec::http::HttpExecutor;
use apiql_core::registry::ProviderRegistry;
use apiql_core::render::OutputWriter;
use apiql_core::{HandlerContext, Session, SessionFactory};
use clap::Parser;
use tracing::{debug, info};

#[derive(Parser)]
#[clap(name = "apiql")]
struct Arguments {
    /// Provider registry describing the apis to query.
    #[clap(long, env = "APIQL_REGISTRY")]
    registry: PathBuf,
    /// Execute file containing sql statements then exit.
    #[clap(short = 'f', long)]
    files: Vec<PathBuf>,
    /// Output format, `text` or `json`.
    #[clap(long, default_value_t = OutputFormat::Text)]
    output: OutputFormat,
    /// Print queries instead of executing them.
    #[clap(long)]
    dry_run: bool,
    /// Log every http request and response status.
    #[clap(long)]
    http_log: bool,
    /// Maximum nesting of transactions.
    #[clap(long)]
    max_txn_depth: Option<usize>,
    /// Timeout for each http request.
    #[clap(long, default_value_t = 30)]
    timeout_secs: u64,
    /// Log level used when `RUST_LOG` isn't set.
    #[clap(long, env = "APIQL_LOG", default_value_t = tracing::Level::ERROR)]
    log_level: tracing::Level,
    /// Log as json.
    #[clap(long)]
    log_json: bool,
    /// Queries to execute.
    ///
    /// If omitted, and no files were given via the `files` argument, queries
    /// are read from stdin.
    #[clap(trailing_var_arg = true)]
    queries: Vec<String>,
}

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Apiql(#[from] ApiqlError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Execution(#[from] ExecutionError),

    #[error("failed to read '{path}': {source}")]
    Io { path: String, source: io::Error },

    #[error("failed to start runtime: {0}")]
    Runtime(io::Error),
}

fn main() {
    let args = Arguments::parse();
    let format = if args.log_json {
        logutil::LogFormat::Json
    } else {
        logutil::LogFormat::HumanReadable
    };
    logutil::configure_global_logger(args.log_level, format, io::stderr);

    let result = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(CliError::Runtime)
        .and_then(|runtime| runtime.block_on(inner(args)));

    match result {
        Ok(0) => (),
        Ok(failed) => {
            debug!(%failed, "statements failed");
            std::process::exit(1);
        }
        Err(err) => {
            println!("ERROR: {err}");
            std::process::exit(1);
        }
    }
}

/// Run all queries, returning the number of failed statements.
async fn inner(args: Arguments) -> Result<usize, CliError> {
    let registry = ProviderRegistry::load(&args.registry)?;
    info!(path = %args.registry.display(), providers = registry.providers.len(), "loaded registry");

    let config = RuntimeConfig {
        http_log_enabled: args.http_log,
        request_timeout: Duration::from_secs(args.timeout_secs),
        max_transaction_depth: args.max_txn_depth,
        output_format: args.output,
        dry_run: args.dry_run,
    };

    let executor = Arc::new(HttpExecutor::new(&config)?);
    let ctx = HandlerContext::new(config.clone(), Arc::new(registry), executor);
    let factory = SessionFactory::new(Arc::new(InMemoryEngine::new()), ctx)?;
    let mut session = factory.new_session()?;

    let cancel = session.cancel_handle();
    tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            info!("cancelling running statements");
            cancel.cancel();
        }
    });

    let mut queries = Vec::new();
    for path in &args.files {
        let content = std::fs::read_to_string(path).map_err(|source| CliError::Io {
            path: path.display().to_string(),
            source,
        })?;
        queries.push(content);
    }
    queries.extend(args.queries);

    if queries.is_empty() {
        let mut content = String::new();
        io::stdin()
            .read_to_string(&mut content)
            .map_err(|source| CliError::Io {
                path: "stdin".to_string(),
                source,
            })?;
        queries.push(content);
    }

    let mut writer = OutputWriter::new(BufWriter::new(io::stdout()), config.output_format);
    let mut failed = 0;
    for query in &queries {
        failed += run(&mut session, query, &config, &mut writer).await;
    }

    Ok(failed)
}

async fn run(
    session: &mut Session,
    query: &str,
    config: &RuntimeConfig,
    writer: &mut OutputWriter<BufWriter<io::Stdout>>,
) -> usize {
    if config.dry_run {
        session.process_dry_run(query, writer);
        return 0;
    }
    session.process_query(query, writer).await
}
