use aery::arm::{ArmClient, ArmCredentials, CredentialKind};
use aery::config::Config;
use aery::deploy::{self, ApplyRequest, ExecuteOptions, Plan};
use aery::naming::Catalog;
use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::Level;
use tracing_subscriber::fmt::writer::MakeWriterExt;

/// Apply declarative Azure resource documents
#[derive(Parser, Debug)]
#[command(name = "aery", version, about, long_about = None)]
struct Args {
    /// Resource file or deployment directory
    #[arg(short, long)]
    file: PathBuf,

    /// Subscription to deploy into
    #[arg(short, long)]
    subscription_id: Option<String>,

    /// Resource group to deploy into (required for a single file)
    #[arg(short = 'g', long)]
    resource_group: Option<String>,

    /// Control-plane endpoint
    #[arg(long)]
    endpoint: Option<String>,

    /// Where access tokens come from
    #[arg(long, value_enum)]
    credential: Option<CredentialKind>,

    /// Naming catalog to use instead of the built-in one
    #[arg(long)]
    names_file: Option<PathBuf>,

    /// Resources applied at once
    #[arg(long)]
    parallel: Option<usize>,

    /// Seconds between status polls of long-running operations
    #[arg(long)]
    poll_interval: Option<u64>,

    /// Give up after this many seconds
    #[arg(long)]
    timeout: Option<u64>,

    /// Print the requests without sending them
    #[arg(long)]
    dry_run: bool,

    /// Remember the subscription, resource group and endpoint used for this run
    #[arg(long)]
    save_defaults: bool,

    /// Shorthand for --log-level debug
    #[arg(long)]
    debug: bool,

    /// Log level for debugging
    #[arg(long, value_enum, default_value = "off")]
    log_level: LogLevel,

    /// Write logs to this file instead of stderr
    #[arg(long)]
    log_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn to_tracing_level(self) -> Option<Level> {
        match self {
            LogLevel::Off => None,
            LogLevel::Error => Some(Level::ERROR),
            LogLevel::Warn => Some(Level::WARN),
            LogLevel::Info => Some(Level::INFO),
            LogLevel::Debug => Some(Level::DEBUG),
            LogLevel::Trace => Some(Level::TRACE),
        }
    }
}

fn setup_logging(
    level: LogLevel,
    log_file: Option<&PathBuf>,
) -> Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    let Some(tracing_level) = level.to_tracing_level() else {
        return Ok(None);
    };

    let (non_blocking, guard) = match log_file {
        Some(log_path) => {
            if let Some(parent) = log_path.parent() {
                let _ = std::fs::create_dir_all(parent);
            }
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(log_path)
                .with_context(|| format!("Failed to open log file {}", log_path.display()))?;
            tracing_appender::non_blocking(file)
        }
        None => tracing_appender::non_blocking(std::io::stderr()),
    };

    tracing_subscriber::fmt()
        .with_max_level(tracing_level)
        .with_writer(non_blocking.with_max_level(tracing_level))
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .init();

    tracing::info!("aery started with log level: {:?}", level);

    Ok(Some(guard))
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let level = if args.debug && args.log_level == LogLevel::Off {
        LogLevel::Debug
    } else {
        args.log_level
    };
    let _log_guard = match setup_logging(level, args.log_file.as_ref()) {
        Ok(guard) => guard,
        Err(err) => {
            eprintln!("error: {err:#}");
            return ExitCode::FAILURE;
        }
    };

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!("{:#}", err);
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<()> {
    let mut config = Config::load();

    let catalog = match &args.names_file {
        Some(path) => Catalog::from_path(path)?,
        None => Catalog::embedded()?,
    };
    tracing::debug!("Naming catalog covers {} resource types", catalog.len());

    let request = ApplyRequest {
        path: args.file.clone(),
        subscription_id: config.effective_subscription(args.subscription_id.as_deref()),
        resource_group: config.effective_resource_group(args.resource_group.as_deref()),
        options: ExecuteOptions {
            poll_interval: Duration::from_secs(config.effective_poll_interval(args.poll_interval)),
            max_parallel: config.effective_max_parallel(args.parallel),
        },
    };

    let endpoint = config.effective_endpoint(args.endpoint.as_deref());

    if args.save_defaults {
        config.remember(
            request.subscription_id.as_deref(),
            request.resource_group.as_deref(),
            &endpoint,
        );
        config.save().context("Failed to save defaults")?;
        if let Some(path) = Config::config_path() {
            tracing::info!("Saved defaults to {}", path.display());
        }
    }

    if args.dry_run {
        let plan = deploy::plan(&catalog, &request)?;
        print_plan(&plan);
        return Ok(());
    }

    let credentials = ArmCredentials::from_kind(config.effective_credential(args.credential))?;
    let client = ArmClient::with_endpoint(credentials, &endpoint)?;
    tracing::info!("Using endpoint {}", client.endpoint());

    let cancel = CancellationToken::new();
    spawn_cancel_on_signal(cancel.clone(), args.timeout.map(Duration::from_secs));

    let report = deploy::apply(&client, &catalog, &request, &cancel).await?;
    tracing::info!(
        "applied {} resources in {:?}",
        report.applied.len(),
        report.elapsed
    );
    Ok(())
}

/// Cancel on Ctrl-C or when `timeout` elapses
fn spawn_cancel_on_signal(cancel: CancellationToken, timeout: Option<Duration>) {
    tokio::spawn(async move {
        let deadline = async {
            match timeout {
                Some(timeout) => tokio::time::sleep(timeout).await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                eprintln!("interrupted, cancelling");
            }
            _ = deadline => {
                eprintln!("timed out, cancelling");
            }
            _ = cancel.cancelled() => return,
        }
        cancel.cancel();
    });
}

fn print_plan(plan: &Plan) {
    print!("{plan}");
    for step in plan.group.iter().chain(&plan.steps) {
        tracing::debug!("{} body: {}", step.name, step.body);
    }
}
