//! AgentFlow CLI: run, inspect and debug workflows against a remote executor.

mod commands;
mod config;

use clap::{Parser, Subcommand, ValueEnum};
use config::AppConfig;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "agentflow", version, about = "AgentFlow workflow runner and debugger")]
struct Cli {
    /// Path to a TOML config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Remote executor base URL (overrides config and environment)
    #[arg(long, global = true)]
    executor_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum ModeArg {
    Blocking,
    Deferred,
    Streaming,
}

impl From<ModeArg> for af_core::execution::ExecutionMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Blocking => Self::Blocking,
            ModeArg::Deferred => Self::Deferred,
            ModeArg::Streaming => Self::Streaming,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Run a workflow on the remote executor
    Run {
        /// Workflow definition (JSON)
        workflow: PathBuf,
        /// Input object as JSON, or @file
        #[arg(long)]
        input: Option<String>,
        #[arg(long, value_enum, default_value = "blocking")]
        mode: ModeArg,
        /// Timeout in seconds
        #[arg(long)]
        timeout: Option<u64>,
        /// Retry failed runs with exponential backoff
        #[arg(long)]
        retry: bool,
    },

    /// Fetch the status of a run
    Status { execution_id: String },

    /// Cancel a run
    Cancel { execution_id: String },

    /// Validate a workflow definition
    Validate { workflow: PathBuf },

    /// List workflow templates
    Templates,

    /// Show executor statistics
    Stats,

    /// Walk a workflow locally, node by node, with breakpoints
    Debug {
        workflow: PathBuf,
        #[arg(long)]
        input: Option<String>,
        /// Breakpoint as `node` or `node=condition`; repeatable
        #[arg(long = "break", value_name = "NODE[=COND]")]
        breakpoints: Vec<String>,
        /// Persist the session to this SQLite database
        #[arg(long)]
        trace_db: Option<PathBuf>,
    },

    /// Export a persisted debug session as JSON (lists sessions when omitted)
    Trace {
        session: Option<String>,
        #[arg(long)]
        db: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut config = AppConfig::load(cli.config.as_deref())?;
    config.apply_env();
    config.override_executor_url(cli.executor_url);

    match cli.command {
        Commands::Run {
            workflow,
            input,
            mode,
            timeout,
            retry,
        } => {
            if retry {
                config.orchestrator.auto_retry = true;
            }
            commands::remote::run(&config, &workflow, input.as_deref(), mode.into(), timeout).await
        }
        Commands::Status { execution_id } => commands::remote::status(&config, &execution_id).await,
        Commands::Cancel { execution_id } => commands::remote::cancel(&config, &execution_id).await,
        Commands::Validate { workflow } => commands::remote::validate(&config, &workflow).await,
        Commands::Templates => commands::remote::templates(&config).await,
        Commands::Stats => commands::remote::statistics(&config).await,
        Commands::Debug {
            workflow,
            input,
            breakpoints,
            trace_db,
        } => {
            let trace_db = trace_db.or_else(|| config.trace_db.clone());
            commands::debug::run(&config, &workflow, input.as_deref(), &breakpoints, trace_db).await
        }
        Commands::Trace { session, db } => {
            let db = db
                .or_else(|| config.trace_db.clone())
                .ok_or_else(|| anyhow::anyhow!("no trace database given (--db or trace_db in config)"))?;
            commands::trace::export(&db, session.as_deref())
        }
    }
}
