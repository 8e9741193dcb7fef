//! AgenticArchive server: entry point.

use std::sync::Arc;

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;

use agentic_archive::{ArchiveService, JsonlStore, MemoryStore, OutcomeStore};
use agentic_archive_server::config::{load_archive_config, resolve_addr, resolve_ledger_path};
use agentic_archive_server::routes::RecordView;
use agentic_archive_server::{serve, AppState};

#[derive(Parser)]
#[command(
    name = "agentic-archive-server",
    about = "Snapshot pages with a web archive service and extract their metadata",
    version
)]
struct Cli {
    /// JSON config file (also reads ARCHIVE_CONFIG).
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Append outcomes to this JSONL ledger (also reads ARCHIVE_LEDGER).
    #[arg(long, global = true)]
    ledger: Option<String>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server (default).
    Serve {
        /// Listen address (host:port). Also reads ARCHIVE_ADDR.
        #[arg(long)]
        addr: Option<String>,
    },

    /// Snapshot one URL and print the result.
    Archive {
        url: String,
    },

    /// Fetch metadata for an existing snapshot.
    Metadata {
        archive_id: String,

        /// Skip the cache.
        #[arg(long)]
        refresh: bool,
    },

    /// Print the effective configuration as JSON.
    Config,

    /// Generate shell completion scripts.
    ///
    /// Examples:
    ///   agentic-archive-server completions bash > ~/.local/share/bash-completion/completions/agentic-archive-server
    ///   agentic-archive-server completions zsh > ~/.zfunc/_agentic-archive-server
    Completions {
        /// Shell type (bash, zsh, fish, powershell, elvish).
        shell: Shell,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if cli.log_json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    match cli.command.unwrap_or(Commands::Serve { addr: None }) {
        Commands::Serve { addr } => {
            let service = build_service(cli.config.as_deref(), cli.ledger.as_deref())?;
            let addr = resolve_addr(addr.as_deref());
            serve(&addr, Arc::new(AppState::new(service))).await?;
        }

        Commands::Archive { url } => {
            let service = build_service(cli.config.as_deref(), cli.ledger.as_deref())?;
            let created = service.create_archive(&url).await?;
            let out = serde_json::json!({
                "archiveId": created.archive_id,
                "archiveUrl": created.archive_url,
                "submittedUrl": created.submitted_url,
                "metadata": RecordView::from(&created.record),
            });
            println!("{}", serde_json::to_string_pretty(&out)?);
        }

        Commands::Metadata {
            archive_id,
            refresh,
        } => {
            let service = build_service(cli.config.as_deref(), cli.ledger.as_deref())?;
            let record = service.archive_metadata(&archive_id, refresh).await?;
            println!(
                "{}",
                serde_json::to_string_pretty(&RecordView::from(&record))?
            );
        }

        Commands::Config => {
            let config = load_archive_config(cli.config.as_deref())?;
            println!("{}", serde_json::to_string_pretty(&config)?);
        }

        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(
                shell,
                &mut cmd,
                "agentic-archive-server",
                &mut std::io::stdout(),
            );
        }
    }

    Ok(())
}

fn build_service(config: Option<&str>, ledger: Option<&str>) -> anyhow::Result<ArchiveService> {
    let config = load_archive_config(config)?;
    let store: Arc<dyn OutcomeStore> = match resolve_ledger_path(ledger) {
        Some(path) => {
            tracing::info!(path = %path.display(), "recording outcomes to ledger");
            Arc::new(JsonlStore::open(&path)?)
        }
        None => Arc::new(MemoryStore::new()),
    };
    Ok(ArchiveService::new(config, store)?)
}
