//! services/journal/src/bin/journal.rs

use std::path::PathBuf;
use std::sync::Arc;

use async_openai::{config::OpenAIConfig, Client};
use booktalk_core::domain::UserIdentity;
use booktalk_core::ports::{BookCompanionService, RemoteStore};
use clap::{Parser, Subcommand};
use journal_lib::{
    adapters::{
        FileKeyValueStore, LocalStore, OfflineCompanion, OpenAiCompanionAdapter, PgRemoteStore,
        StaticSession,
    },
    config::Config,
    error::JournalError,
    sync::{JournalFacade, ModeSelector, StoreSelector},
};
use sqlx::postgres::PgPoolOptions;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "journal", about = "Storage tools for the BookTalk reading journal")]
struct Cli {
    /// Name used when a new profile has to be created.
    #[arg(long, env = "READER_NAME", default_value = "")]
    name: String,

    /// Work against the on-device store only, even if a remote store is configured.
    #[arg(long)]
    offline: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Check the remote store and report latency or missing tables.
    Check,
    /// List the books of the current journal.
    Books,
    /// Write the on-device journal to a backup file.
    Backup { path: PathBuf },
    /// Restore a backup file into the on-device journal.
    Restore { path: PathBuf },
}

#[tokio::main]
async fn main() -> Result<(), JournalError> {
    let cli = Cli::parse();

    // --- 1. Load Configuration & Set Up Logging ---
    let config = Config::from_env()?;
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer())
        .init();
    info!("Configuration loaded.");

    // --- 2. Open the On-device Store ---
    let kv = Arc::new(FileKeyValueStore::open(config.data_dir.clone()).await?);
    info!(data_dir = %kv.root().display(), "Opened local store");
    let local = LocalStore::new(kv);

    // --- 3. Connect to the Remote Store (if configured) ---
    let remote: Option<Arc<dyn RemoteStore>> = match &config.database_url {
        Some(url) => {
            let pool = PgPoolOptions::new().max_connections(5).connect_lazy(url)?;
            let user = config.remote_user_id.map(|user_id| UserIdentity {
                user_id,
                email: config.remote_user_email.clone(),
            });
            let adapter = PgRemoteStore::new(pool, Arc::new(StaticSession::new(user)));
            info!("Running database migrations...");
            match adapter.run_migrations().await {
                Ok(()) => info!("Database migrations complete."),
                Err(e) => warn!(
                    error = %e,
                    "Database migrations failed; remote store may be unusable"
                ),
            }
            Some(Arc::new(adapter))
        }
        None => None,
    };

    // --- 4. Initialize the AI Companion ---
    let companion: Arc<dyn BookCompanionService> = match &config.openai_api_key {
        Some(key) => {
            let client = Client::with_config(OpenAIConfig::new().with_api_key(key));
            Arc::new(OpenAiCompanionAdapter::new(client, config.companion_model.clone()))
        }
        None => {
            info!("OPENAI_API_KEY not set; companion content falls back to defaults");
            Arc::new(OfflineCompanion)
        }
    };

    // --- 5. Build the Sync Façade ---
    let mode = Arc::new(ModeSelector::new(config.remote_configured()));
    let stores = StoreSelector::new(mode, local, remote);
    let journal = JournalFacade::new(stores, companion, config.retry);
    if cli.offline {
        journal.continue_offline();
    }
    info!(mode = %journal.mode(), "Journal ready");

    // --- 6. Run the Command ---
    match cli.command {
        Command::Check => {
            let report = journal.test_connection().await;
            println!("{}", report.message);
            if !report.success {
                return Err(JournalError::Internal(report.message));
            }
        }
        Command::Books => {
            let profile = journal.onboard(&cli.name).await?;
            journal.seed_if_empty().await?;
            let books = journal.load_books().await?;
            let stats = journal.profile_stats().await;
            println!(
                "{} ({}): {} reading, {} completed, {} reviewed",
                profile.name,
                journal.mode(),
                stats.reading,
                stats.completed,
                stats.reviewed
            );
            for book in books {
                println!(
                    "{:<11} {}/5  {} by {}  | {}",
                    book.status.as_str(),
                    book.rating,
                    book.title,
                    book.author,
                    book.last_message.unwrap_or_default()
                );
            }
        }
        Command::Backup { path } => {
            let backup = journal.create_backup().await?;
            tokio::fs::write(&path, backup.to_json_pretty()?).await?;
            println!(
                "Backed up {} books and {} messages to {}",
                backup.books.len(),
                backup.message_count(),
                path.display()
            );
        }
        Command::Restore { path } => {
            let json = tokio::fs::read_to_string(&path).await?;
            let backup = journal.restore_backup_json(&json).await?;
            println!(
                "Restored {} books and {} messages from {}",
                backup.books.len(),
                backup.message_count(),
                path.display()
            );
        }
    }

    Ok(())
}
