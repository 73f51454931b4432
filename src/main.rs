use clap::Parser;
use miette::{IntoDiagnostic, Result};
use std::fs::File;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use storefront::application::bootstrap::bootstrap;
use storefront::config::Settings;
use storefront::domain::ports::{NotifierRef, SnapshotStoreRef};
use storefront::infrastructure::in_memory::InMemorySnapshotStore;
use storefront::infrastructure::json_file::JsonFileSnapshotStore;
use storefront::infrastructure::log_notifier::LogNotifier;
use storefront::interfaces::csv::account_writer::AccountWriter;
use storefront::interfaces::csv::script_reader::ScriptReader;
use storefront::interfaces::script::ScriptRunner;
use storefront::telemetry::{get_subscriber, init_subscriber};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// CSV script of chat events (action,user,target,amount,note)
    script: PathBuf,

    /// TOML settings file. `STOREFRONT__*` environment variables override it.
    #[arg(long)]
    config: Option<PathBuf>,

    /// JSON snapshot file to restore from and checkpoint into.
    #[arg(long)]
    snapshot: Option<PathBuf>,

    /// Path to persistent database (optional). If provided, uses RocksDB.
    #[arg(long)]
    db_path: Option<PathBuf>,
}

fn open_store(cli: &Cli, settings: &Settings) -> Result<SnapshotStoreRef> {
    if let Some(db_path) = &cli.db_path {
        #[cfg(feature = "storage-rocksdb")]
        {
            let store = storefront::infrastructure::rocksdb::RocksDBStore::open(db_path)
                .into_diagnostic()?;
            return Ok(Arc::new(store));
        }
        #[cfg(not(feature = "storage-rocksdb"))]
        {
            tracing::warn!(
                path = %db_path.display(),
                "WARNING: Persistent storage requested via --db-path, but 'storage-rocksdb' feature is not enabled. Falling back to In-Memory storage."
            );
            return Ok(Arc::new(InMemorySnapshotStore::new()));
        }
    }

    match cli.snapshot.as_ref().or(settings.snapshot_path.as_ref()) {
        Some(path) => Ok(Arc::new(JsonFileSnapshotStore::open(path.clone()).into_diagnostic()?)),
        None => Ok(Arc::new(InMemorySnapshotStore::new())),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_subscriber(get_subscriber("info", io::stderr));
    let cli = Cli::parse();

    let settings = Settings::load(cli.config.as_deref()).into_diagnostic()?;
    let store = open_store(&cli, &settings)?;
    let notifier: NotifierRef = Arc::new(LogNotifier::new(
        settings.payment_channel_id,
        settings.order_channel_id,
    ));

    let workflow = bootstrap(&settings, store, notifier.clone())
        .await
        .into_diagnostic()?;
    let runner = ScriptRunner::new(workflow.clone(), notifier);

    let file = File::open(&cli.script).into_diagnostic()?;
    for (line, event) in ScriptReader::new(file).events().enumerate() {
        match event {
            Ok(event) => {
                if let Err(e) = runner.run(&event).await {
                    tracing::warn!(line = line + 2, action = ?event.action, error = %e, "Error processing event");
                }
            }
            Err(e) => tracing::warn!(line = line + 2, error = %e, "Error reading event"),
        }
    }

    workflow.shutdown();
    if let Err(e) = workflow.flush().await {
        tracing::error!(error = %e, "Some state could not be checkpointed");
    }

    let accounts = workflow.ledger().accounts().await;
    let stdout = io::stdout();
    let mut writer = AccountWriter::new(stdout.lock());
    writer.write_accounts(&accounts).into_diagnostic()?;

    Ok(())
}
