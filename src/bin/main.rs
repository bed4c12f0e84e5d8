use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use account_ledger::{
    AccountLifecycleManager, Batch, InMemoryAccountStore, InMemoryTransactionLog, LedgerConfig,
    LedgerEngine,
};

/// A cli interface to the account ledger
#[derive(Debug, Parser)]
#[clap(version)]
struct Args {
    /// The path to the operations CSV file
    filename: std::path::PathBuf,
    /// A TOML file overriding the default ledger settings
    #[clap(long)]
    config: Option<std::path::PathBuf>,
    /// Also write the transaction log as CSV to this path
    #[clap(long)]
    transactions: Option<std::path::PathBuf>,
}

fn main() -> anyhow::Result<()> {
    // stdout carries the CSV output
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = match &args.config {
        Some(path) => {
            let source = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            LedgerConfig::from_toml(&source)
                .with_context(|| format!("invalid config {}", path.display()))?
        }
        None => LedgerConfig::default(),
    };

    let store = Arc::new(InMemoryAccountStore::new());
    let log = Arc::new(InMemoryTransactionLog::new());
    let engine = LedgerEngine::new(Arc::clone(&store), log, config.clone());
    let lifecycle = AccountLifecycleManager::new(store, config);
    let mut batch = Batch::new(&engine, &lifecycle);

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_path(&args.filename)?;

    for (row, operation) in reader.deserialize().enumerate() {
        // rejected operations are skipped
        if let Err(err) = batch.handle(operation?) {
            tracing::info!(row = row + 1, error = %err, "operation rejected");
        }
    }

    let mut writer = csv::WriterBuilder::new()
        .has_headers(true)
        .from_writer(std::io::stdout());

    for account in batch.accounts()? {
        writer.serialize(account)?;
    }
    writer.flush()?;

    if let Some(path) = &args.transactions {
        let mut writer = csv::WriterBuilder::new()
            .has_headers(true)
            .from_path(path)?;
        for transaction in batch.transactions()? {
            writer.serialize(transaction)?;
        }
        writer.flush()?;
    }

    Ok(())
}
