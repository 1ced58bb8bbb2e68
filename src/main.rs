use chrono::NaiveDateTime;
use clap::Parser;
use miette::{IntoDiagnostic, Result};
use shopbook::config::BookingConfig;
use shopbook::domain::ports::{
    AppointmentStoreRef, ClockRef, FixedClock, PaymentStoreRef, SystemClock,
};
use shopbook::infrastructure::gateway::SandboxGateway;
use shopbook::infrastructure::in_memory::{
    InMemoryAppointmentStore, InMemoryCatalog, InMemoryPaymentStore,
};
use shopbook::interfaces::csv::appointment_writer::AppointmentWriter;
use shopbook::interfaces::csv::command_reader::CommandReader;
use shopbook::interfaces::replay::Replay;
use std::fs::File;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Catalog JSON file (shops, professionals, services, users)
    catalog: PathBuf,

    /// Booking commands CSV file
    input: PathBuf,

    /// Path to persistent database (optional). If provided, uses RocksDB.
    #[arg(long)]
    db_path: Option<PathBuf>,

    /// TOML file with business hours and payment settings
    #[arg(long)]
    config: Option<PathBuf>,

    /// Replay as if the shop clock read this instant, e.g. 2026-10-16T08:00:00
    #[arg(long)]
    now: Option<NaiveDateTime>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("shopbook=info")),
        )
        .init();

    let cli = Cli::parse();
    let config = BookingConfig::load(cli.config.as_deref()).into_diagnostic()?;
    let catalog = InMemoryCatalog::from_json(File::open(&cli.catalog).into_diagnostic()?)
        .into_diagnostic()?;
    let clock: ClockRef = match cli.now {
        Some(now) => Arc::new(FixedClock(now)),
        None => Arc::new(SystemClock),
    };

    let (appointments, payments, sandbox) = open_stores(cli.db_path)?;
    let mut replay = Replay::new(
        Arc::new(catalog),
        appointments,
        payments,
        clock,
        sandbox,
        &config,
    );

    let file = File::open(cli.input).into_diagnostic()?;
    let reader = CommandReader::new(file);
    for command in reader.commands() {
        match command {
            Ok(command) => {
                if let Err(e) = replay.apply(command).await {
                    eprintln!("Error processing command: {}", e);
                }
            }
            Err(e) => {
                eprintln!("Error reading command: {}", e);
            }
        }
    }

    replay.sweep_orphans().await;
    let rows = replay.report().await.into_diagnostic()?;
    let stdout = io::stdout();
    let mut writer = AppointmentWriter::new(stdout.lock());
    writer.write_rows(rows).into_diagnostic()?;

    Ok(())
}

#[cfg(feature = "storage-rocksdb")]
fn open_stores(
    db_path: Option<PathBuf>,
) -> Result<(AppointmentStoreRef, PaymentStoreRef, SandboxGateway)> {
    use shopbook::infrastructure::rocksdb::RocksDBStore;

    match db_path {
        Some(db_path) => {
            let store = Arc::new(RocksDBStore::open(db_path).into_diagnostic()?);
            let appointments: AppointmentStoreRef = store.clone();
            let payments: PaymentStoreRef = store;
            let run = uuid::Uuid::new_v4().simple().to_string();
            Ok((
                appointments,
                payments,
                SandboxGateway::with_namespace(&run[..8]),
            ))
        }
        None => Ok(in_memory_stores()),
    }
}

#[cfg(not(feature = "storage-rocksdb"))]
fn open_stores(
    db_path: Option<PathBuf>,
) -> Result<(AppointmentStoreRef, PaymentStoreRef, SandboxGateway)> {
    if db_path.is_some() {
        eprintln!(
            "WARNING: Persistent storage requested via --db-path, but 'storage-rocksdb' feature is not enabled. Falling back to In-Memory storage."
        );
    }
    Ok(in_memory_stores())
}

fn in_memory_stores() -> (AppointmentStoreRef, PaymentStoreRef, SandboxGateway) {
    let appointments: AppointmentStoreRef = Arc::new(InMemoryAppointmentStore::new());
    let payments: PaymentStoreRef = Arc::new(InMemoryPaymentStore::new());
    (appointments, payments, SandboxGateway::new())
}
