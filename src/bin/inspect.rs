//! Caravan Inspection Tool
//!
//! Offline view of a store: dump WAL records or print store statistics.

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};
use caravan::metrics::MetricsRegistry;
use caravan::wal::{LogRecord, WalReader, WalRecovery};
use caravan::{CaravanError, Config, DurableListStore};
use tracing_subscriber::{fmt, EnvFilter};

/// Caravan Inspector
#[derive(Parser, Debug)]
#[command(name = "caravan-inspect")]
#[command(about = "Inspect Caravan WAL files and data directories")]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print every record in a WAL file
    Wal {
        /// Path to the WAL file
        path: PathBuf,

        /// Only verify, print a summary
        #[arg(long)]
        verify: bool,
    },

    /// Rebuild a store's statistics from its WAL without changing any file
    Stats {
        /// Data directory
        #[arg(short, long, default_value = "./caravan_data")]
        data_dir: PathBuf,

        /// Size of each data file in MB
        #[arg(short = 's', long, default_value = "64")]
        storage_file_mb: u64,

        /// Maximum number of data files
        #[arg(short = 'n', long, default_value = "8")]
        max_storage_files: usize,
    },
}

fn main() {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,caravan=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    tracing::debug!("Caravan inspector v{}", caravan::VERSION);

    let outcome = match args.command {
        Command::Wal { path, verify } => inspect_wal(&path, verify),
        Command::Stats {
            data_dir,
            storage_file_mb,
            max_storage_files,
        } => inspect_store(data_dir, storage_file_mb, max_storage_files),
    };

    if let Err(e) = outcome {
        tracing::error!("{} (code {})", e, e.code());
        process::exit(1);
    }
}

fn inspect_wal(path: &PathBuf, verify: bool) -> caravan::Result<()> {
    if verify {
        let result = WalRecovery::verify(path)?;
        println!("records:        {}", result.records_recovered);
        println!("valid bytes:    {}", result.valid_len);
        println!("torn bytes:     {}", result.torn_bytes);
        println!(
            "last snapshot:  {}",
            result
                .last_snapshot
                .map(|at| format!("record #{}", at))
                .unwrap_or_else(|| "none".to_string())
        );
        return Ok(());
    }

    let mut reader = WalReader::open(path)?;
    let mut n = 0usize;
    while let Some(record) = reader.next_record()? {
        let offset_hint = reader.valid_len();
        match &record {
            LogRecord::Append(append) => println!(
                "#{:<6} append    id={} position={} size={} seq={} asset_bytes={}",
                n,
                append.id,
                append.position,
                append.payload.len(),
                append.seq,
                append.asset_bytes
            ),
            LogRecord::MapKey(map) => {
                println!("#{:<6} map_key   {} -> {}", n, map.key, map.id)
            }
            LogRecord::DelKey(del) => println!("#{:<6} del_key   {}", n, del.key),
            LogRecord::Snapshot(snapshot) => println!(
                "#{:<6} snapshot  heap={}B index={}B keymap={}B",
                n,
                snapshot.heap.len(),
                snapshot.index.len(),
                snapshot.keymap.len()
            ),
        }
        tracing::trace!(end = offset_hint, kind = record.kind(), "record");
        n += 1;
    }
    if reader.torn_bytes() > 0 {
        println!("(torn tail of {} bytes ignored)", reader.torn_bytes());
    }
    Ok(())
}

fn inspect_store(
    data_dir: PathBuf,
    storage_file_mb: u64,
    max_storage_files: usize,
) -> caravan::Result<()> {
    let storage_file_size = storage_file_mb
        .checked_mul(1024 * 1024)
        .ok_or_else(|| CaravanError::Config(format!("{} MB is too large", storage_file_mb)))?;
    let config = Config::builder()
        .data_dir(data_dir)
        .storage_file_size(storage_file_size)
        .max_storage_files(max_storage_files)
        .build();

    let metrics = MetricsRegistry::new();
    let stats = DurableListStore::inspect(&config, &metrics)?;

    println!("keys:                   {}", stats.keys);
    println!("regions:                {}", stats.regions);
    println!("referenced bytes:       {}", stats.referenced_bytes);
    println!("heap available / max:   {} / {}", stats.heap_available, stats.heap_max);
    println!("wasted bytes:           {}", stats.wasted_bytes());
    println!("data files:             {}", stats.storage_files);
    println!("wal bytes:              {}", stats.wal_bytes);
    println!("records since snapshot: {}", stats.records_since_snapshot);
    println!(
        "heap fragments:         {}",
        metrics.gauge_value("caravan.heap.fragments").unwrap_or(0)
    );
    Ok(())
}
