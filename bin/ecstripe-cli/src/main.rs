//! ecstripe CLI - stripe-encode files and check their integrity records
//!
//! This binary drives the stripe codec and integrity records against a
//! directory of shard files.

mod store;

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use ecstripe_common::Config;
use ecstripe_integrity::{HashInfo, Record, StripeletCrcTable, is_cinfo_key, is_hinfo_key};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "ecstripe")]
#[command(about = "Erasure-coded stripe and integrity tool")]
#[command(version)]
struct Args {
    /// Configuration file (TOML)
    #[arg(short, long, env = "ECSTRIPE_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (overrides config file)
    #[arg(long)]
    log_level: Option<String>,

    /// Number of data shards (overrides config file)
    #[arg(short = 'k', long)]
    data_shards: Option<u8>,

    /// Number of parity shards (overrides config file)
    #[arg(short = 'm', long)]
    parity_shards: Option<u8>,

    /// Chunk size in bytes (overrides config file)
    #[arg(long)]
    chunk_size: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Encode a file into a directory of shards
    Encode {
        /// File to encode
        input: PathBuf,
        /// Output directory
        out_dir: PathBuf,
    },
    /// Check every shard against the stored hashes
    Verify {
        /// Shard directory
        dir: PathBuf,
    },
    /// Rebuild the original file from intact shards
    Decode {
        /// Shard directory
        dir: PathBuf,
        /// Output file
        output: PathBuf,
    },
    /// Print an integrity record as JSON
    Dump {
        /// Record file (`hinfo_key` or `cinfo_key.<shard>`)
        file: PathBuf,
    },
}

fn load_config(args: &Args) -> Result<Config> {
    let mut config = match &args.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => Config::default(),
    };

    if let Some(k) = args.data_shards {
        config.layout.data_shards = k;
    }
    if let Some(m) = args.parity_shards {
        config.layout.parity_shards = m;
    }
    if let Some(chunk_size) = args.chunk_size {
        config.layout.chunk_size = chunk_size;
    }
    if let Some(level) = &args.log_level {
        config.logging.level.clone_from(level);
    }
    Ok(config)
}

fn dump_record(file: &PathBuf) -> Result<serde_json::Value> {
    let name = file
        .file_name()
        .and_then(|n| n.to_str())
        .context("record path has no file name")?;
    let key = name.split('.').next().unwrap_or(name);
    let bytes = fs::read(file).with_context(|| format!("reading {}", file.display()))?;

    if is_hinfo_key(key) {
        Ok(HashInfo::from_bytes(&bytes)?.dump())
    } else if is_cinfo_key(key) {
        Ok(StripeletCrcTable::from_bytes(&bytes)?.dump())
    } else {
        bail!("{name} is not a known integrity record");
    }
}

fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();
    let config = load_config(&args)?;

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.logging.level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    match args.command {
        Commands::Encode { input, out_dir } => {
            let data = fs::read(&input).with_context(|| format!("reading {}", input.display()))?;
            let manifest = store::encode_object(&config, &data, &out_dir)?;
            println!(
                "Encoded {} bytes into {} shards ({}+{}, chunk {} bytes)",
                manifest.object_size,
                manifest.layout.data_shards as usize + manifest.layout.parity_shards as usize,
                manifest.layout.data_shards,
                manifest.layout.parity_shards,
                manifest.layout.chunk_size
            );
        }
        Commands::Verify { dir } => {
            let reports = store::verify_object(&dir)?;
            println!("{:<8} {:<10} {:<10} {:<10}", "SHARD", "PRESENT", "HASH", "STRIPELETS");
            for r in &reports {
                println!(
                    "{:<8} {:<10} {:<10} {:<10}",
                    r.shard,
                    if r.present { "yes" } else { "no" },
                    if r.hash_ok { "ok" } else { "BAD" },
                    if r.stripelets_ok { "ok" } else { "BAD" }
                );
            }
            let damaged = reports.iter().filter(|r| !r.intact()).count();
            if damaged > 0 {
                bail!("{damaged} of {} shards failed verification", reports.len());
            }
            println!("All {} shards intact", reports.len());
        }
        Commands::Decode { dir, output } => {
            let data = store::decode_object(&dir)?;
            fs::write(&output, &data)
                .with_context(|| format!("writing {}", output.display()))?;
            info!(bytes = data.len(), output = %output.display(), "decoded object");
            println!("Decoded {} bytes to {}", data.len(), output.display());
        }
        Commands::Dump { file } => {
            let report = dump_record(&file)?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }

    Ok(())
}
