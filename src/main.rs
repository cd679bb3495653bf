use blockseal::block::{Block, PendingBlock};
use clap::{ArgAction, Parser, Subcommand};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::Level;

#[derive(Parser)]
#[command(
    name = "blockseal",
    version,
    about = "Seal, validate and decode self-verifying ledger blocks"
)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print a sealed genesis block
    Genesis {
        /// Creation time in Unix seconds (default: now)
        #[arg(long)]
        time: Option<i64>,
    },
    /// Encode a JSON payload and print the sealed block
    Seal {
        /// Payload as a JSON document
        #[arg(short, long)]
        data: String,
        /// Position in the sequence (must be > 0)
        #[arg(long)]
        height: u64,
        /// Hash of the preceding block
        #[arg(short, long)]
        previous: Option<String>,
        /// Creation time in Unix seconds (default: now)
        #[arg(long)]
        time: Option<i64>,
    },
    /// Check a block file for tampering
    Validate { file: PathBuf },
    /// Print the decoded payload of a block file
    Data { file: PathBuf },
    /// Print the header fields of a block file
    Show { file: PathBuf },
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = match cli.command {
        Commands::Genesis { time } => cmd_genesis(time),
        Commands::Seal {
            data,
            height,
            previous,
            time,
        } => cmd_seal(&data, height, previous, time),
        Commands::Validate { file } => cmd_validate(&file),
        Commands::Data { file } => cmd_data(&file),
        Commands::Show { file } => cmd_show(&file),
    };

    if let Err(e) = result {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        _ => Level::DEBUG,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();
}

fn stamp(pending: PendingBlock, time: Option<i64>) -> PendingBlock {
    match time {
        Some(t) => pending.with_time(t),
        None => pending.created_now(),
    }
}

fn load_block(path: &Path) -> blockseal::Result<Block> {
    let data = fs::read(path)?;
    Ok(serde_json::from_slice(&data)?)
}

fn cmd_genesis(time: Option<i64>) -> Result<(), Box<dyn std::error::Error>> {
    let block = stamp(PendingBlock::genesis(), time).seal();
    println!("{}", serde_json::to_string_pretty(&block)?);
    Ok(())
}

fn cmd_seal(
    data: &str,
    height: u64,
    previous: Option<String>,
    time: Option<i64>,
) -> Result<(), Box<dyn std::error::Error>> {
    if height == 0 {
        return Err("height 0 is reserved for the genesis block".into());
    }
    let payload: serde_json::Value = serde_json::from_str(data)?;
    let mut pending = PendingBlock::from_value(&payload).at_height(height);
    if let Some(prev) = previous {
        pending = pending.with_previous_hash(prev);
    }
    let block = stamp(pending, time).seal();
    println!("{}", serde_json::to_string_pretty(&block)?);
    Ok(())
}

fn cmd_validate(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let block = load_block(path)?;
    if block.validate() {
        println!("valid {}", block.hash());
        Ok(())
    } else {
        println!("TAMPERED");
        std::process::exit(1);
    }
}

fn cmd_data(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let block = load_block(path)?;
    let payload = block.data_value()?;
    println!("{}", serde_json::to_string_pretty(&payload)?);
    Ok(())
}

fn cmd_show(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let block = load_block(path)?;
    let created = block
        .created_at()
        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| block.time().to_string());
    let marker = if block.is_genesis() { " (genesis)" } else { "" };
    println!("Hash:     {}", block.hash());
    println!("Height:   {}{}", block.height(), marker);
    println!("Created:  {}", created);
    println!("Previous: {}", block.previous_block_hash().unwrap_or("none"));
    println!("Body:     {}", block.body());
    Ok(())
}
