//! diskmirror - high-throughput block-level copy of a device or snapshot
//!
//! # Usage
//!
//! ```bash
//! # Mirror a snapshot onto a partition
//! diskmirror /dev/nvme0n1p2 /dev/sdb1
//!
//! # Tune the pipeline
//! diskmirror source.img /dev/sdb --workers 16 --block-size 4M
//!
//! # Non-interactive (accepts the sector-size fallback too)
//! diskmirror source.img /dev/sdb --yes
//! ```

use anyhow::{bail, Context, Result};
use clap::Parser;
use console::style;
use dialoguer::Confirm;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use diskmirror_core::{Copier, CopyConfig, Settings, MAX_WORKERS, MIN_WORKERS};
use diskmirror_platform::{has_elevated_privileges, open_destination, open_source, BlockDev};

mod progress;

use progress::{copy_progress_bar, format_size};

/// Sector size offered when the destination cannot be probed
const FALLBACK_SECTOR_SIZE: u32 = 4096;

/// diskmirror - high-throughput block-level copy of a device or snapshot
#[derive(Parser)]
#[command(name = "diskmirror")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Source device, snapshot, or image file
    source: String,

    /// Destination device or partition (its contents are OVERWRITTEN)
    dest: String,

    /// Number of parallel I/O workers
    #[arg(short = 'j', long, value_parser = clap::value_parser!(u64).range(1..=64))]
    workers: Option<u64>,

    /// Transfer block size (e.g. 1M, 4M, 512K)
    #[arg(short, long)]
    block_size: Option<String>,

    /// Skip confirmation prompts; also accepts the sector-size fallback
    #[arg(short = 'y', long)]
    yes: bool,

    /// Use cached I/O instead of direct I/O (for image files on
    /// filesystems without direct I/O support)
    #[arg(long)]
    no_direct: bool,

    /// Suppress all output except errors
    #[arg(short, long)]
    quiet: bool,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn main() {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(cli) {
        eprintln!("{} {:#}", style("Error:").red().bold(), e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let settings = Settings::load();
    let quiet = cli.quiet;

    let workers = match cli.workers {
        Some(n) => n as usize,
        None => settings.copy.workers,
    };
    if !(MIN_WORKERS..=MAX_WORKERS).contains(&workers) {
        bail!(
            "worker count must be between {} and {}, got {}",
            MIN_WORKERS,
            MAX_WORKERS,
            workers
        );
    }

    let block_size_str = cli
        .block_size
        .clone()
        .unwrap_or_else(|| settings.copy.block_size.clone());
    let block_size = parse_block_size(&block_size_str)?;

    if !has_elevated_privileges() {
        tracing::warn!("not running with elevated privileges; raw device access may fail");
    }

    // Open both ends before prompting so size problems surface early
    let direct_io = !cli.no_direct;
    let source = open_source(&cli.source, direct_io)
        .with_context(|| format!("Failed to open source: {}", cli.source))?;
    let mut dest = open_destination(&cli.dest, direct_io)
        .with_context(|| format!("Failed to open destination: {}", cli.dest))?;

    // Sector-size fallback policy: prompt, unless told not to ask
    if dest.sector_size() == 0 {
        let assume = cli.yes || settings.behavior.assume_sector_size;
        let accepted = if assume {
            true
        } else if quiet {
            false
        } else {
            Confirm::new()
                .with_prompt(format!(
                    "Destination sector size could not be determined. Assume {} bytes?",
                    FALLBACK_SECTOR_SIZE
                ))
                .default(true)
                .interact()?
        };
        if !accepted {
            bail!("destination sector size unknown; aborting");
        }
        tracing::info!(sector_size = FALLBACK_SECTOR_SIZE, "using fallback sector size");
        dest.set_sector_size(FALLBACK_SECTOR_SIZE);
    }

    let total_size = source.len();

    if !quiet {
        println!(
            "{} {} ({})",
            style("Source:").bold(),
            style(&cli.source).cyan(),
            format_size(total_size)
        );
        println!(
            "{} {} ({})",
            style("Target:").bold(),
            style(&cli.dest).cyan(),
            format_size(dest.len())
        );
        println!(
            "  sector size {} B, block size {}, {} workers",
            dest.sector_size(),
            format_size(block_size as u64),
            workers
        );
    }

    let skip_confirm = cli.yes || settings.behavior.skip_confirmation;
    if !skip_confirm {
        let confirmed = Confirm::new()
            .with_prompt(format!(
                "This will OVERWRITE all data on {}. Continue?",
                cli.dest
            ))
            .default(false)
            .interact()?;
        if !confirmed {
            println!("Aborted.");
            return Ok(());
        }
    }

    let config = CopyConfig::new().block_size(block_size).workers(workers);
    let mut copier = Copier::with_config(config);

    let bar = if quiet {
        None
    } else {
        Some(copy_progress_bar(total_size))
    };
    if let Some(ref bar) = bar {
        let bar = bar.clone();
        copier = copier.on_progress(move |p| {
            bar.set_position(p.bytes_written.min(p.total_bytes));
        });
    }

    let report = copier
        .run(Arc::new(source), Arc::new(dest))
        .context("Copy failed")?;

    if let Some(bar) = bar {
        bar.finish_and_clear();
    }

    if !quiet {
        println!(
            "{} Copied {} in {} ({})",
            style("✓").green(),
            format_size(report.bytes_read),
            diskmirror_core::format_duration(report.elapsed.as_secs()),
            report.speed_display()
        );
    }

    Ok(())
}

/// Parse a block size string like "1M", "512K", or "4194304"
fn parse_block_size(s: &str) -> Result<usize> {
    let s = s.trim().to_uppercase();

    let (num_str, multiplier) = if s.ends_with('K') {
        (&s[..s.len() - 1], 1024)
    } else if s.ends_with('M') {
        (&s[..s.len() - 1], 1024 * 1024)
    } else if s.ends_with('G') {
        (&s[..s.len() - 1], 1024 * 1024 * 1024)
    } else {
        (s.as_str(), 1)
    };

    let num: usize = num_str
        .parse()
        .with_context(|| format!("Invalid block size: {}", s))?;

    let size = num * multiplier;

    if size < 4096 {
        bail!("Block size must be at least 4K");
    }
    if size > 1024 * 1024 * 1024 {
        bail!("Block size must be at most 1G");
    }

    Ok(size)
}
