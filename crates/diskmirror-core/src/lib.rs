//! # diskmirror Core
//!
//! Core library providing the concurrent block-copy engine for the
//! diskmirror tool: a high-throughput, block-level copy of a contiguous
//! byte range from a source device or snapshot onto a destination device,
//! with one sector-aligned transfer in flight per worker thread.
//!
//! ## Modules
//!
//! - `engine`: the copy engine (offset allocation, worker pool, drain)
//! - `device`: the `BlockDev` seam the engine reads and writes through
//! - `buffer`: sector-aligned transfer buffers
//! - `config`: runtime configuration
//! - `settings`: persistent user settings from the configuration file
//! - `progress`: progress snapshots and completion reports
//! - `error`: error types and result alias
//!
//! ## Example
//!
//! ```no_run
//! use diskmirror_core::{Copier, CopyConfig, MemDevice};
//! use std::sync::Arc;
//!
//! let source = Arc::new(MemDevice::from_vec(vec![0xAB; 1024 * 1024], 4096));
//! let dest = Arc::new(MemDevice::new(1024 * 1024, 4096));
//!
//! let config = CopyConfig::new()
//!     .block_size(64 * 1024)
//!     .workers(4);
//!
//! let copier = Copier::with_config(config)
//!     .on_progress(|p| println!("{:.1}% - {}", p.percentage(), p.speed_display()));
//!
//! let report = copier.run(source, dest)?;
//! println!("Copied {} bytes in {:?}", report.bytes_written, report.elapsed);
//! # Ok::<(), diskmirror_core::Error>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod buffer;
pub mod config;
mod context;
pub mod device;
mod dispatch;
pub mod engine;
pub mod error;
mod pipeline;
pub mod progress;
pub mod settings;
mod worker;

pub use buffer::{align_down, align_up, is_aligned, AlignedBuf};
pub use config::{
    CopyConfig, DEFAULT_BLOCK_SIZE, DEFAULT_WORKERS, MAX_WORKERS, MIN_WORKERS,
};
pub use device::{read_full_at, write_all_at, BlockDev, MemDevice};
pub use engine::Copier;
pub use error::{Error, Result};
pub use progress::{
    format_duration, format_speed, CopyProgress, CopyReport, ProgressCallback,
};
pub use settings::{BehaviorSettings, CopySettings, Settings, SettingsError};
