//! Error types for the diskmirror core library

use thiserror::Error;

/// Main error type for copy operations
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Destination cannot hold the source
    #[error("Destination too small: source is {source_size} bytes, destination holds {dest_capacity} bytes")]
    DestinationTooSmall {
        /// Source size in bytes
        source_size: u64,
        /// Destination capacity in bytes
        dest_capacity: u64,
    },

    /// Block size is not a multiple of the destination sector size
    #[error("Block size {block_size} is not a multiple of the destination sector size {sector_size}")]
    UnalignedBlockSize {
        /// Configured block size in bytes
        block_size: usize,
        /// Destination sector size in bytes
        sector_size: u32,
    },

    /// Destination sector size could not be determined
    #[error("Destination sector size is unknown")]
    SectorSizeUnknown,

    /// A transfer buffer failed the sector-alignment check
    #[error("Buffer for context {context} is not aligned to {alignment} bytes")]
    BufferMisaligned {
        /// Index of the context whose buffer failed validation
        context: usize,
        /// Required alignment in bytes
        alignment: u32,
    },

    /// A read from the source failed
    #[error("Read failed at offset {offset}: {source}")]
    Read {
        /// Source offset of the failed read
        offset: u64,
        /// Underlying I/O error
        source: std::io::Error,
    },

    /// A write to the destination failed
    #[error("Write failed at offset {offset}: {source}")]
    Write {
        /// Destination offset of the failed write
        offset: u64,
        /// Underlying I/O error
        source: std::io::Error,
    },

    /// The padded write length exceeded the context buffer
    #[error("Padded write of {needed} bytes at offset {offset} exceeds the {available}-byte buffer")]
    PadOverflow {
        /// Offset of the block being padded
        offset: u64,
        /// Padded length in bytes
        needed: usize,
        /// Buffer capacity in bytes
        available: usize,
    },

    /// Flushing the destination after the copy failed
    #[error("Failed to flush destination: {0}")]
    Flush(#[source] std::io::Error),

    /// The copy was cancelled
    #[error("Copy cancelled")]
    Cancelled,

    /// A worker thread could not be spawned
    #[error("Failed to spawn worker thread: {0}")]
    Spawn(#[source] std::io::Error),

    /// A worker thread panicked
    #[error("A worker thread panicked")]
    WorkerPanicked,

    /// Unknown error
    #[error("Unknown error: {0}")]
    Unknown(String),
}

/// Result type alias using the diskmirror core error type
pub type Result<T> = std::result::Result<T, Error>;
