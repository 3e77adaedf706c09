//! Per-worker I/O contexts
//!
//! Each worker owns one context for the lifetime of a copy: a
//! sector-aligned buffer of exactly one block, a submission slot for the
//! operation currently in flight, and the completion flag its callbacks
//! communicate through. Contexts are never shared between workers, so a
//! context's fields other than `completed` need no synchronization.

use crate::buffer::{is_aligned, AlignedBuf};
use crate::error::{Error, Result};
use std::sync::atomic::AtomicBool;

/// An operation queued on a context, waiting for the worker's next wait
///
/// Plays the role of the per-operation descriptor: it carries everything
/// the completion handler needs beyond the context itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Submission {
    /// Read `len` bytes from the source at the context's `read_offset`
    Read {
        /// Requested transfer length
        len: usize,
    },
    /// Write `len` bytes to the destination at the context's `read_offset`
    Write {
        /// Padded transfer length
        len: usize,
    },
}

/// One reusable I/O context
pub(crate) struct IoContext {
    /// Sector-aligned transfer buffer, exactly one block long
    pub buf: AlignedBuf,

    /// The operation in flight on this context, if any
    pub submission: Option<Submission>,

    /// Source offset of the current read/write cycle
    pub read_offset: u64,

    /// Padded write length of the current cycle
    pub write_len: usize,

    /// Set by the write-completion (or terminal) callback, cleared by the
    /// worker before it claims the next block
    pub completed: AtomicBool,
}

impl IoContext {
    fn new(block_size: usize, alignment: usize) -> Self {
        Self {
            buf: AlignedBuf::new(block_size, alignment),
            submission: None,
            read_offset: 0,
            write_len: 0,
            completed: AtomicBool::new(false),
        }
    }
}

/// Build the context pool, one context per worker
///
/// Every buffer is validated against the destination sector size before
/// the pool is handed out; a misaligned buffer aborts initialization.
pub(crate) fn build_contexts(
    count: usize,
    block_size: usize,
    sector_size: u32,
) -> Result<Vec<IoContext>> {
    let mut contexts = Vec::with_capacity(count);
    for i in 0..count {
        let ctx = IoContext::new(block_size, sector_size as usize);
        if !is_aligned(ctx.buf.addr(), sector_size as usize) {
            return Err(Error::BufferMisaligned {
                context: i,
                alignment: sector_size,
            });
        }
        contexts.push(ctx);
    }
    Ok(contexts)
}

// ============================================================================
// UNIT TESTS
// ============================================================================
