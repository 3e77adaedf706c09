//! The read/write pipeline
//!
//! Each context cycles IDLE → READING → WRITING → IDLE. A read completion
//! pads the transfer up to the next sector multiple and chains the write
//! at the offset captured when the read was issued; the write completion
//! raises the context's `completed` flag so its worker claims the next
//! block. All handlers run on the worker thread that owns the context
//! (see `dispatch`), so only the shared engine state needs atomics.

use crate::buffer::align_up;
use crate::context::{IoContext, Submission};
use crate::engine::Shared;
use crate::error::Error;
use std::io;
use std::sync::atomic::Ordering;

/// Try to start the next read cycle on `ctx`
///
/// Returns false when no read was issued: the terminal latches are set,
/// or the offset allocator reports end-of-source.
pub(crate) fn issue_read(shared: &Shared, ctx: &mut IoContext) -> bool {
    if shared.read_complete() || shared.error_occurred() {
        return false;
    }

    let Some((offset, len)) = shared.claim() else {
        return false;
    };

    ctx.read_offset = offset;
    ctx.write_len = 0;
    ctx.completed.store(false, Ordering::Release);

    shared.pending_ios.fetch_add(1, Ordering::AcqRel);
    ctx.submission = Some(Submission::Read { len });
    tracing::trace!(offset, len, "read issued");
    true
}

/// Read-completion handler
pub(crate) fn on_read_complete(shared: &Shared, ctx: &mut IoContext, result: io::Result<usize>) {
    match result {
        Err(e) => {
            shared.latch_error(Error::Read {
                offset: ctx.read_offset,
                source: e,
            });
            ctx.completed.store(true, Ordering::Release);
            shared.pending_ios.fetch_sub(1, Ordering::AcqRel);
        }
        // End-of-device arrives as a zero-length read, never as an error
        Ok(0) => {
            shared.read_complete.store(true, Ordering::Release);
            ctx.completed.store(true, Ordering::Release);
            shared.pending_ios.fetch_sub(1, Ordering::AcqRel);
        }
        Ok(n) => {
            shared.bytes_read_total.fetch_add(n as u64, Ordering::AcqRel);

            // Un-cached writes must be whole sectors: round up and
            // zero-fill the pad.
            let padded = align_up(n, shared.sector_size as usize);
            if padded > ctx.buf.len() {
                shared.latch_error(Error::PadOverflow {
                    offset: ctx.read_offset,
                    needed: padded,
                    available: ctx.buf.len(),
                });
                ctx.completed.store(true, Ordering::Release);
                shared.pending_ios.fetch_sub(1, Ordering::AcqRel);
                return;
            }
            ctx.buf.as_mut_slice()[n..padded].fill(0);
            ctx.write_len = padded;

            // Chain the write before retiring the read so pendingIOs never
            // transiently reaches zero while this context still has work.
            issue_write(shared, ctx);
            shared.pending_ios.fetch_sub(1, Ordering::AcqRel);
            // `completed` stays clear: the context is now WRITING.
        }
    }
}

/// Queue the write for the block just read, at the same offset
fn issue_write(shared: &Shared, ctx: &mut IoContext) {
    shared.pending_ios.fetch_add(1, Ordering::AcqRel);
    ctx.submission = Some(Submission::Write { len: ctx.write_len });
    tracing::trace!(offset = ctx.read_offset, len = ctx.write_len, "write issued");
}

/// Write-completion handler
pub(crate) fn on_write_complete(shared: &Shared, ctx: &mut IoContext, result: io::Result<()>) {
    shared.pending_ios.fetch_sub(1, Ordering::AcqRel);

    match result {
        Ok(()) => {
            shared
                .bytes_written_total
                .fetch_add(ctx.write_len as u64, Ordering::AcqRel);
        }
        Err(e) => {
            shared.latch_error(Error::Write {
                offset: ctx.read_offset,
                source: e,
            });
        }
    }

    ctx.completed.store(true, Ordering::Release);
}

// ============================================================================
// UNIT TESTS
// ============================================================================
