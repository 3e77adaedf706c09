//! Completion dispatch
//!
//! Completion handlers must run on the worker thread that submitted the
//! operation; that keeps every context single-threaded and lock-free. The
//! wait below provides that guarantee: it drives the context's pending
//! submission as positioned I/O and invokes the matching handler in place.
//! With nothing in flight it parks the thread. The drain controller wakes
//! parked workers with `Thread::unpark`, whose token is retained if the
//! worker is not parked yet and discarded if the worker already exited,
//! so a wake-up can never be lost or misfire.

use crate::context::{IoContext, Submission};
use crate::device::{read_full_at, write_all_at};
use crate::engine::Shared;
use crate::pipeline;
use std::thread;

/// Block until a completion handler has run on this thread, or a wake-up
/// arrives
pub(crate) fn wait_for_completion(shared: &Shared, ctx: &mut IoContext) {
    match ctx.submission.take() {
        Some(Submission::Read { len }) => {
            let result = {
                let buf = &mut ctx.buf.as_mut_slice()[..len];
                read_full_at(shared.source.as_ref(), buf, ctx.read_offset)
            };
            pipeline::on_read_complete(shared, ctx, result);
        }
        Some(Submission::Write { len }) => {
            let result = write_all_at(shared.dest.as_ref(), &ctx.buf.as_slice()[..len], ctx.read_offset);
            pipeline::on_write_complete(shared, ctx, result);
        }
        None => thread::park(),
    }
}

// ============================================================================
// UNIT TESTS
// ============================================================================
