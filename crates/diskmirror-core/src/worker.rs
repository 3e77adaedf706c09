//! Worker loop
//!
//! One worker per context. A worker primes its context with an initial
//! read, then alternates between the completion wait and claiming the
//! next block, until the copy is quiescent or an error latches.

use crate::context::IoContext;
use crate::dispatch;
use crate::engine::Shared;
use crate::pipeline;
use std::sync::atomic::Ordering;

pub(crate) fn run(shared: &Shared, mut ctx: IoContext) {
    // EOF-at-start or a latched error: nothing for this worker to do.
    if !pipeline::issue_read(shared, &mut ctx) {
        return;
    }

    loop {
        dispatch::wait_for_completion(shared, &mut ctx);

        if shared.error_occurred() {
            break;
        }

        if ctx.completed.swap(false, Ordering::AcqRel) && !shared.read_complete() {
            let issued = pipeline::issue_read(shared, &mut ctx);
            if !issued && !shared.read_complete() && !shared.error_occurred() {
                // claim() refused without either latch set
                tracing::warn!(
                    offset = ctx.read_offset,
                    "no transfer issued with work remaining; stopping worker"
                );
                break;
            }
        }

        // Once no further reads can be issued and this context has nothing
        // in flight, no completion can ever reach this worker again.
        if shared.read_complete() && ctx.submission.is_none() {
            break;
        }
    }

    // An error exit can abandon a queued-but-unstarted operation; retire
    // it so the drain controller still observes quiescence.
    if ctx.submission.take().is_some() {
        shared.pending_ios.fetch_sub(1, Ordering::AcqRel);
    }
}

// ============================================================================
// UNIT TESTS
// ============================================================================
