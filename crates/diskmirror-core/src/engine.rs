//! The copy engine
//!
//! [`Copier`] drives a block-level copy of a source device onto a
//! destination device: it validates the pair, builds the context pool,
//! runs one worker thread per context, and drains and flushes on the way
//! out. All cross-worker coordination is a handful of atomics on
//! [`Shared`]; the hot path takes no locks.

use crate::config::CopyConfig;
use crate::context::build_contexts;
use crate::device::BlockDev;
use crate::error::{Error, Result};
use crate::progress::{calculate_eta, CopyProgress, CopyReport, ProgressCallback, SpeedTracker};
use crate::worker;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::thread;
use std::time::{Duration, Instant};

/// How often the drain controller re-examines the shared state
const MONITOR_TICK: Duration = Duration::from_millis(10);

/// Engine state shared by the controller and every worker
///
/// Created once per copy and immutable afterwards except for the atomics.
/// `read_complete` and `error_occurred` are set-once latches: they are
/// never cleared while a copy runs.
pub(crate) struct Shared {
    /// Open source device
    pub source: Arc<dyn BlockDev>,

    /// Open destination device
    pub dest: Arc<dyn BlockDev>,

    /// Source length in bytes
    pub total_size: u64,

    /// Destination sector size in bytes
    pub sector_size: u32,

    /// Transfer block size in bytes; a multiple of `sector_size`
    pub block_size: usize,

    /// Next unclaimed source offset
    pub file_offset: AtomicU64,

    /// Operations submitted but not yet completed
    pub pending_ios: AtomicU64,

    /// No further read can be issued
    pub read_complete: AtomicBool,

    /// A non-EOF failure occurred
    pub error_occurred: AtomicBool,

    /// Monotonic count of bytes read from the source
    pub bytes_read_total: AtomicU64,

    /// Monotonic count of bytes written to the destination
    pub bytes_written_total: AtomicU64,

    /// The error that latched `error_occurred` first; later errors are
    /// only logged
    first_error: OnceLock<Error>,
}

impl Shared {
    pub(crate) fn new(
        source: Arc<dyn BlockDev>,
        dest: Arc<dyn BlockDev>,
        config: &CopyConfig,
    ) -> Self {
        let total_size = source.len();
        let sector_size = dest.sector_size();
        Self {
            source,
            dest,
            total_size,
            sector_size,
            block_size: config.block_size,
            file_offset: AtomicU64::new(0),
            pending_ios: AtomicU64::new(0),
            read_complete: AtomicBool::new(false),
            error_occurred: AtomicBool::new(false),
            bytes_read_total: AtomicU64::new(0),
            bytes_written_total: AtomicU64::new(0),
            first_error: OnceLock::new(),
        }
    }

    /// Claim the next unread block
    ///
    /// A single fetch-and-add hands out monotonically increasing,
    /// block-aligned offsets, so each offset is claimed by exactly one
    /// worker. Returns `None` at end-of-source and latches
    /// `read_complete`; the final claim before that may be shorter than a
    /// block.
    pub(crate) fn claim(&self) -> Option<(u64, usize)> {
        let offset = self
            .file_offset
            .fetch_add(self.block_size as u64, Ordering::AcqRel);

        if offset >= self.total_size {
            self.read_complete.store(true, Ordering::Release);
            return None;
        }

        let len = (self.total_size - offset).min(self.block_size as u64) as usize;
        Some((offset, len))
    }

    /// Record a failure: keep the first error, log the rest, and raise
    /// the `error_occurred` latch
    pub(crate) fn latch_error(&self, err: Error) {
        tracing::error!(%err, "copy error");
        let _ = self.first_error.set(err);
        self.error_occurred.store(true, Ordering::Release);
    }

    pub(crate) fn read_complete(&self) -> bool {
        self.read_complete.load(Ordering::Acquire)
    }

    pub(crate) fn error_occurred(&self) -> bool {
        self.error_occurred.load(Ordering::Acquire)
    }

    pub(crate) fn pending(&self) -> u64 {
        self.pending_ios.load(Ordering::Acquire)
    }

    pub(crate) fn bytes_read(&self) -> u64 {
        self.bytes_read_total.load(Ordering::Acquire)
    }

    pub(crate) fn bytes_written(&self) -> u64 {
        self.bytes_written_total.load(Ordering::Acquire)
    }
}

/// Block-copy engine
pub struct Copier {
    config: CopyConfig,
    progress_callback: Option<ProgressCallback>,
    cancel_flag: Arc<AtomicBool>,
}

impl Copier {
    /// Create a new copier with default configuration
    pub fn new() -> Self {
        Self::with_config(CopyConfig::default())
    }

    /// Create a new copier with custom configuration
    pub fn with_config(config: CopyConfig) -> Self {
        Self {
            config,
            progress_callback: None,
            cancel_flag: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Set a progress callback
    pub fn on_progress<F>(mut self, callback: F) -> Self
    where
        F: Fn(&CopyProgress) + Send + Sync + 'static,
    {
        self.progress_callback = Some(Box::new(callback));
        self
    }

    /// Get a handle to cancel the copy
    ///
    /// Setting the flag latches the error path: no further blocks are
    /// claimed, in-flight transfers drain, and the copy reports
    /// [`Error::Cancelled`].
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel_flag)
    }

    /// Copy `source` onto `dest` from offset 0
    ///
    /// Validates the device pair, then runs one worker per configured
    /// context until every claimed block has been written. On success the
    /// destination holds a byte-for-byte image of the source, with the
    /// final partial sector (if any) zero-padded.
    pub fn run(&self, source: Arc<dyn BlockDev>, dest: Arc<dyn BlockDev>) -> Result<CopyReport> {
        self.config.validate()?;

        let total_size = source.len();
        let dest_capacity = dest.len();
        let sector_size = dest.sector_size();

        if sector_size == 0 {
            return Err(Error::SectorSizeUnknown);
        }
        if dest_capacity < total_size {
            return Err(Error::DestinationTooSmall {
                source_size: total_size,
                dest_capacity,
            });
        }
        if !crate::buffer::is_aligned(self.config.block_size, sector_size as usize) {
            return Err(Error::UnalignedBlockSize {
                block_size: self.config.block_size,
                sector_size,
            });
        }

        let contexts = build_contexts(self.config.workers, self.config.block_size, sector_size)?;

        self.cancel_flag.store(false, Ordering::Release);
        let start = Instant::now();
        let mut shared = Shared::new(source, Arc::clone(&dest), &self.config);

        tracing::info!(
            total_size,
            dest_capacity,
            sector_size,
            block_size = self.config.block_size,
            workers = self.config.workers,
            "starting block copy"
        );

        thread::scope(|scope| {
            let mut handles = Vec::with_capacity(contexts.len());
            for (i, ctx) in contexts.into_iter().enumerate() {
                let shared = &shared;
                let spawned = thread::Builder::new()
                    .name(format!("mirror-{i}"))
                    .spawn_scoped(scope, move || worker::run(shared, ctx));
                match spawned {
                    Ok(handle) => handles.push(handle),
                    Err(e) => {
                        shared.latch_error(Error::Spawn(e));
                        break;
                    }
                }
            }

            self.monitor(&shared, start);

            // Wake any worker still parked in its completion wait. A
            // wake-up aimed at a worker that already exited is a no-op.
            for handle in &handles {
                handle.thread().unpark();
            }
            for handle in handles {
                if handle.join().is_err() {
                    shared.latch_error(Error::WorkerPanicked);
                }
            }
        });

        debug_assert_eq!(shared.pending(), 0);

        if let Err(e) = dest.flush() {
            shared.latch_error(Error::Flush(e));
        }

        let elapsed = start.elapsed();
        let bytes_read = shared.bytes_read();
        let bytes_written = shared.bytes_written();

        if let Some(ref callback) = self.progress_callback {
            callback(&CopyProgress {
                bytes_read,
                bytes_written,
                total_bytes: shared.total_size,
                speed_bps: 0,
                eta_seconds: None,
                elapsed,
            });
        }

        if shared.error_occurred() {
            return Err(shared
                .first_error
                .take()
                .unwrap_or_else(|| Error::Unknown("copy failed".to_string())));
        }

        let average_speed = if elapsed.as_secs() > 0 {
            bytes_written / elapsed.as_secs()
        } else {
            bytes_written
        };

        tracing::info!(bytes_read, bytes_written, ?elapsed, "block copy complete");

        Ok(CopyReport {
            bytes_read,
            bytes_written,
            elapsed,
            average_speed,
        })
    }

    /// Watch the shared state until the copy is quiescent, cancelled, or
    /// failed, firing the progress callback along the way
    fn monitor(&self, shared: &Shared, start: Instant) {
        let mut tracker = SpeedTracker::new();
        let mut last_report = Instant::now();

        loop {
            if shared.error_occurred() {
                break;
            }
            if self.cancel_flag.load(Ordering::Acquire) {
                shared.latch_error(Error::Cancelled);
                break;
            }
            if shared.read_complete() && shared.pending() == 0 {
                break;
            }

            thread::sleep(MONITOR_TICK);

            if let Some(ref callback) = self.progress_callback {
                if last_report.elapsed() >= self.config.progress_interval {
                    let bytes_written = shared.bytes_written();
                    tracker.update(bytes_written);
                    let speed_bps = tracker.current_speed();
                    callback(&CopyProgress {
                        bytes_read: shared.bytes_read(),
                        bytes_written,
                        total_bytes: shared.total_size,
                        speed_bps,
                        eta_seconds: calculate_eta(bytes_written, shared.total_size, speed_bps),
                        elapsed: start.elapsed(),
                    });
                    last_report = Instant::now();
                }
            }
        }
    }
}

impl Default for Copier {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// UNIT TESTS
// ============================================================================
