//! Integration tests for diskmirror-core
//!
//! These tests drive the complete copy engine against in-memory devices,
//! covering the boundary cases around block and sector geometry.

use diskmirror_core::{align_up, BlockDev, Copier, CopyConfig, Error, MemDevice};
use std::io;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

const KIB: usize = 1024;
const MIB: usize = 1024 * 1024;

/// Repeating 0x00..=0xFF pattern
fn counting_pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 256) as u8).collect()
}

/// Deterministic pseudo-random pattern
fn pseudo_random(len: usize) -> Vec<u8> {
    let mut state = 0x9E37_79B9_7F4A_7C15u64;
    (0..len)
        .map(|_| {
            state = state
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            (state >> 33) as u8
        })
        .collect()
}

/// Destination wrapper that starts failing writes after a budget of
/// successful ones
struct FailingDevice {
    inner: MemDevice,
    writes_left: AtomicI64,
}

impl FailingDevice {
    fn new(inner: MemDevice, writes_before_failure: i64) -> Self {
        Self {
            inner,
            writes_left: AtomicI64::new(writes_before_failure),
        }
    }
}

impl BlockDev for FailingDevice {
    fn len(&self) -> u64 {
        self.inner.len()
    }

    fn sector_size(&self) -> u32 {
        self.inner.sector_size()
    }

    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        self.inner.read_at(buf, offset)
    }

    fn write_at(&self, buf: &[u8], offset: u64) -> io::Result<usize> {
        if self.writes_left.fetch_sub(1, Ordering::AcqRel) <= 0 {
            return Err(io::Error::new(io::ErrorKind::Other, "injected write failure"));
        }
        self.inner.write_at(buf, offset)
    }

    fn flush(&self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Source wrapper that delays each read, to give cancellation a window
struct SlowDevice {
    inner: MemDevice,
    delay: Duration,
}

impl BlockDev for SlowDevice {
    fn len(&self) -> u64 {
        self.inner.len()
    }

    fn sector_size(&self) -> u32 {
        self.inner.sector_size()
    }

    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        std::thread::sleep(self.delay);
        self.inner.read_at(buf, offset)
    }

    fn write_at(&self, buf: &[u8], offset: u64) -> io::Result<usize> {
        self.inner.write_at(buf, offset)
    }

    fn flush(&self) -> io::Result<()> {
        self.inner.flush()
    }
}

// ============================================================================
// End-to-end copy scenarios
// ============================================================================

#[test]
fn test_copy_3mib_counting_pattern_four_workers() {
    let data = counting_pattern(3 * MIB);
    let source = Arc::new(MemDevice::from_vec(data.clone(), 4096));
    let dest = Arc::new(MemDevice::new(3 * MIB, 4096));

    let copier = Copier::with_config(CopyConfig::new().block_size(MIB).workers(4));
    let report = copier
        .run(source, Arc::clone(&dest) as Arc<dyn BlockDev>)
        .unwrap();

    assert_eq!(report.bytes_read, 3 * MIB as u64);
    assert_eq!(report.bytes_written, 3 * MIB as u64);
    assert_eq!(dest.snapshot(), data);
}

#[test]
fn test_copy_with_short_tail_pads_one_sector() {
    // 5 MiB + 777 bytes: the final 777-byte read pads to a full 4096-byte
    // sector, and nothing beyond that sector is touched.
    let total = 5 * MIB + 777;
    let padded = align_up(total, 4096);
    let data = pseudo_random(total);

    let source = Arc::new(MemDevice::from_vec(data.clone(), 4096));
    let dest = Arc::new(MemDevice::filled(6 * MIB, 0xEE, 4096));

    let copier = Copier::with_config(CopyConfig::new().block_size(MIB).workers(8));
    let report = copier
        .run(source, Arc::clone(&dest) as Arc<dyn BlockDev>)
        .unwrap();

    assert_eq!(report.bytes_read, total as u64);
    assert_eq!(report.bytes_written, padded as u64);

    let written = dest.snapshot();
    assert_eq!(&written[..total], &data[..]);
    assert!(
        written[total..padded].iter().all(|&b| b == 0),
        "tail padding must be zero"
    );
    assert!(
        written[padded..].iter().all(|&b| b == 0xEE),
        "no writes beyond the padded length"
    );
}

#[test]
fn test_copy_empty_source() {
    let source = Arc::new(MemDevice::new(0, 4096));
    let dest = Arc::new(MemDevice::filled(MIB, 0xEE, 4096));

    let copier = Copier::with_config(CopyConfig::new().block_size(MIB).workers(4));
    let report = copier
        .run(source, Arc::clone(&dest) as Arc<dyn BlockDev>)
        .unwrap();

    assert_eq!(report.bytes_read, 0);
    assert_eq!(report.bytes_written, 0);
    assert_eq!(dest.snapshot(), vec![0xEE; MIB]);
}

#[test]
fn test_copy_single_byte_source() {
    let source = Arc::new(MemDevice::from_vec(vec![0x42], 512));
    let dest = Arc::new(MemDevice::filled(4 * KIB, 0xEE, 512));

    let copier = Copier::with_config(CopyConfig::new().block_size(4 * KIB).workers(2));
    let report = copier
        .run(source, Arc::clone(&dest) as Arc<dyn BlockDev>)
        .unwrap();

    assert_eq!(report.bytes_read, 1);
    assert_eq!(report.bytes_written, 512);

    let written = dest.snapshot();
    assert_eq!(written[0], 0x42);
    assert!(written[1..512].iter().all(|&b| b == 0));
    assert!(written[512..].iter().all(|&b| b == 0xEE));
}

#[test]
fn test_copy_serial_worker_small_blocks() {
    // 1 MiB in 64 KiB blocks on a single worker: 16 sequential claims.
    let data = pseudo_random(MIB);
    let source = Arc::new(MemDevice::from_vec(data.clone(), 4096));
    let dest = Arc::new(MemDevice::new(MIB, 4096));

    let copier = Copier::with_config(CopyConfig::new().block_size(64 * KIB).workers(1));
    let report = copier
        .run(source, Arc::clone(&dest) as Arc<dyn BlockDev>)
        .unwrap();

    assert_eq!(report.bytes_read, MIB as u64);
    assert_eq!(report.bytes_written, MIB as u64);
    assert_eq!(dest.snapshot(), data);
}

#[test]
fn test_copy_source_smaller_than_block() {
    let data = pseudo_random(100 * KIB);
    let source = Arc::new(MemDevice::from_vec(data.clone(), 4096));
    let dest = Arc::new(MemDevice::new(MIB, 4096));

    let copier = Copier::with_config(CopyConfig::new().block_size(MIB).workers(4));
    let report = copier
        .run(source, Arc::clone(&dest) as Arc<dyn BlockDev>)
        .unwrap();

    assert_eq!(report.bytes_read, 100 * KIB as u64);
    assert_eq!(&dest.snapshot()[..100 * KIB], &data[..]);
}

#[test]
fn test_copy_max_workers() {
    let data = counting_pattern(2 * MIB);
    let source = Arc::new(MemDevice::from_vec(data.clone(), 512));
    let dest = Arc::new(MemDevice::new(2 * MIB, 512));

    let copier = Copier::with_config(CopyConfig::new().block_size(16 * KIB).workers(64));
    copier
        .run(source, Arc::clone(&dest) as Arc<dyn BlockDev>)
        .unwrap();

    assert_eq!(dest.snapshot(), data);
}

#[test]
fn test_copy_more_workers_than_blocks() {
    // 2 blocks of work across 16 workers: the idle workers must still
    // terminate cleanly.
    let data = pseudo_random(8 * KIB);
    let source = Arc::new(MemDevice::from_vec(data.clone(), 512));
    let dest = Arc::new(MemDevice::new(8 * KIB, 512));

    let copier = Copier::with_config(CopyConfig::new().block_size(4 * KIB).workers(16));
    copier
        .run(source, Arc::clone(&dest) as Arc<dyn BlockDev>)
        .unwrap();

    assert_eq!(dest.snapshot(), data);
}

#[test]
fn test_copy_repeated_runs_are_stable() {
    // The latches reset per run because each run builds fresh engine state.
    let data = pseudo_random(256 * KIB);

    for _ in 0..5 {
        let source = Arc::new(MemDevice::from_vec(data.clone(), 512));
        let dest = Arc::new(MemDevice::new(256 * KIB, 512));
        let copier = Copier::with_config(CopyConfig::new().block_size(32 * KIB).workers(8));
        copier
            .run(source, Arc::clone(&dest) as Arc<dyn BlockDev>)
            .unwrap();
        assert_eq!(dest.snapshot(), data);
    }
}

// ============================================================================
// Initialization rejection
// ============================================================================

#[test]
fn test_destination_one_byte_too_small() {
    let copier = Copier::with_config(CopyConfig::new().block_size(MIB));
    let result = copier.run(
        Arc::new(MemDevice::new(MIB, 4096)),
        Arc::new(MemDevice::new(MIB - 1, 4096)),
    );
    assert!(matches!(result, Err(Error::DestinationTooSmall { .. })));
}

#[test]
fn test_destination_exactly_source_sized() {
    let copier = Copier::with_config(CopyConfig::new().block_size(MIB));
    let result = copier.run(
        Arc::new(MemDevice::new(MIB, 4096)),
        Arc::new(MemDevice::new(MIB, 4096)),
    );
    assert!(result.is_ok());
}

#[test]
fn test_block_size_must_divide_by_sector() {
    let copier = Copier::with_config(CopyConfig::new().block_size(MIB + 512));
    let result = copier.run(
        Arc::new(MemDevice::new(MIB, 4096)),
        Arc::new(MemDevice::new(MIB, 4096)),
    );
    assert!(matches!(result, Err(Error::UnalignedBlockSize { .. })));
}

// ============================================================================
// Failure and cancellation handling
// ============================================================================

#[test]
fn test_induced_write_failure_drains_and_reports() {
    let data = counting_pattern(4 * MIB);
    let source = Arc::new(MemDevice::from_vec(data, 4096));
    let dest = Arc::new(FailingDevice::new(MemDevice::new(4 * MIB, 4096), 2));

    let copier = Copier::with_config(CopyConfig::new().block_size(256 * KIB).workers(8));
    let result = copier.run(source, dest);

    match result {
        Err(Error::Write { .. }) => {}
        other => panic!("expected a write failure, got {:?}", other.map(|r| r.bytes_written)),
    }
}

#[test]
fn test_write_failure_on_first_block() {
    let source = Arc::new(MemDevice::from_vec(counting_pattern(MIB), 4096));
    let dest = Arc::new(FailingDevice::new(MemDevice::new(MIB, 4096), 0));

    let copier = Copier::with_config(CopyConfig::new().block_size(256 * KIB).workers(4));
    assert!(matches!(
        copier.run(source, dest),
        Err(Error::Write { .. })
    ));
}

#[test]
fn test_cancel_mid_copy() {
    let source = Arc::new(SlowDevice {
        inner: MemDevice::from_vec(counting_pattern(MIB), 4096),
        delay: Duration::from_millis(2),
    });
    let dest = Arc::new(MemDevice::new(MIB, 4096));

    let copier = Copier::with_config(CopyConfig::new().block_size(4 * KIB).workers(2));
    let cancel = copier.cancel_handle();

    let canceller = std::thread::spawn({
        let cancel: Arc<AtomicBool> = Arc::clone(&cancel);
        move || {
            std::thread::sleep(Duration::from_millis(20));
            cancel.store(true, Ordering::Release);
        }
    });

    let result = copier.run(source, dest);
    canceller.join().unwrap();

    assert!(matches!(result, Err(Error::Cancelled)));
}

// ============================================================================
// Progress reporting
// ============================================================================

#[test]
fn test_progress_callback_fires_and_finishes() {
    let data = counting_pattern(2 * MIB);
    let source = Arc::new(SlowDevice {
        inner: MemDevice::from_vec(data.clone(), 4096),
        delay: Duration::from_millis(1),
    });
    let dest = Arc::new(MemDevice::new(2 * MIB, 4096));

    let calls = Arc::new(AtomicU64::new(0));
    let final_written = Arc::new(AtomicU64::new(0));

    let copier = Copier::with_config(
        CopyConfig::new()
            .block_size(64 * KIB)
            .workers(2)
            .progress_interval(Duration::from_millis(5)),
    )
    .on_progress({
        let calls = Arc::clone(&calls);
        let final_written = Arc::clone(&final_written);
        move |p| {
            calls.fetch_add(1, Ordering::AcqRel);
            final_written.store(p.bytes_written, Ordering::Release);
            assert!(p.bytes_written <= p.total_bytes);
        }
    });

    copier
        .run(source, Arc::clone(&dest) as Arc<dyn BlockDev>)
        .unwrap();

    // At least the final completion snapshot
    assert!(calls.load(Ordering::Acquire) >= 1);
    assert_eq!(final_written.load(Ordering::Acquire), 2 * MIB as u64);
    assert_eq!(dest.snapshot(), data);
}
