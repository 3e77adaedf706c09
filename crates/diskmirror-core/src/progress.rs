//! Progress reporting for running copies

use std::time::{Duration, Instant};

/// Snapshot of a running copy, handed to the progress callback
#[derive(Debug, Clone)]
pub struct CopyProgress {
    /// Bytes read from the source so far
    pub bytes_read: u64,

    /// Bytes committed to the destination so far (including tail padding)
    pub bytes_written: u64,

    /// Total bytes to copy
    pub total_bytes: u64,

    /// Current write speed in bytes per second
    pub speed_bps: u64,

    /// Estimated time remaining in seconds
    pub eta_seconds: Option<u64>,

    /// Elapsed time since the copy started
    pub elapsed: Duration,
}

impl CopyProgress {
    /// Completion percentage (0.0 to 100.0), by bytes written
    pub fn percentage(&self) -> f64 {
        if self.total_bytes == 0 {
            100.0
        } else {
            (self.bytes_written.min(self.total_bytes) as f64 / self.total_bytes as f64) * 100.0
        }
    }

    /// Format the current speed for display
    pub fn speed_display(&self) -> String {
        format_speed(self.speed_bps)
    }

    /// Format the ETA for display
    pub fn eta_display(&self) -> String {
        match self.eta_seconds {
            Some(secs) if secs > 0 => format_duration(secs),
            _ => "calculating...".to_string(),
        }
    }
}

/// Progress callback type
pub type ProgressCallback = Box<dyn Fn(&CopyProgress) + Send + Sync>;

/// Result of a completed copy
#[derive(Debug, Clone)]
pub struct CopyReport {
    /// Total bytes read from the source
    pub bytes_read: u64,

    /// Total bytes written to the destination (including tail padding)
    pub bytes_written: u64,

    /// Total time elapsed
    pub elapsed: Duration,

    /// Average write speed in bytes per second
    pub average_speed: u64,
}

impl CopyReport {
    /// Format the average speed for display
    pub fn speed_display(&self) -> String {
        format_speed(self.average_speed)
    }
}

/// Speed tracking with smoothing over recent samples
pub(crate) struct SpeedTracker {
    samples: Vec<(Instant, u64)>,
    max_samples: usize,
}

impl SpeedTracker {
    pub(crate) fn new() -> Self {
        Self {
            samples: Vec::with_capacity(10),
            max_samples: 10,
        }
    }

    pub(crate) fn update(&mut self, bytes_written: u64) {
        if self.samples.len() >= self.max_samples {
            self.samples.remove(0);
        }
        self.samples.push((Instant::now(), bytes_written));
    }

    pub(crate) fn current_speed(&self) -> u64 {
        if self.samples.len() < 2 {
            return 0;
        }

        let first = &self.samples[0];
        let last = &self.samples[self.samples.len() - 1];

        let duration = last.0.duration_since(first.0);
        let bytes = last.1.saturating_sub(first.1);

        if duration.as_millis() > 0 {
            (bytes as f64 / duration.as_secs_f64()) as u64
        } else {
            0
        }
    }
}

/// Calculate estimated time remaining
pub(crate) fn calculate_eta(bytes_written: u64, total_bytes: u64, speed_bps: u64) -> Option<u64> {
    if speed_bps == 0 || bytes_written >= total_bytes {
        return None;
    }
    Some(total_bytes.saturating_sub(bytes_written) / speed_bps)
}

/// Format a speed for display (e.g., "45.2 MB/s")
pub fn format_speed(bytes_per_second: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes_per_second >= GB {
        format!("{:.1} GB/s", bytes_per_second as f64 / GB as f64)
    } else if bytes_per_second >= MB {
        format!("{:.1} MB/s", bytes_per_second as f64 / MB as f64)
    } else if bytes_per_second >= KB {
        format!("{:.1} KB/s", bytes_per_second as f64 / KB as f64)
    } else {
        format!("{} B/s", bytes_per_second)
    }
}

/// Format a duration in seconds for display (e.g., "2m 30s")
pub fn format_duration(seconds: u64) -> String {
    if seconds >= 3600 {
        format!("{}h {}m", seconds / 3600, (seconds % 3600) / 60)
    } else if seconds >= 60 {
        format!("{}m {}s", seconds / 60, seconds % 60)
    } else {
        format!("{}s", seconds)
    }
}

// ============================================================================
// UNIT TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percentage() {
        let mut progress = CopyProgress {
            bytes_read: 0,
            bytes_written: 0,
            total_bytes: 1000,
            speed_bps: 0,
            eta_seconds: None,
            elapsed: Duration::ZERO,
        };
        assert_eq!(progress.percentage(), 0.0);

        progress.bytes_written = 500;
        assert_eq!(progress.percentage(), 50.0);

        // Tail padding can push bytes_written past total_bytes
        progress.bytes_written = 1024;
        assert_eq!(progress.percentage(), 100.0);
    }

    #[test]
    fn test_percentage_zero_total() {
        let progress = CopyProgress {
            bytes_read: 0,
            bytes_written: 0,
            total_bytes: 0,
            speed_bps: 0,
            eta_seconds: None,
            elapsed: Duration::ZERO,
        };
        assert_eq!(progress.percentage(), 100.0);
    }

    #[test]
    fn test_eta_display() {
        let mut progress = CopyProgress {
            bytes_read: 0,
            bytes_written: 0,
            total_bytes: 1000,
            speed_bps: 0,
            eta_seconds: None,
            elapsed: Duration::ZERO,
        };
        assert_eq!(progress.eta_display(), "calculating...");

        progress.eta_seconds = Some(90);
        assert_eq!(progress.eta_display(), "1m 30s");
    }

    #[test]
    fn test_format_speed() {
        assert_eq!(format_speed(0), "0 B/s");
        assert_eq!(format_speed(512), "512 B/s");
        assert_eq!(format_speed(1024), "1.0 KB/s");
        assert_eq!(format_speed(1536), "1.5 KB/s");
        assert_eq!(format_speed(50 * 1024 * 1024), "50.0 MB/s");
        assert_eq!(format_speed(1024 * 1024 * 1024), "1.0 GB/s");
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(0), "0s");
        assert_eq!(format_duration(59), "59s");
        assert_eq!(format_duration(90), "1m 30s");
        assert_eq!(format_duration(3661), "1h 1m");
    }

    #[test]
    fn test_calculate_eta() {
        assert_eq!(calculate_eta(0, 1000, 0), None);
        assert_eq!(calculate_eta(1000, 1000, 100), None);
        assert_eq!(calculate_eta(500, 1000, 100), Some(5));
    }

    #[test]
    fn test_speed_tracker_needs_two_samples() {
        let mut tracker = SpeedTracker::new();
        assert_eq!(tracker.current_speed(), 0);
        tracker.update(1000);
        assert_eq!(tracker.current_speed(), 0);
    }

    #[test]
    fn test_speed_tracker_multiple_samples() {
        if std::env::var("CI").is_ok() {
            return;
        }

        let mut tracker = SpeedTracker::new();
        tracker.update(0);
        std::thread::sleep(Duration::from_millis(100));
        tracker.update(100_000);

        let speed = tracker.current_speed();
        assert!(speed > 500_000 && speed < 2_000_000, "Speed was {}", speed);
    }

    #[test]
    fn test_report_speed_display() {
        let report = CopyReport {
            bytes_read: 1024 * 1024,
            bytes_written: 1024 * 1024,
            elapsed: Duration::from_secs(1),
            average_speed: 50 * 1024 * 1024,
        };
        assert_eq!(report.speed_display(), "50.0 MB/s");
    }
}
