use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

/// Counters shared by every document task in a batch.
pub struct BatchMetrics {
    documents_read: AtomicUsize,
    documents_extracted: AtomicUsize,
    records_extracted: AtomicUsize,
    bytes_read: AtomicU64,

    // Timing (in microseconds)
    total_read_time_us: AtomicU64,
    total_extract_time_us: AtomicU64,
}

impl BatchMetrics {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            documents_read: AtomicUsize::new(0),
            documents_extracted: AtomicUsize::new(0),
            records_extracted: AtomicUsize::new(0),
            bytes_read: AtomicU64::new(0),
            total_read_time_us: AtomicU64::new(0),
            total_extract_time_us: AtomicU64::new(0),
        })
    }

    pub fn record_read(&self, duration: Duration, bytes: u64) {
        self.documents_read.fetch_add(1, Ordering::Relaxed);
        self.bytes_read.fetch_add(bytes, Ordering::Relaxed);
        self.total_read_time_us
            .fetch_add(duration.as_micros() as u64, Ordering::Relaxed);
    }

    pub fn record_extract(&self, duration: Duration, produced_record: bool) {
        self.documents_extracted.fetch_add(1, Ordering::Relaxed);
        if produced_record {
            self.records_extracted.fetch_add(1, Ordering::Relaxed);
        }
        self.total_extract_time_us
            .fetch_add(duration.as_micros() as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self, wall_time: Duration) -> MetricsSnapshot {
        MetricsSnapshot {
            documents_read: self.documents_read.load(Ordering::Relaxed),
            documents_extracted: self.documents_extracted.load(Ordering::Relaxed),
            records_extracted: self.records_extracted.load(Ordering::Relaxed),
            bytes_read: self.bytes_read.load(Ordering::Relaxed),
            avg_read_time_ms: avg_time_ms(&self.total_read_time_us, &self.documents_read),
            avg_extract_time_ms: avg_time_ms(
                &self.total_extract_time_us,
                &self.documents_extracted,
            ),
            wall_time_ms: wall_time.as_secs_f64() * 1000.0,
        }
    }
}

fn avg_time_ms(total_us: &AtomicU64, count: &AtomicUsize) -> f64 {
    let total = total_us.load(Ordering::Relaxed) as f64;
    let cnt = count.load(Ordering::Relaxed) as f64;
    if cnt > 0.0 {
        total / cnt / 1000.0 // Convert to ms
    } else {
        0.0
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub documents_read: usize,
    pub documents_extracted: usize,
    pub records_extracted: usize,
    pub bytes_read: u64,
    pub avg_read_time_ms: f64,
    pub avg_extract_time_ms: f64,
    pub wall_time_ms: f64,
}

pub struct TimedOperation {
    start: Instant,
}

impl TimedOperation {
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_averages() {
        let metrics = BatchMetrics::new();
        metrics.record_read(Duration::from_millis(2), 100);
        metrics.record_read(Duration::from_millis(4), 50);
        metrics.record_extract(Duration::from_millis(10), true);
        metrics.record_extract(Duration::from_millis(20), false);

        let snapshot = metrics.snapshot(Duration::from_secs(1));

        assert_eq!(snapshot.documents_read, 2);
        assert_eq!(snapshot.bytes_read, 150);
        assert_eq!(snapshot.records_extracted, 1);
        assert!((snapshot.avg_read_time_ms - 3.0).abs() < 1e-9);
        assert!((snapshot.avg_extract_time_ms - 15.0).abs() < 1e-9);
        assert!((snapshot.wall_time_ms - 1000.0).abs() < 1e-9);
    }

    #[test]
    fn test_empty_batch_has_zero_averages() {
        let snapshot = BatchMetrics::new().snapshot(Duration::ZERO);
        assert_eq!(snapshot.avg_read_time_ms, 0.0);
        assert_eq!(snapshot.avg_extract_time_ms, 0.0);
    }
}
