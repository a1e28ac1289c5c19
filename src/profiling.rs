//! Self-profiling for the transformer
//!
//! Tracks how many classes went through the coordinator and how long each
//! pipeline stage took. Every counter is atomic so one `TransformStats` can
//! be shared by all class-loading threads.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use serde::Serialize;

/// Pipeline stages that can be profiled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProfilingCategory {
    /// Parsing class bytes into the structural model
    Decode,
    /// Rewriting behavior bodies
    Inject,
    /// Serializing the model back to bytes
    Encode,
}

/// Outcome counters and stage timings for a run
#[derive(Debug)]
pub struct TransformStats {
    processed: AtomicU64,
    transformed: AtomicU64,
    unchanged: AtomicU64,
    failed: AtomicU64,
    behaviors: AtomicU64,
    decode_nanos: AtomicU64,
    inject_nanos: AtomicU64,
    encode_nanos: AtomicU64,
    start_time: Instant,
}

impl Default for TransformStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time copy of [`TransformStats`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub processed: u64,
    pub transformed: u64,
    pub unchanged: u64,
    pub failed: u64,
    pub behaviors_instrumented: u64,
    pub decode_us: u64,
    pub inject_us: u64,
    pub encode_us: u64,
}

impl TransformStats {
    pub fn new() -> Self {
        Self {
            processed: AtomicU64::new(0),
            transformed: AtomicU64::new(0),
            unchanged: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            behaviors: AtomicU64::new(0),
            decode_nanos: AtomicU64::new(0),
            inject_nanos: AtomicU64::new(0),
            encode_nanos: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    /// Measure the time taken by a stage
    ///
    /// # Example
    /// ```
    /// use perfmon::profiling::{ProfilingCategory, TransformStats};
    ///
    /// let stats = TransformStats::new();
    /// let result = stats.measure(ProfilingCategory::Decode, || 40 + 2);
    /// assert_eq!(result, 42);
    /// ```
    pub fn measure<F, R>(&self, category: ProfilingCategory, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        let start = Instant::now();
        let result = f();
        self.record_time(category, start.elapsed());
        result
    }

    pub fn record_time(&self, category: ProfilingCategory, duration: Duration) {
        let nanos = u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX);
        self.counter(category).fetch_add(nanos, Ordering::Relaxed);
    }

    pub fn time_in_category(&self, category: ProfilingCategory) -> Duration {
        Duration::from_nanos(self.counter(category).load(Ordering::Relaxed))
    }

    fn counter(&self, category: ProfilingCategory) -> &AtomicU64 {
        match category {
            ProfilingCategory::Decode => &self.decode_nanos,
            ProfilingCategory::Inject => &self.inject_nanos,
            ProfilingCategory::Encode => &self.encode_nanos,
        }
    }

    pub fn record_processed(&self) {
        self.processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_transformed(&self, behaviors: usize) {
        self.transformed.fetch_add(1, Ordering::Relaxed);
        self.behaviors.fetch_add(behaviors as u64, Ordering::Relaxed);
    }

    pub fn record_unchanged(&self) {
        self.unchanged.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn wall_time(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Total time spent inside the pipeline stages
    pub fn user_time(&self) -> Duration {
        self.time_in_category(ProfilingCategory::Decode)
            + self.time_in_category(ProfilingCategory::Inject)
            + self.time_in_category(ProfilingCategory::Encode)
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let micros = |c| self.time_in_category(c).as_micros() as u64;
        StatsSnapshot {
            processed: self.processed.load(Ordering::Relaxed),
            transformed: self.transformed.load(Ordering::Relaxed),
            unchanged: self.unchanged.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            behaviors_instrumented: self.behaviors.load(Ordering::Relaxed),
            decode_us: micros(ProfilingCategory::Decode),
            inject_us: micros(ProfilingCategory::Inject),
            encode_us: micros(ProfilingCategory::Encode),
        }
    }

    /// Print profiling summary to stderr
    pub fn print_summary(&self) {
        let snap = self.snapshot();
        let wall = self.wall_time();
        let user = self.user_time();

        eprintln!("\n╔════════════════════════════════════════════════════════════╗");
        eprintln!("║  Perfmon Self-Profiling Results                            ║");
        eprintln!("╚════════════════════════════════════════════════════════════╝");
        eprintln!();
        eprintln!("Classes processed:         {}", snap.processed);
        eprintln!("  - Transformed:           {}", snap.transformed);
        eprintln!("  - Unchanged:             {}", snap.unchanged);
        eprintln!("  - Failed:                {}", snap.failed);
        eprintln!("Behaviors instrumented:    {}", snap.behaviors_instrumented);
        eprintln!("Total wall time:           {:.3}s", wall.as_secs_f64());
        eprintln!();
        eprintln!("Pipeline breakdown:");
        self.print_category("Decode", ProfilingCategory::Decode, user);
        self.print_category("Inject", ProfilingCategory::Inject, user);
        self.print_category("Encode", ProfilingCategory::Encode, user);
        eprintln!();
    }

    fn print_category(&self, name: &str, category: ProfilingCategory, total: Duration) {
        let time = self.time_in_category(category);
        if time > Duration::ZERO {
            eprintln!(
                "  - {:20} {:.3}s ({:.1}%)",
                format!("{}:", name),
                time.as_secs_f64(),
                time.as_secs_f64() / total.as_secs_f64() * 100.0
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_stats_new() {
        let stats = TransformStats::new();
        let snap = stats.snapshot();
        assert_eq!(snap.processed, 0);
        assert_eq!(snap.failed, 0);
        assert_eq!(stats.user_time(), Duration::ZERO);
    }

    #[test]
    fn test_record_time() {
        let stats = TransformStats::new();
        let duration = Duration::from_millis(100);

        stats.record_time(ProfilingCategory::Inject, duration);
        assert_eq!(stats.time_in_category(ProfilingCategory::Inject), duration);
        assert_eq!(stats.time_in_category(ProfilingCategory::Decode), Duration::ZERO);

        stats.record_time(ProfilingCategory::Inject, duration);
        assert_eq!(
            stats.time_in_category(ProfilingCategory::Inject),
            Duration::from_millis(200)
        );
    }

    #[test]
    fn test_measure() {
        let stats = TransformStats::new();
        let result = stats.measure(ProfilingCategory::Encode, || {
            thread::sleep(Duration::from_millis(10));
            42
        });
        assert_eq!(result, 42);
        assert!(stats.time_in_category(ProfilingCategory::Encode) >= Duration::from_millis(10));
    }

    #[test]
    fn test_user_time_sums_categories() {
        let stats = TransformStats::new();
        stats.record_time(ProfilingCategory::Decode, Duration::from_millis(10));
        stats.record_time(ProfilingCategory::Inject, Duration::from_millis(20));
        stats.record_time(ProfilingCategory::Encode, Duration::from_millis(30));
        assert_eq!(stats.user_time(), Duration::from_millis(60));
    }

    #[test]
    fn test_counters_from_many_threads() {
        let stats = Arc::new(TransformStats::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let stats = Arc::clone(&stats);
                thread::spawn(move || {
                    for _ in 0..50 {
                        stats.record_processed();
                        stats.record_transformed(2);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        let snap = stats.snapshot();
        assert_eq!(snap.processed, 200);
        assert_eq!(snap.transformed, 200);
        assert_eq!(snap.behaviors_instrumented, 400);
    }

    #[test]
    fn test_print_summary_does_not_panic() {
        let stats = TransformStats::new();
        stats.print_summary();
        stats.record_time(ProfilingCategory::Decode, Duration::from_millis(1));
        stats.print_summary();
    }
}
