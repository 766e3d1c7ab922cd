use crate::message::Message;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// Percentile summary for one latency phase, microseconds.
#[derive(Debug, Clone, Copy, Default)]
pub struct PhasePercentiles {
    pub p50: f64,
    pub p90: f64,
    pub p99: f64,
    pub p999: f64,
    pub max: f64,
}

impl PhasePercentiles {
    fn from_samples(mut samples: Vec<f64>) -> Self {
        if samples.is_empty() {
            return Self::default();
        }
        samples.sort_unstable_by(f64::total_cmp);
        let at = |p: f64| {
            let index = ((p * samples.len() as f64) as usize).min(samples.len() - 1);
            samples[index]
        };
        Self {
            p50: at(0.50),
            p90: at(0.90),
            p99: at(0.99),
            p999: at(0.999),
            max: samples[samples.len() - 1],
        }
    }
}

/// Percentile read-out for all four phases; computed by the supervisor after
/// the workers have joined.
#[derive(Debug, Clone, Copy, Default)]
pub struct LatencyReport {
    pub stage1: PhasePercentiles,
    pub processing: PhasePercentiles,
    pub stage2: PhasePercentiles,
    pub end_to_end: PhasePercentiles,
}

/// Sequence tracking for one producer.
///
/// Strategies deliver concurrently for the same producer (different types end
/// at different strategies), so the last-seen map is behind a mutex while the
/// counters stay lock-free.
#[derive(Debug, Default)]
pub struct OrderTracker {
    last_sequence: Mutex<HashMap<u8, u64>>,
    messages_received: AtomicU64,
    order_violations: AtomicU64,
}

impl OrderTracker {
    /// Compare against the last sequence seen for this message type.
    ///
    /// A sequence number at or below the previous one counts as a violation;
    /// the stored value is always updated.
    pub fn track(&self, msg: &Message) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);

        let mut last = self.last_sequence.lock();
        if let Some(&previous) = last.get(&msg.msg_type) {
            if msg.sequence_number <= previous {
                self.order_violations.fetch_add(1, Ordering::Relaxed);
            }
        }
        last.insert(msg.msg_type, msg.sequence_number);
    }

    pub fn messages_received(&self) -> u64 {
        self.messages_received.load(Ordering::Relaxed)
    }

    pub fn order_violations(&self) -> u64 {
        self.order_violations.load(Ordering::Relaxed)
    }

    pub fn is_ordered(&self) -> bool {
        self.order_violations() == 0
    }
}

#[derive(Debug, Default)]
struct LatencySamples {
    stage1: Vec<f64>,
    processing: Vec<f64>,
    stage2: Vec<f64>,
    end_to_end: Vec<f64>,
}

/// Global statistics aggregate, shared read-only by every worker.
///
/// Counters are relaxed atomics; the latency sample vectors sit behind a
/// single mutex taken briefly per delivery; queue-depth gauges are written by
/// the supervisor once per second.
#[derive(Debug)]
pub struct SystemStatistics {
    messages_produced: AtomicU64,
    messages_processed: AtomicU64,
    messages_delivered: AtomicU64,
    messages_lost: AtomicU64,

    stage1_queue_depths: Vec<AtomicUsize>,
    stage2_queue_depths: Vec<AtomicUsize>,

    latency_samples: Mutex<LatencySamples>,
    order_trackers: Vec<OrderTracker>,
}

impl SystemStatistics {
    pub fn new(num_producers: usize, num_processors: usize, num_strategies: usize) -> Self {
        Self {
            messages_produced: AtomicU64::new(0),
            messages_processed: AtomicU64::new(0),
            messages_delivered: AtomicU64::new(0),
            messages_lost: AtomicU64::new(0),
            stage1_queue_depths: (0..num_processors).map(|_| AtomicUsize::new(0)).collect(),
            stage2_queue_depths: (0..num_strategies).map(|_| AtomicUsize::new(0)).collect(),
            latency_samples: Mutex::new(LatencySamples::default()),
            order_trackers: (0..num_producers).map(|_| OrderTracker::default()).collect(),
        }
    }

    #[inline]
    pub fn record_produced(&self) {
        self.messages_produced.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_processed(&self) {
        self.messages_processed.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_delivered(&self) {
        self.messages_delivered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn total_produced(&self) -> u64 {
        self.messages_produced.load(Ordering::Relaxed)
    }

    pub fn total_processed(&self) -> u64 {
        self.messages_processed.load(Ordering::Relaxed)
    }

    pub fn total_delivered(&self) -> u64 {
        self.messages_delivered.load(Ordering::Relaxed)
    }

    pub fn total_lost(&self) -> u64 {
        self.messages_lost.load(Ordering::Relaxed)
    }

    /// Append the four per-phase samples of a delivered message.
    pub fn record_message_latencies(&self, msg: &Message) {
        let mut samples = self.latency_samples.lock();
        samples.stage1.push(msg.stage1_latency_us());
        samples.processing.push(msg.processing_latency_us());
        samples.stage2.push(msg.stage2_latency_us());
        samples.end_to_end.push(msg.end_to_end_latency_us());
    }

    /// Track delivery order for the message's producer.
    pub fn track_message_order(&self, msg: &Message) {
        if let Some(tracker) = self.order_trackers.get(usize::from(msg.producer_id)) {
            tracker.track(msg);
        }
    }

    pub fn order_trackers(&self) -> &[OrderTracker] {
        &self.order_trackers
    }

    pub fn total_order_violations(&self) -> u64 {
        self.order_trackers.iter().map(|t| t.order_violations()).sum()
    }

    /// Supervisor-only: refresh a stage1 (processor input) depth gauge.
    pub fn set_stage1_queue_depth(&self, index: usize, depth: usize) {
        if let Some(gauge) = self.stage1_queue_depths.get(index) {
            gauge.store(depth, Ordering::Relaxed);
        }
    }

    /// Supervisor-only: refresh a stage2 (strategy input) depth gauge.
    pub fn set_stage2_queue_depth(&self, index: usize, depth: usize) {
        if let Some(gauge) = self.stage2_queue_depths.get(index) {
            gauge.store(depth, Ordering::Relaxed);
        }
    }

    /// Compute the full percentile read-out. Sorts each sample vector
    /// locally; intended for the supervisor after all workers joined.
    pub fn latency_report(&self) -> LatencyReport {
        let samples = self.latency_samples.lock();
        LatencyReport {
            stage1: PhasePercentiles::from_samples(samples.stage1.clone()),
            processing: PhasePercentiles::from_samples(samples.processing.clone()),
            stage2: PhasePercentiles::from_samples(samples.stage2.clone()),
            end_to_end: PhasePercentiles::from_samples(samples.end_to_end.clone()),
        }
    }

    fn has_samples(&self) -> bool {
        !self.latency_samples.lock().end_to_end.is_empty()
    }

    // Median without the full sort, for the per-second tick.
    fn current_p50s(&self) -> [f64; 4] {
        let samples = self.latency_samples.lock();
        [
            median_of(&samples.stage1),
            median_of(&samples.processing),
            median_of(&samples.stage2),
            median_of(&samples.end_to_end),
        ]
    }

    /// `true` when nothing was lost and every producer's order held.
    pub fn validate(&self) -> bool {
        if self.total_produced() != self.total_delivered() {
            return false;
        }
        self.order_trackers.iter().all(|t| t.is_ordered())
    }

    /// One tick line: elapsed, totals, queue depths, p50 per phase.
    pub fn format_current_stats(&self, elapsed_secs: f64) -> String {
        let mut out = String::new();
        let _ = write!(
            out,
            "[{:.2}s] Produced: {:.2}M | Processed: {:.2}M | Delivered: {:.2}M | Lost: {}",
            elapsed_secs,
            self.total_produced() as f64 / 1e6,
            self.total_processed() as f64 / 1e6,
            self.total_delivered() as f64 / 1e6,
            self.total_lost(),
        );

        let _ = write!(out, "\n        Stage1 queues: [");
        for (i, gauge) in self.stage1_queue_depths.iter().enumerate() {
            if i > 0 {
                out.push_str(", ");
            }
            let _ = write!(out, "{}", gauge.load(Ordering::Relaxed));
        }
        let _ = write!(out, "] | Stage2 queues: [");
        for (i, gauge) in self.stage2_queue_depths.iter().enumerate() {
            if i > 0 {
                out.push_str(", ");
            }
            let _ = write!(out, "{}", gauge.load(Ordering::Relaxed));
        }
        out.push(']');

        if self.has_samples() {
            let [stage1, processing, stage2, total] = self.current_p50s();
            let _ = write!(
                out,
                "\n        Latency(us) - Stage1: {stage1:.2} | Processing: {processing:.2} \
                 | Stage2: {stage2:.2} | Total: {total:.2}"
            );
        }

        out
    }

    /// The final multi-line report with totals, throughput, percentile table,
    /// per-producer ordering and the pass/fail verdict.
    pub fn format_final_report(&self, scenario: &str, duration_secs: f64) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "=== FINAL REPORT ===");
        let _ = writeln!(out, "Scenario: {scenario}");
        let _ = writeln!(out, "Duration: {duration_secs:.2} seconds\n");

        let _ = writeln!(out, "Message statistics:");
        let _ = writeln!(out, "  Total produced:  {:>15}", format_count(self.total_produced()));
        let _ = writeln!(out, "  Total processed: {:>15}", format_count(self.total_processed()));
        let _ = writeln!(out, "  Total delivered: {:>15}", format_count(self.total_delivered()));
        let _ = writeln!(out, "  Lost:            {:>15}\n", format_count(self.total_lost()));

        let throughput = self.total_delivered() as f64 / duration_secs / 1e6;
        let _ = writeln!(out, "Throughput: {throughput:.2} million messages/sec\n");

        if self.has_samples() {
            let report = self.latency_report();
            let _ = writeln!(out, "Latency percentiles (microseconds):");
            let _ = writeln!(
                out,
                "  Phase          p50      p90      p99    p99.9      max"
            );
            for (name, phase) in [
                ("Stage1", report.stage1),
                ("Process", report.processing),
                ("Stage2", report.stage2),
                ("Total", report.end_to_end),
            ] {
                let _ = writeln!(
                    out,
                    "  {name:<10}{:>8.2}{:>9.2}{:>9.2}{:>9.2}{:>9.2}",
                    phase.p50, phase.p90, phase.p99, phase.p999, phase.max
                );
            }
            out.push('\n');
        }

        let _ = writeln!(out, "Message order check:");
        for (i, tracker) in self.order_trackers.iter().enumerate() {
            let received = format_count(tracker.messages_received());
            if tracker.is_ordered() {
                let _ = writeln!(out, "  Producer {i}: {received} messages - ORDER PRESERVED");
            } else {
                let _ = writeln!(
                    out,
                    "  Producer {i}: {received} messages - VIOLATIONS: {}",
                    tracker.order_violations()
                );
            }
        }

        let verdict = if self.validate() { "PASSED" } else { "FAILED" };
        let _ = write!(out, "\nResult: {verdict}");
        out
    }
}

fn median_of(samples: &[f64]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    let mut copy = samples.to_vec();
    let mid = copy.len() / 2;
    let (_, median, _) = copy.select_nth_unstable_by(mid, f64::total_cmp);
    *median
}

// 1234567 -> "1,234,567"
fn format_count(value: u64) -> String {
    let digits = value.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percentiles_are_monotonic() {
        let samples: Vec<f64> = (1..=1000).map(|i| i as f64).collect();
        let phase = PhasePercentiles::from_samples(samples);
        assert!(phase.p50 <= phase.p90);
        assert!(phase.p90 <= phase.p99);
        assert!(phase.p99 <= phase.p999);
        assert!(phase.p999 <= phase.max);
        assert_eq!(phase.max, 1000.0);
    }

    #[test]
    fn empty_samples_report_zero() {
        let phase = PhasePercentiles::from_samples(Vec::new());
        assert_eq!(phase.p50, 0.0);
        assert_eq!(phase.max, 0.0);
    }

    #[test]
    fn order_tracker_detects_regression() {
        let tracker = OrderTracker::default();
        for seq in [0u64, 1, 2] {
            tracker.track(&Message::new(0, 0, seq));
        }
        assert!(tracker.is_ordered());

        tracker.track(&Message::new(0, 0, 1));
        assert_eq!(tracker.order_violations(), 1);
        assert_eq!(tracker.messages_received(), 4);
    }

    #[test]
    fn order_tracker_keys_by_type() {
        let tracker = OrderTracker::default();
        tracker.track(&Message::new(0, 0, 5));
        // Lower sequence on a different type is not a violation.
        tracker.track(&Message::new(1, 0, 0));
        assert!(tracker.is_ordered());
    }

    #[test]
    fn equal_sequence_is_a_violation() {
        let tracker = OrderTracker::default();
        tracker.track(&Message::new(0, 0, 7));
        tracker.track(&Message::new(0, 0, 7));
        assert_eq!(tracker.order_violations(), 1);
    }

    #[test]
    fn validate_requires_no_loss_and_order() {
        let stats = SystemStatistics::new(1, 1, 1);
        assert!(stats.validate());

        stats.record_produced();
        assert!(!stats.validate(), "produced != delivered must fail");

        stats.record_delivered();
        assert!(stats.validate());

        stats.track_message_order(&Message::new(0, 0, 3));
        stats.track_message_order(&Message::new(0, 0, 2));
        assert!(!stats.validate(), "order violation must fail");
    }

    #[test]
    fn latency_recording_feeds_report() {
        let stats = SystemStatistics::new(1, 1, 1);
        let mut msg = Message::new(0, 0, 0);
        msg.timestamp_ns = 0;
        msg.stage2_exit_ns = 5_000;
        stats.record_message_latencies(&msg);

        let report = stats.latency_report();
        assert_eq!(report.end_to_end.max, 5.0);
    }

    #[test]
    fn count_formatting_groups_thousands() {
        assert_eq!(format_count(0), "0");
        assert_eq!(format_count(999), "999");
        assert_eq!(format_count(1_000), "1,000");
        assert_eq!(format_count(1_234_567), "1,234,567");
    }

    #[test]
    fn final_report_carries_verdict() {
        let stats = SystemStatistics::new(1, 1, 1);
        let report = stats.format_final_report("unit", 1.0);
        assert!(report.contains("Result: PASSED"));

        stats.record_produced();
        let report = stats.format_final_report("unit", 1.0);
        assert!(report.contains("Result: FAILED"));
    }
}
