use crate::config::ProducerConfig;
use crate::error::{PipelineError, Result};
use crate::message::Message;
use crate::queue::SpscQueue;
use crate::stats::SystemStatistics;
use crate::timing;
use rand::distributions::{Distribution, WeightedIndex};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Generates messages at a target rate with types drawn from a weighted
/// distribution. Sequence numbers are 0,1,2,… per producer and never reset.
pub struct Producer {
    id: u8,
    messages_per_sec: u64,
    msg_types: Vec<u8>,
    type_distribution: WeightedIndex<f64>,
    output: Arc<SpscQueue<Message>>,
    stats: Arc<SystemStatistics>,
    sequence_number: u64,
}

impl Producer {
    pub fn new(
        id: u8,
        config: &ProducerConfig,
        output: Arc<SpscQueue<Message>>,
        stats: Arc<SystemStatistics>,
    ) -> Result<Self> {
        // Sort for a deterministic type order regardless of map iteration.
        let mut entries: Vec<(u8, f64)> = config
            .distribution
            .iter()
            .map(|(&msg_type, &prob)| (msg_type, prob))
            .collect();
        entries.sort_unstable_by_key(|&(msg_type, _)| msg_type);

        let msg_types: Vec<u8> = entries.iter().map(|&(t, _)| t).collect();
        let weights: Vec<f64> = entries.iter().map(|&(_, w)| w).collect();
        let type_distribution = WeightedIndex::new(&weights)
            .map_err(|e| PipelineError::Config(format!("invalid type distribution: {e}")))?;

        Ok(Self {
            id,
            messages_per_sec: config.messages_per_sec,
            msg_types,
            type_distribution,
            output,
            stats,
            sequence_number: 0,
        })
    }

    /// Emission loop. Paces with a deterministic interval: the next deadline
    /// advances by `1e9 / rate` per send and is clamped up to the current
    /// time when the pacer falls behind (no burst catch-up). Exits when the
    /// run flag clears or the wall-elapsed time reaches `duration`.
    pub fn run(&mut self, running: &AtomicBool, duration: Duration) {
        let interval_ns = 1_000_000_000 / self.messages_per_sec;
        let start = Instant::now();
        let mut next_send_ns = 0u64;
        let mut rng = rand::thread_rng();

        while running.load(Ordering::Relaxed) {
            if start.elapsed() >= duration {
                break;
            }

            let now_ns = start.elapsed().as_nanos() as u64;
            if now_ns < next_send_ns {
                timing::pause();
                continue;
            }

            let index = self.type_distribution.sample(&mut rng);
            let msg = Message::new(self.msg_types[index], self.id, self.sequence_number);
            self.sequence_number += 1;

            // Queue-full is backpressure, not an error: keep trying while the
            // system is running. The counter moves only on a successful push.
            while running.load(Ordering::Relaxed) {
                if self.output.try_push(msg).is_ok() {
                    self.stats.record_produced();
                    break;
                }
                timing::pause();
            }

            next_send_ns += interval_ns;
            if next_send_ns < now_ns {
                next_send_ns = now_ns;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(rate: u64, distribution: &[(u8, f64)]) -> ProducerConfig {
        ProducerConfig {
            count: 1,
            messages_per_sec: rate,
            distribution: distribution.iter().copied().collect::<HashMap<_, _>>(),
        }
    }

    #[test]
    fn emits_sequences_in_order() {
        let queue = Arc::new(SpscQueue::new(4096));
        let stats = Arc::new(SystemStatistics::new(1, 1, 1));
        let mut producer = Producer::new(
            0,
            &config(20_000, &[(0, 1.0)]),
            Arc::clone(&queue),
            Arc::clone(&stats),
        )
        .unwrap();

        let running = AtomicBool::new(true);
        producer.run(&running, Duration::from_millis(100));

        let mut count = 0u64;
        let mut expected = 0u64;
        while let Some(msg) = queue.try_pop() {
            assert_eq!(msg.sequence_number, expected);
            assert_eq!(msg.msg_type, 0);
            assert_eq!(msg.producer_id, 0);
            assert!(msg.timestamp_ns > 0);
            expected += 1;
            count += 1;
        }
        assert_eq!(count, stats.total_produced());
        assert!(count > 0);
    }

    #[test]
    fn rate_is_approximately_honored() {
        let queue = Arc::new(SpscQueue::new(8192));
        let stats = Arc::new(SystemStatistics::new(1, 1, 1));
        let mut producer = Producer::new(
            0,
            &config(10_000, &[(0, 0.5), (1, 0.5)]),
            Arc::clone(&queue),
            Arc::clone(&stats),
        )
        .unwrap();

        let running = AtomicBool::new(true);
        producer.run(&running, Duration::from_millis(200));

        // 10k/s for 200ms is ~2000 messages; generous slack for scheduling.
        let produced = stats.total_produced();
        assert!(produced >= 500, "produced only {produced}");
        assert!(produced <= 2_200, "produced {produced}, pacer ran hot");
    }

    #[test]
    fn cleared_flag_stops_emission() {
        let queue = Arc::new(SpscQueue::new(64));
        let stats = Arc::new(SystemStatistics::new(1, 1, 1));
        let mut producer = Producer::new(
            0,
            &config(1_000, &[(0, 1.0)]),
            Arc::clone(&queue),
            Arc::clone(&stats),
        )
        .unwrap();

        let running = AtomicBool::new(false);
        producer.run(&running, Duration::from_secs(10));
        assert_eq!(stats.total_produced(), 0);
    }

    #[test]
    fn rejects_empty_distribution() {
        let queue = Arc::new(SpscQueue::new(64));
        let stats = Arc::new(SystemStatistics::new(1, 1, 1));
        assert!(Producer::new(0, &config(1_000, &[]), queue, stats).is_err());
    }
}
