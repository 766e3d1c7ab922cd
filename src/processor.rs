use crate::config::ProcessorConfig;
use crate::message::Message;
use crate::queue::SpscQueue;
use crate::stats::SystemStatistics;
use crate::timing;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Service time applied to message types with no configured entry
pub const DEFAULT_PROCESSING_TIME_NS: u64 = 100;

/// Simulates per-type processing work between the two routers.
///
/// The service time is an active spin on the monotonic clock; sleeping has
/// resolution far above the nanosecond figures modeled here.
pub struct Processor {
    id: u8,
    processing_times_ns: HashMap<u8, u64>,
    input: Arc<SpscQueue<Message>>,
    output: Arc<SpscQueue<Message>>,
    stats: Arc<SystemStatistics>,
}

impl Processor {
    pub fn new(
        id: u8,
        config: &ProcessorConfig,
        input: Arc<SpscQueue<Message>>,
        output: Arc<SpscQueue<Message>>,
        stats: Arc<SystemStatistics>,
    ) -> Self {
        Self {
            id,
            processing_times_ns: config.processing_times_ns.clone(),
            input,
            output,
            stats,
        }
    }

    fn processing_time(&self, msg_type: u8) -> u64 {
        self.processing_times_ns
            .get(&msg_type)
            .copied()
            .unwrap_or(DEFAULT_PROCESSING_TIME_NS)
    }

    /// Worker loop. Exits once the stop flag is raised and the input queue is
    /// empty; an extracted message is always forwarded, retrying the push
    /// past shutdown if needed.
    pub fn run(&mut self, stop: &AtomicBool) {
        loop {
            match self.input.try_pop() {
                Some(mut msg) => {
                    msg.processing_entry_ns = timing::now_ns();
                    msg.processor_id = self.id;

                    timing::spin_for_ns(self.processing_time(msg.msg_type));

                    msg.processing_exit_ns = timing::now_ns();
                    msg.processing_ts_ns = msg.processing_exit_ns;

                    loop {
                        if self.output.try_push(msg).is_ok() {
                            self.stats.record_processed();
                            break;
                        }
                        timing::pause();
                    }
                }
                None => {
                    if stop.load(Ordering::Relaxed) {
                        break;
                    }
                    timing::pause();
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn processor_pair(
        times: &[(u8, u64)],
    ) -> (Processor, Arc<SpscQueue<Message>>, Arc<SpscQueue<Message>>, Arc<SystemStatistics>) {
        let input = Arc::new(SpscQueue::new(256));
        let output = Arc::new(SpscQueue::new(256));
        let stats = Arc::new(SystemStatistics::new(1, 1, 1));
        let config = ProcessorConfig {
            count: 1,
            processing_times_ns: times.iter().copied().collect(),
        };
        let processor = Processor::new(
            3,
            &config,
            Arc::clone(&input),
            Arc::clone(&output),
            Arc::clone(&stats),
        );
        (processor, input, output, stats)
    }

    #[test]
    fn default_time_applies_to_unlisted_types() {
        let (processor, ..) = processor_pair(&[(0, 500)]);
        assert_eq!(processor.processing_time(0), 500);
        assert_eq!(processor.processing_time(5), DEFAULT_PROCESSING_TIME_NS);
    }

    #[test]
    fn stamps_and_forwards_then_drains_on_stop() {
        let (mut processor, input, output, stats) = processor_pair(&[(0, 100)]);

        for seq in 0..10 {
            input.try_push(Message::new(0, 0, seq)).unwrap();
        }

        // Stop is raised up front: the worker must still drain all ten.
        let stop = AtomicBool::new(true);
        processor.run(&stop);

        let mut seen = 0;
        while let Some(msg) = output.try_pop() {
            assert_eq!(msg.processor_id, 3);
            assert!(msg.processing_entry_ns > 0);
            assert!(msg.processing_exit_ns >= msg.processing_entry_ns);
            assert_eq!(msg.processing_ts_ns, msg.processing_exit_ns);
            seen += 1;
        }
        assert_eq!(seen, 10);
        assert_eq!(stats.total_processed(), 10);
        assert!(input.is_empty());
    }
}
