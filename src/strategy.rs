use crate::config::StrategyConfig;
use crate::message::Message;
use crate::queue::SpscQueue;
use crate::stats::SystemStatistics;
use crate::timing;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Service time applied when a strategy has no configured entry
pub const DEFAULT_STRATEGY_TIME_NS: u64 = 100;

/// Terminal consumer: simulates its service time, then validates ordering
/// and records latency. Strategies have no output queue.
pub struct Strategy {
    id: u8,
    processing_time_ns: u64,
    input: Arc<SpscQueue<Message>>,
    stats: Arc<SystemStatistics>,
}

impl Strategy {
    pub fn new(
        id: u8,
        config: &StrategyConfig,
        input: Arc<SpscQueue<Message>>,
        stats: Arc<SystemStatistics>,
    ) -> Self {
        let processing_time_ns = config
            .processing_times_ns
            .get(&id)
            .copied()
            .unwrap_or(DEFAULT_STRATEGY_TIME_NS);
        Self {
            id,
            processing_time_ns,
            input,
            stats,
        }
    }

    pub fn id(&self) -> u8 {
        self.id
    }

    // Statistics updates happen in a fixed order: order first, latency
    // second, the delivered counter last.
    fn process(&self, msg: &Message) {
        timing::spin_for_ns(self.processing_time_ns);

        self.stats.track_message_order(msg);
        self.stats.record_message_latencies(msg);
        self.stats.record_delivered();
    }

    /// Consumer loop; exits once the stop flag is raised and the input queue
    /// is empty.
    pub fn run(&mut self, stop: &AtomicBool) {
        loop {
            match self.input.try_pop() {
                Some(msg) => self.process(&msg),
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
