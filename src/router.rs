use crate::config::{Stage1Rule, Stage2Rule};
use crate::message::Message;
use crate::queue::SpscQueue;
use crate::timing;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

// Both routers share the polling discipline: one pop per input queue per
// pass, in fixed cyclic order, and once a message has been extracted it is
// pushed until the push succeeds. A brief downstream stall at shutdown must
// never drop an in-flight message.

/// First-stage router: fans producer output into the processors.
///
/// Types with a rule round-robin across the rule's candidate list; counters
/// are per type so overlapping candidate sets do not interfere. Unruled
/// types fall back to `msg_type % processor_count`.
pub struct Stage1Router {
    routing_table: HashMap<u8, Vec<u8>>,
    rr_counters: HashMap<u8, AtomicUsize>,
    inputs: Vec<Arc<SpscQueue<Message>>>,
    outputs: Vec<Arc<SpscQueue<Message>>>,
}

impl Stage1Router {
    pub fn new(
        rules: &[Stage1Rule],
        inputs: Vec<Arc<SpscQueue<Message>>>,
        outputs: Vec<Arc<SpscQueue<Message>>>,
    ) -> Self {
        let mut routing_table = HashMap::new();
        let mut rr_counters = HashMap::new();
        for rule in rules {
            routing_table.insert(rule.msg_type, rule.processors.clone());
            rr_counters.insert(rule.msg_type, AtomicUsize::new(0));
        }
        Self {
            routing_table,
            rr_counters,
            inputs,
            outputs,
        }
    }

    /// Pick the destination processor for a message type.
    pub fn select_processor(&self, msg_type: u8) -> u8 {
        match self.routing_table.get(&msg_type) {
            Some(processors) if processors.len() == 1 => processors[0],
            Some(processors) if !processors.is_empty() => {
                let counter = self
                    .rr_counters
                    .get(&msg_type)
                    .map(|c| c.fetch_add(1, Ordering::Relaxed))
                    .unwrap_or(0);
                processors[counter % processors.len()]
            }
            _ => msg_type % self.outputs.len() as u8,
        }
    }

    /// Router loop. Exits once the stop flag is raised and a full pass over
    /// the inputs finds nothing.
    pub fn run(&mut self, stop: &AtomicBool) {
        loop {
            let mut processed_any = false;

            for input in &self.inputs {
                if let Some(mut msg) = input.try_pop() {
                    msg.stage1_entry_ns = timing::now_ns();
                    let processor_id = self.select_processor(msg.msg_type);
                    let output = &self.outputs[usize::from(processor_id)];

                    // Exit stamp is re-taken before every attempt so a stall
                    // in the push retry does not count as router latency of
                    // an earlier instant.
                    loop {
                        msg.stage1_exit_ns = timing::now_ns();
                        if output.try_push(msg).is_ok() {
                            break;
                        }
                        timing::pause();
                    }
                    processed_any = true;
                }
            }

            if !processed_any {
                if stop.load(Ordering::Relaxed) {
                    break;
                }
                timing::pause();
            }
        }
    }
}

/// Second-stage router: maps each message type to its terminal strategy.
///
/// `ordering_required` is carried in the rules but enforced only as the
/// report-time order check; nothing is re-sequenced here.
pub struct Stage2Router {
    routing_table: HashMap<u8, u8>,
    inputs: Vec<Arc<SpscQueue<Message>>>,
    outputs: Vec<Arc<SpscQueue<Message>>>,
}

impl Stage2Router {
    pub fn new(
        rules: &[Stage2Rule],
        inputs: Vec<Arc<SpscQueue<Message>>>,
        outputs: Vec<Arc<SpscQueue<Message>>>,
    ) -> Self {
        let routing_table = rules
            .iter()
            .map(|rule| (rule.msg_type, rule.strategy))
            .collect();
        Self {
            routing_table,
            inputs,
            outputs,
        }
    }

    /// Pick the destination strategy for a message type.
    pub fn select_strategy(&self, msg_type: u8) -> u8 {
        self.routing_table
            .get(&msg_type)
            .copied()
            .unwrap_or(msg_type % self.outputs.len() as u8)
    }

    /// Router loop; same polling and no-drop discipline as stage1.
    pub fn run(&mut self, stop: &AtomicBool) {
        loop {
            let mut processed_any = false;

            for input in &self.inputs {
                if let Some(mut msg) = input.try_pop() {
                    msg.stage2_entry_ns = timing::now_ns();
                    let strategy_id = self.select_strategy(msg.msg_type);
                    let output = &self.outputs[usize::from(strategy_id)];

                    loop {
                        msg.stage2_exit_ns = timing::now_ns();
                        if output.try_push(msg).is_ok() {
                            break;
                        }
                        timing::pause();
                    }
                    processed_any = true;
                }
            }

            if !processed_any {
                if stop.load(Ordering::Relaxed) {
                    break;
                }
                timing::pause();
            }
        }
    }
}
