use crate::timing;

/// Number of distinct message types the routing key can take
pub const MAX_MSG_TYPES: usize = 8;

/// A message flowing through the pipeline.
///
/// Fixed-size and `Copy` so ring-buffer slots can be written as plain values
/// with no per-element ownership transfer. Every stage stamps its entry and
/// exit times into the message itself; latency is derived at delivery.
#[derive(Debug, Clone, Copy, Default)]
pub struct Message {
    /// Routing key, range 0..7
    pub msg_type: u8,
    /// Origin producer index
    pub producer_id: u8,
    /// Monotonic per producer, never reset
    pub sequence_number: u64,
    /// Creation time, monotonic nanoseconds
    pub timestamp_ns: u64,

    /// Set by the assigned processor
    pub processor_id: u8,
    /// Set at processor exit
    pub processing_ts_ns: u64,

    pub stage1_entry_ns: u64,
    pub stage1_exit_ns: u64,
    pub processing_entry_ns: u64,
    pub processing_exit_ns: u64,
    pub stage2_entry_ns: u64,
    pub stage2_exit_ns: u64,
}

impl Message {
    /// Create a message stamped with the current time.
    #[inline]
    pub fn new(msg_type: u8, producer_id: u8, sequence_number: u64) -> Self {
        Self {
            msg_type,
            producer_id,
            sequence_number,
            timestamp_ns: timing::now_ns(),
            ..Self::default()
        }
    }

    /// Wall-clock interval from creation to final stage2 exit, microseconds.
    ///
    /// Clock irregularities (a later stamp below an earlier one) clamp to
    /// zero rather than error; the same holds for the per-phase accessors.
    #[inline]
    pub fn end_to_end_latency_us(&self) -> f64 {
        self.stage2_exit_ns.saturating_sub(self.timestamp_ns) as f64 / 1_000.0
    }

    #[inline]
    pub fn stage1_latency_us(&self) -> f64 {
        self.stage1_exit_ns.saturating_sub(self.stage1_entry_ns) as f64 / 1_000.0
    }

    #[inline]
    pub fn processing_latency_us(&self) -> f64 {
        self.processing_exit_ns.saturating_sub(self.processing_entry_ns) as f64 / 1_000.0
    }

    #[inline]
    pub fn stage2_latency_us(&self) -> f64 {
        self.stage2_exit_ns.saturating_sub(self.stage2_entry_ns) as f64 / 1_000.0
    }
}
