//! A bounded-latency staged message pipeline over lock-free SPSC ring buffers.
//!
//! Messages flow through four stages connected by bounded single-producer /
//! single-consumer queues: producers emit typed messages at a configured
//! rate, a first-stage router load-balances them across processors, each
//! processor imposes a per-type service time, and a second-stage router
//! fans the results out to terminal strategies that validate ordering and
//! record end-to-end latency at microsecond granularity.
//!
//! # Features
//!
//! - Hand-rolled SPSC ring buffer with cache-padded indices and an
//!   acquire/release publication protocol
//! - Type-keyed routing with per-type round-robin load balancing
//! - Per-stage timestamping and latency percentiles (p50..p99.9, max)
//! - No message loss after extraction: pushes are retried past shutdown
//! - Graceful staged drain so `produced == delivered` holds on every run
//!
//! # Example
//!
//! ```ignore
//! use message_pipeline::{Pipeline, SystemConfig};
//! use std::sync::atomic::AtomicBool;
//! use std::sync::Arc;
//!
//! let config = SystemConfig::load_from_file("scenario.json")?;
//! let pipeline = Pipeline::new(config)?;
//! let summary = pipeline.run(Arc::new(AtomicBool::new(true)))?;
//! assert!(summary.passed);
//! ```

pub mod config;
pub mod error;
pub mod message;
pub mod pipeline;
pub mod processor;
pub mod producer;
pub mod queue;
pub mod router;
pub mod stats;
pub mod strategy;
pub mod timing;

// Re-exports for convenience
pub use config::{ProducerConfig, ProcessorConfig, Stage1Rule, Stage2Rule, StrategyConfig, SystemConfig};
pub use error::{PipelineError, Result};
pub use message::Message;
pub use pipeline::{Pipeline, RunSummary, QUEUE_CAPACITY};
pub use queue::SpscQueue;
pub use stats::{LatencyReport, OrderTracker, PhasePercentiles, SystemStatistics};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
