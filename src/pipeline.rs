use crate::config::SystemConfig;
use crate::error::{PipelineError, Result};
use crate::message::Message;
use crate::processor::Processor;
use crate::producer::Producer;
use crate::queue::SpscQueue;
use crate::router::{Stage1Router, Stage2Router};
use crate::stats::SystemStatistics;
use crate::strategy::Strategy;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::info;

/// Capacity of every inter-stage queue. Power of two, sized generously
/// relative to expected occupancy.
pub const QUEUE_CAPACITY: usize = 65536;

/// Outcome of a completed run.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub scenario: String,
    pub duration_secs: f64,
    pub produced: u64,
    pub processed: u64,
    pub delivered: u64,
    pub lost: u64,
    pub order_violations: u64,
    pub passed: bool,
}

/// Builds the staged graph from a validated config and supervises a run.
///
/// All queues are allocated up front, before any worker starts, and live
/// until every worker has joined. Each queue is wired to exactly one writer
/// thread and one reader thread, which is what licenses the SPSC primitive.
pub struct Pipeline {
    config: SystemConfig,
    stats: Arc<SystemStatistics>,
    /// producer[i] -> stage1 router
    producer_queues: Vec<Arc<SpscQueue<Message>>>,
    /// stage1 router -> processor[j]
    processor_queues: Vec<Arc<SpscQueue<Message>>>,
    /// processor[j] -> stage2 router
    processor_out_queues: Vec<Arc<SpscQueue<Message>>>,
    /// stage2 router -> strategy[k]
    strategy_queues: Vec<Arc<SpscQueue<Message>>>,
}

impl Pipeline {
    pub fn new(config: SystemConfig) -> Result<Self> {
        config.validate()?;

        let stats = Arc::new(SystemStatistics::new(
            config.producers.count as usize,
            config.processors.count as usize,
            config.strategies.count as usize,
        ));

        let alloc = |n: u32| -> Vec<Arc<SpscQueue<Message>>> {
            (0..n).map(|_| Arc::new(SpscQueue::new(QUEUE_CAPACITY))).collect()
        };

        Ok(Self {
            producer_queues: alloc(config.producers.count),
            processor_queues: alloc(config.processors.count),
            processor_out_queues: alloc(config.processors.count),
            strategy_queues: alloc(config.strategies.count),
            stats,
            config,
        })
    }

    pub fn statistics(&self) -> Arc<SystemStatistics> {
        Arc::clone(&self.stats)
    }

    /// Run the pipeline to completion.
    ///
    /// Spawns one OS thread per component, ticks once per second until
    /// `duration_secs` elapse or `running` is cleared, then shuts down with
    /// the staged drain: producers stop first; each downstream stage's stop
    /// flag is raised only after everything upstream of it has joined, so a
    /// stage observing "stopped and empty" can trust the emptiness. Combined
    /// with the routers' no-drop push retry this guarantees that every
    /// produced message reaches a strategy.
    pub fn run(self, running: Arc<AtomicBool>) -> Result<RunSummary> {
        let duration = Duration::from_secs(u64::from(self.config.duration_secs));

        info!(
            producers = self.config.producers.count,
            processors = self.config.processors.count,
            strategies = self.config.strategies.count,
            duration_secs = self.config.duration_secs,
            "starting pipeline"
        );

        // Construct every component before the first spawn so a bad config
        // cannot leave a half-started graph behind.
        let mut producers = Vec::with_capacity(self.producer_queues.len());
        for (i, queue) in self.producer_queues.iter().enumerate() {
            producers.push(Producer::new(
                i as u8,
                &self.config.producers,
                Arc::clone(queue),
                Arc::clone(&self.stats),
            )?);
        }

        let mut stage1_router = Stage1Router::new(
            &self.config.stage1_rules,
            self.producer_queues.clone(),
            self.processor_queues.clone(),
        );

        let mut processors = Vec::with_capacity(self.processor_queues.len());
        for (i, (input, output)) in self
            .processor_queues
            .iter()
            .zip(&self.processor_out_queues)
            .enumerate()
        {
            processors.push(Processor::new(
                i as u8,
                &self.config.processors,
                Arc::clone(input),
                Arc::clone(output),
                Arc::clone(&self.stats),
            ));
        }

        let mut stage2_router = Stage2Router::new(
            &self.config.stage2_rules,
            self.processor_out_queues.clone(),
            self.strategy_queues.clone(),
        );

        let mut strategies = Vec::with_capacity(self.strategy_queues.len());
        for (i, input) in self.strategy_queues.iter().enumerate() {
            strategies.push(Strategy::new(
                i as u8,
                &self.config.strategies,
                Arc::clone(input),
                Arc::clone(&self.stats),
            ));
        }

        let stage1_stop = Arc::new(AtomicBool::new(false));
        let processor_stop = Arc::new(AtomicBool::new(false));
        let stage2_stop = Arc::new(AtomicBool::new(false));
        let strategy_stop = Arc::new(AtomicBool::new(false));

        // Spawn in topological order: P producers, stage1 router, N
        // processors, stage2 router, K strategies.
        let mut producer_handles = Vec::with_capacity(producers.len());
        for (i, mut producer) in producers.into_iter().enumerate() {
            let running = Arc::clone(&running);
            producer_handles.push(spawn_worker(format!("producer-{i}"), move || {
                producer.run(&running, duration);
            })?);
        }

        let stage1_handle = {
            let stop = Arc::clone(&stage1_stop);
            spawn_worker("stage1-router".into(), move || stage1_router.run(&stop))?
        };

        let mut processor_handles = Vec::with_capacity(processors.len());
        for (i, mut processor) in processors.into_iter().enumerate() {
            let stop = Arc::clone(&processor_stop);
            processor_handles.push(spawn_worker(format!("processor-{i}"), move || {
                processor.run(&stop);
            })?);
        }

        let stage2_handle = {
            let stop = Arc::clone(&stage2_stop);
            spawn_worker("stage2-router".into(), move || stage2_router.run(&stop))?
        };

        let mut strategy_handles = Vec::with_capacity(strategies.len());
        for (i, mut strategy) in strategies.into_iter().enumerate() {
            let stop = Arc::clone(&strategy_stop);
            strategy_handles.push(spawn_worker(format!("strategy-{i}"), move || {
                strategy.run(&stop);
            })?);
        }

        // Monitor: refresh gauges and print one tick line per second until
        // the duration elapses or a cooperative shutdown is raised.
        let start = Instant::now();
        let mut last_tick_secs = 0u64;
        while running.load(Ordering::Relaxed) && start.elapsed() < duration {
            thread::sleep(Duration::from_millis(50));
            let elapsed = start.elapsed();
            if elapsed.as_secs() > last_tick_secs {
                last_tick_secs = elapsed.as_secs();
                self.refresh_queue_gauges();
                println!("{}", self.stats.format_current_stats(elapsed.as_secs_f64()));
            }
        }

        info!("stopping pipeline");
        running.store(false, Ordering::Release);

        // Staged drain, joining in spawn order.
        join_workers(producer_handles)?;
        stage1_stop.store(true, Ordering::Release);
        join_workers(vec![stage1_handle])?;
        processor_stop.store(true, Ordering::Release);
        join_workers(processor_handles)?;
        stage2_stop.store(true, Ordering::Release);
        join_workers(vec![stage2_handle])?;
        strategy_stop.store(true, Ordering::Release);
        join_workers(strategy_handles)?;

        let final_duration = start.elapsed().as_secs_f64();
        self.refresh_queue_gauges();

        // Let the last samples settle before the read-out.
        thread::sleep(Duration::from_millis(500));

        println!(
            "\n{}",
            self.stats
                .format_final_report(&self.config.scenario, final_duration)
        );

        Ok(RunSummary {
            scenario: self.config.scenario.clone(),
            duration_secs: final_duration,
            produced: self.stats.total_produced(),
            processed: self.stats.total_processed(),
            delivered: self.stats.total_delivered(),
            lost: self.stats.total_lost(),
            order_violations: self.stats.total_order_violations(),
            passed: self.stats.validate(),
        })
    }

    fn refresh_queue_gauges(&self) {
        for (i, queue) in self.processor_queues.iter().enumerate() {
            self.stats.set_stage1_queue_depth(i, queue.len());
        }
        for (i, queue) in self.strategy_queues.iter().enumerate() {
            self.stats.set_stage2_queue_depth(i, queue.len());
        }
    }
}

fn spawn_worker<F>(name: String, body: F) -> Result<JoinHandle<()>>
where
    F: FnOnce() + Send + 'static,
{
    thread::Builder::new()
        .name(name.clone())
        .spawn(body)
        .map_err(|e| PipelineError::Thread(format!("failed to spawn {name}: {e}")))
}

fn join_workers(handles: Vec<JoinHandle<()>>) -> Result<()> {
    for handle in handles {
        let name = handle.thread().name().unwrap_or("worker").to_owned();
        handle
            .join()
            .map_err(|_| PipelineError::Thread(format!("{name} panicked")))?;
    }
    Ok(())
}
