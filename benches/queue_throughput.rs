use criterion::{black_box, criterion_group, criterion_main, Criterion};
use message_pipeline::{Message, SpscQueue};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

fn benchmark_push_pop_cycle(c: &mut Criterion) {
    let queue: SpscQueue<u64> = SpscQueue::new(1024);

    c.bench_function("spsc_push_pop_cycle", |b| {
        b.iter(|| {
            let _ = queue.try_push(black_box(42));
            black_box(queue.try_pop());
        });
    });
}

fn benchmark_message_push_pop_cycle(c: &mut Criterion) {
    let queue: SpscQueue<Message> = SpscQueue::new(1024);

    c.bench_function("spsc_message_push_pop_cycle", |b| {
        b.iter(|| {
            let _ = queue.try_push(black_box(Message::new(0, 0, 1)));
            black_box(queue.try_pop());
        });
    });
}

fn benchmark_cross_thread_transfer(c: &mut Criterion) {
    c.bench_function("spsc_cross_thread_100k", |b| {
        b.iter(|| {
            let queue: Arc<SpscQueue<u64>> = Arc::new(SpscQueue::new(65536));
            let done = Arc::new(AtomicBool::new(false));

            let consumer_queue = Arc::clone(&queue);
            let consumer_done = Arc::clone(&done);
            let consumer = thread::spawn(move || {
                let mut received = 0u64;
                loop {
                    if consumer_queue.try_pop().is_some() {
                        received += 1;
                    } else if consumer_done.load(Ordering::Acquire) && consumer_queue.is_empty() {
                        break;
                    } else {
                        std::hint::spin_loop();
                    }
                }
                received
            });

            for i in 0..100_000u64 {
                let mut value = i;
                while let Err(v) = queue.try_push(value) {
                    value = v;
                    std::hint::spin_loop();
                }
            }
            done.store(true, Ordering::Release);

            let received = consumer.join().expect("consumer panicked");
            assert_eq!(received, 100_000);
        });
    });
}

criterion_group!(
    name = benches;
    config = Criterion::default().measurement_time(Duration::from_secs(10));
    targets = benchmark_push_pop_cycle, benchmark_message_push_pop_cycle, benchmark_cross_thread_transfer
);
criterion_main!(benches);
