use crossbeam::utils::CachePadded;
use std::cell::UnsafeCell;
use std::mem::MaybeUninit;
use std::sync::atomic::{AtomicUsize, Ordering};

/// A bounded lock-free single-producer single-consumer ring buffer.
///
/// Exactly one thread may call [`try_push`](Self::try_push) and exactly one
/// may call [`try_pop`](Self::try_pop) concurrently; the pipeline enforces
/// this by graph construction (every queue is wired to one writer thread and
/// one reader thread). Capacity must be a power of two and one slot is
/// sacrificed to disambiguate full from empty.
///
/// `head` and `tail` live on separate cache lines so the two endpoints never
/// false-share. The only synchronization is the acquire/release pair between
/// the slot write and the index advancement.
pub struct SpscQueue<T> {
    head: CachePadded<AtomicUsize>,
    tail: CachePadded<AtomicUsize>,
    slots: Box<[UnsafeCell<MaybeUninit<T>>]>,
    mask: usize,
}

unsafe impl<T: Send> Send for SpscQueue<T> {}
unsafe impl<T: Send> Sync for SpscQueue<T> {}

impl<T> SpscQueue<T> {
    /// Create a queue with the given power-of-two capacity.
    ///
    /// Usable occupancy is `capacity - 1`.
    pub fn new(capacity: usize) -> Self {
        assert!(
            capacity.is_power_of_two() && capacity > 1,
            "capacity must be a power of two > 1"
        );
        let slots = (0..capacity)
            .map(|_| UnsafeCell::new(MaybeUninit::uninit()))
            .collect();
        Self {
            head: CachePadded::new(AtomicUsize::new(0)),
            tail: CachePadded::new(AtomicUsize::new(0)),
            slots,
            mask: capacity - 1,
        }
    }

    /// Attempt to push a value. Returns it back if the queue is full.
    ///
    /// Producer side of the ordering contract: own index relaxed (exclusive
    /// writer), opposite index acquire (pairs with the consumer's release),
    /// own index release after the slot write publishes both.
    #[inline]
    pub fn try_push(&self, value: T) -> Result<(), T> {
        let tail = self.tail.load(Ordering::Relaxed);
        let next = (tail + 1) & self.mask;

        if next == self.head.load(Ordering::Acquire) {
            return Err(value);
        }

        unsafe {
            (*self.slots[tail].get()).write(value);
        }
        self.tail.store(next, Ordering::Release);
        Ok(())
    }

    /// Attempt to pop a value. Returns `None` if the queue is empty.
    #[inline]
    pub fn try_pop(&self) -> Option<T> {
        let head = self.head.load(Ordering::Relaxed);

        if head == self.tail.load(Ordering::Acquire) {
            return None;
        }

        let value = unsafe { (*self.slots[head].get()).assume_init_read() };
        self.head.store((head + 1) & self.mask, Ordering::Release);
        Some(value)
    }

    /// Approximate occupancy; a snapshot that may be stale under concurrency.
    #[inline]
    pub fn len(&self) -> usize {
        let head = self.head.load(Ordering::Acquire);
        let tail = self.tail.load(Ordering::Acquire);
        tail.wrapping_sub(head) & self.mask
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.head.load(Ordering::Acquire) == self.tail.load(Ordering::Acquire)
    }

    /// Maximum occupancy (`capacity - 1`; one slot disambiguates full).
    #[inline]
    pub fn capacity(&self) -> usize {
        self.mask
    }
}

impl<T> Drop for SpscQueue<T> {
    fn drop(&mut self) {
        while self.try_pop().is_some() {}
    }
}
