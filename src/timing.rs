use once_cell::sync::Lazy;
use std::hint;
use std::time::Instant;

// All timestamps in the system are nanoseconds since this anchor, so values
// taken on different threads are directly comparable.
static CLOCK_ANCHOR: Lazy<Instant> = Lazy::new(Instant::now);

/// Current monotonic time in nanoseconds.
#[inline]
pub fn now_ns() -> u64 {
    CLOCK_ANCHOR.elapsed().as_nanos() as u64
}

/// Simulate a service time by actively spinning on the monotonic clock.
///
/// Sleeping primitives have resolution far worse than the sub-microsecond
/// service times modeled here, so this never parks the thread.
#[inline]
pub fn spin_for_ns(nanos: u64) {
    if nanos == 0 {
        return;
    }
    let start = Instant::now();
    while (start.elapsed().as_nanos() as u64) < nanos {
        hint::spin_loop();
    }
}

/// Pause hint for spin loops waiting on another core (queue empty/full).
#[inline]
pub fn pause() {
    hint::spin_loop();
}
