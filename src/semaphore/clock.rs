use std::time::Instant;

/// Monotonic clock anchored at semaphore construction.
///
/// Every timestamp inside the gate is an `f64` second count measured from
/// this origin. Unlike `Instant`, the readings are negatable, which the RT
/// LIFO ordering relies on.
#[derive(Debug, Clone)]
pub(crate) struct Clock {
    origin: Instant,
}

impl Clock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }

    /// Seconds elapsed since construction.
    pub fn now(&self) -> f64 {
        self.origin.elapsed().as_secs_f64()
    }
}
