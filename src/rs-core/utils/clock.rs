use std::cell::Cell;

/// Source of monotonically-increasing timestamps, in milliseconds.
///
/// Every time-dependent heuristic reads the current time through this trait, so that it can be
/// driven by a `ManualClock` in simulations.
pub trait Clock {
    fn now_ms(&self) -> f64;
}

/// `Clock` relying on the platform's monotonic timer.
///
/// In a WebAssembly build, this is `performance.now()`. Natively, this is the time elapsed since
/// the `MonotonicClock` was created.
pub struct MonotonicClock {
    #[cfg(not(target_arch = "wasm32"))]
    origin: std::time::Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            #[cfg(not(target_arch = "wasm32"))]
            origin: std::time::Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    #[cfg(target_arch = "wasm32")]
    fn now_ms(&self) -> f64 {
        crate::bindings::jsPerformanceNow()
    }

    #[cfg(not(target_arch = "wasm32"))]
    fn now_ms(&self) -> f64 {
        self.origin.elapsed().as_secs_f64() * 1000.
    }
}

/// `Clock` whose time only moves when asked to.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: Cell<f64>,
}

impl ManualClock {
    pub fn new(initial_ms: f64) -> Self {
        Self {
            now: Cell::new(initial_ms),
        }
    }

    pub fn set(&self, now_ms: f64) {
        self.now.set(now_ms);
    }

    pub fn advance(&self, delta_ms: f64) {
        self.now.set(self.now.get() + delta_ms);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> f64 {
        self.now.get()
    }
}
