pub mod clock;
pub mod invariant;
pub mod logger;
pub mod shared_reference;
pub mod task_canceller;
pub mod time_ranges;
