use std::time::Duration;

use typed_builder::TypedBuilder;

/// Tuning for the sweeper's accumulate-and-flush cycle.
#[derive(Debug, Clone, Copy, TypedBuilder)]
pub struct SweeperConfig {
    /// Accumulated requests that trigger an immediate flush.
    #[builder(default = 100)]
    pub batch_size: usize,
    /// How often a non-empty accumulator is flushed regardless of size.
    #[builder(default = Duration::from_secs(2))]
    pub flush_interval: Duration,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}
