use std::sync::mpsc;
use std::sync::{atomic::AtomicBool, Arc};

use crate::error::{Error, Result};
use crate::train::epoch_stats::EpochStats;

/// Configuration for a [`fit`](crate::train::fit) run.
///
/// # Fields
/// - `epochs`      : total number of full passes over the training data
/// - `batch_size`  : samples per mini-batch
/// - `seed`        : root of the shuffle and dropout streams
/// - `progress_tx` : optional channel sender; one `EpochStats` is sent per
///                   completed epoch. If the receiver is dropped the loop
///                   terminates early.
/// - `stop_flag`   : optional atomic flag; when set to `true` from another
///                   thread the loop terminates after the current epoch.
#[derive(Debug, Clone)]
pub struct TrainConfig {
    pub epochs: usize,
    pub batch_size: usize,
    pub seed: u64,
    pub progress_tx: Option<mpsc::Sender<EpochStats>>,
    pub stop_flag: Option<Arc<AtomicBool>>,
}

impl TrainConfig {
    /// Creates a minimal `TrainConfig` with no progress channel and no stop flag.
    pub fn new(epochs: usize, batch_size: usize, seed: u64) -> Self {
        TrainConfig { epochs, batch_size, seed, progress_tx: None, stop_flag: None }
    }

    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(Error::config("batch_size must be at least 1"));
        }
        Ok(())
    }
}
