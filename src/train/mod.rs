pub mod callbacks;
pub mod epoch_stats;
pub mod history;
pub mod loop_fn;
pub mod metrics;
pub mod train_config;
pub mod trainer;

pub use callbacks::{CallbackAction, EarlyStopping, EpochCallback, ModelCheckpoint};
pub use epoch_stats::EpochStats;
pub use history::TrainingHistory;
pub use loop_fn::train_loop;
pub use metrics::{accuracy, f1_score, Direction, Metric};
pub use train_config::TrainConfig;
pub use trainer::{fit, TrainedModel};
