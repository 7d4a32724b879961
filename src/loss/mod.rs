pub mod cross_entropy;
pub mod loss_type;
pub mod squared_hinge;

pub use cross_entropy::CrossEntropyLoss;
pub use loss_type::LossType;
pub use squared_hinge::SquaredHingeLoss;
