pub mod im2col;
pub mod init;
pub mod rng;

pub use im2col::{col2im, im2col, same_padding, SamePadding};
pub use init::Initializer;
pub use rng::{seeded_rng, RngStream};
