use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::layers::{PoolingType, Shape};
use crate::network::builder::assemble;
use crate::network::spec::{ConvBlock, HyperparameterRecord};
use crate::network::Network;

/// Builds a network of one fixed convolutional depth.
pub trait TopologyStrategy {
    /// Number of convolution blocks.
    fn depth(&self) -> usize;

    /// Blocks of the base model at this depth.
    fn default_blocks(&self) -> Vec<ConvBlock>;

    /// Builds an untrained network from `record` for per-sample `input`
    /// shape, drawing initial weights from `seed`.
    fn build(&self, record: &HyperparameterRecord, input: Shape, seed: u64) -> Result<Network> {
        if record.blocks.len() != self.depth() {
            return Err(Error::build(format!(
                "a depth-{} topology cannot build {} blocks",
                self.depth(),
                record.blocks.len()
            )));
        }
        assemble(record, input, seed)
    }
}

/// The five fixed convolutional depths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Architecture {
    Depth1,
    Depth2,
    Depth3,
    Depth4,
    Depth5,
}

impl Architecture {
    pub const ALL: [Architecture; 5] = [
        Architecture::Depth1,
        Architecture::Depth2,
        Architecture::Depth3,
        Architecture::Depth4,
        Architecture::Depth5,
    ];

    /// Maps the 1-based model number used in configuration files.
    pub fn from_depth(depth: usize) -> Result<Architecture> {
        Architecture::ALL
            .get(depth.wrapping_sub(1))
            .copied()
            .ok_or_else(|| Error::config(format!("architecture must be between 1 and 5, got {depth}")))
    }
}

impl std::fmt::Display for Architecture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "architecture {}", self.depth())
    }
}

// AlexNet progression: (filters, kernel, stride)
const ALEXNET: [(usize, usize, usize); 5] = [(96, 11, 4), (256, 5, 1), (384, 3, 1), (384, 3, 1), (256, 3, 1)];

impl TopologyStrategy for Architecture {
    fn depth(&self) -> usize {
        match self {
            Architecture::Depth1 => 1,
            Architecture::Depth2 => 2,
            Architecture::Depth3 => 3,
            Architecture::Depth4 => 4,
            Architecture::Depth5 => 5,
        }
    }

    /// Max pooling 3/2 follows the first two blocks and the last block.
    fn default_blocks(&self) -> Vec<ConvBlock> {
        let depth = self.depth();
        ALEXNET[..depth]
            .iter()
            .enumerate()
            .map(|(i, &(filters, kernel, stride))| {
                let block = ConvBlock::new(filters, kernel, stride);
                if i < 2 || i + 1 == depth {
                    block.with_pooling(PoolingType::Max, 3, 2)
                } else {
                    block
                }
            })
            .collect()
    }
}
