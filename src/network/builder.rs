use log::{debug, warn};

use crate::activation::ActivationFunction;
use crate::error::{Error, Result};
use crate::layers::{
    BatchNorm, Conv2d, Dense, Dropout, Flatten, Layer, LocalResponseNorm, Pool2d, PoolingType, Shape,
};
use crate::math::{same_padding, seeded_rng, RngStream};
use crate::network::spec::{HyperparameterRecord, Regularization};
use crate::network::topology::TopologyStrategy;
use crate::network::Network;
use crate::optim::Sgd;

/// Batch sizes below this make batch-norm statistics unreliable.
pub const MIN_BATCH_NORM_BATCH: usize = 16;

/// Number of output classes.
pub const NUM_CLASSES: usize = 2;

/// Builds the network described by `record` through its architecture's
/// topology strategy.
pub fn build_network(record: &HyperparameterRecord, input: Shape, seed: u64) -> Result<Network> {
    record.architecture.build(record, input, seed)
}

/// Trainable and stored parameters `record` would allocate for `input`,
/// computed from shapes alone without building any layer.
pub fn parameter_estimate(record: &HyperparameterRecord, input: Shape) -> Result<usize> {
    let (mut h, mut w, mut c) = input.spatial("the first convolution block")?;
    let mut total = 0usize;
    for block in &record.blocks {
        if block.stride == 0 || block.kernel_size == 0 {
            return Err(Error::build("kernel size and stride must be positive"));
        }
        total += block.kernel_size * block.kernel_size * c * block.filters + block.filters;
        let pad = same_padding(h, w, block.kernel_size, block.stride);
        (h, w, c) = (pad.out_h, pad.out_w, block.filters);
        if block.pooling != PoolingType::None && block.pool_stride > 0 {
            let pad = same_padding(h, w, block.pool_size, block.pool_stride);
            (h, w) = (pad.out_h, pad.out_w);
        }
        if record.regularization == Regularization::BatchNorm {
            total += 4 * c;
        }
    }
    let mut width = h * w * c;
    for &n in &record.dense.neurons {
        total += width * n + n;
        width = n;
    }
    Ok(total + width * NUM_CLASSES + NUM_CLASSES)
}

/// Shared assembly used by every topology: conv blocks, flatten, two dense
/// layers with dropout and a two-unit softmax output.
pub(crate) fn assemble(record: &HyperparameterRecord, input: Shape, seed: u64) -> Result<Network> {
    record.validate()?;
    input.spatial("the first convolution block")?;

    if record.regularization == Regularization::BatchNorm && record.batch_size < MIN_BATCH_NORM_BATCH {
        warn!(
            "batch size {} is below {MIN_BATCH_NORM_BATCH}; batch normalization statistics may be unstable",
            record.batch_size
        );
    }

    let mut rng = seeded_rng(seed, RngStream::Init);
    let mut layers: Vec<Layer> = Vec::new();
    let mut shape = input;

    let push = |layer: Layer, shape: &mut Shape, layers: &mut Vec<Layer>| -> Result<()> {
        *shape = layer.output_shape(*shape)?;
        layers.push(layer);
        Ok(())
    };

    for (i, block) in record.blocks.iter().enumerate() {
        let (_, _, channels) = shape.spatial("conv2d")?;
        let conv = Conv2d::new(
            block.filters,
            block.kernel_size,
            block.stride,
            channels,
            record.activation_conv,
            &mut rng,
        )?;
        push(Layer::Conv2d(conv), &mut shape, &mut layers)?;

        if block.pooling != PoolingType::None {
            let (h, w, _) = shape.spatial("pooling")?;
            if block.pool_size > h || block.pool_size > w {
                return Err(Error::build(format!(
                    "block {}: pool size {} exceeds the {h}x{w} feature map",
                    i + 1,
                    block.pool_size
                )));
            }
            let pool = Pool2d::new(block.pooling, block.pool_size, block.pool_stride)?;
            push(Layer::Pool2d(pool), &mut shape, &mut layers)?;
        }

        match record.regularization {
            Regularization::BatchNorm => {
                let (_, _, c) = shape.spatial("batch_normalization")?;
                push(Layer::BatchNorm(BatchNorm::new(c)), &mut shape, &mut layers)?;
            }
            Regularization::LocalResponse => {
                push(Layer::LocalResponseNorm(LocalResponseNorm::default()), &mut shape, &mut layers)?;
            }
            Regularization::None => {}
        }
    }

    push(Layer::Flatten(Flatten::default()), &mut shape, &mut layers)?;
    for i in 0..2 {
        let dense = Dense::new(record.dense.neurons[i], shape.size(), record.activation_dense, &mut rng)?;
        push(Layer::Dense(dense), &mut shape, &mut layers)?;
        push(Layer::Dropout(Dropout::new(record.dense.dropout[i])?), &mut shape, &mut layers)?;
    }
    let output = Dense::new(NUM_CLASSES, shape.size(), ActivationFunction::Softmax, &mut rng)?;
    push(Layer::Dense(output), &mut shape, &mut layers)?;

    let opt = &record.optimizer;
    let network = Network {
        input_shape: input,
        layers,
        loss: record.loss,
        optimizer: Sgd::new(opt.lr, opt.momentum, opt.decay, opt.nesterov),
    };
    debug!(
        "built {} with {} layers and {} parameters",
        record.architecture,
        network.layers.len(),
        network.parameter_count()
    );
    Ok(network)
}
