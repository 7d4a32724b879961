use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

/// Independent random streams derived from one global seed.
///
/// Every stochastic operation that must be reproducible draws from its own
/// stream, so adding a draw in one place (e.g. an extra dropout mask) does
/// not shift the sequence seen by another (e.g. weight initialization).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RngStream {
    Init,
    Shuffle,
    Dropout,
    Augment,
    Sampler,
    Folds,
}

impl RngStream {
    fn id(self) -> u64 {
        match self {
            RngStream::Init    => 1,
            RngStream::Shuffle => 2,
            RngStream::Dropout => 3,
            RngStream::Augment => 4,
            RngStream::Sampler => 5,
            RngStream::Folds   => 6,
        }
    }
}

/// Returns a ChaCha8 generator for `stream`, seeded from `seed`.
pub fn seeded_rng(seed: u64, stream: RngStream) -> ChaCha8Rng {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    rng.set_stream(stream.id());
    rng
}
