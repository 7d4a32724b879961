use rand::seq::SliceRandom;

use crate::error::{Error, Result};
use crate::math::{seeded_rng, RngStream};

/// Train/test index split for one cross-validation fold.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fold {
    pub train: Vec<usize>,
    pub test: Vec<usize>,
}

/// Splits sample indices into `k` folds that each keep the class ratio of
/// `labels`. Every index lands in exactly one test set.
pub fn stratified_folds(labels: &[usize], k: usize, seed: u64) -> Result<Vec<Fold>> {
    if k < 2 {
        return Err(Error::config(format!("cross-validation needs at least 2 folds, got {k}")));
    }
    let classes = labels.iter().copied().max().map_or(0, |m| m + 1);
    let mut by_class: Vec<Vec<usize>> = vec![Vec::new(); classes];
    for (i, &label) in labels.iter().enumerate() {
        by_class[label].push(i);
    }
    if let Some(smallest) = by_class.iter().map(Vec::len).filter(|&n| n > 0).min() {
        if smallest < k {
            return Err(Error::config(format!(
                "cannot make {k} stratified folds when a class has only {smallest} samples"
            )));
        }
    }

    let mut rng = seeded_rng(seed, RngStream::Folds);
    let mut test_sets: Vec<Vec<usize>> = vec![Vec::new(); k];
    for members in &mut by_class {
        members.shuffle(&mut rng);
        for (j, &idx) in members.iter().enumerate() {
            test_sets[j % k].push(idx);
        }
    }

    Ok(test_sets
        .into_iter()
        .map(|mut test| {
            test.sort_unstable();
            let train = (0..labels.len()).filter(|i| test.binary_search(i).is_err()).collect();
            Fold { train, test }
        })
        .collect())
}
