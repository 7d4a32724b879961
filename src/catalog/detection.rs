//! Threshold segmentation: sigma-clipped background statistics, 8-connected
//! components and intensity-weighted centroids.

use std::collections::VecDeque;

use log::debug;
use ndarray::{Array2, ArrayView2};

use crate::catalog::aperture::median;

/// Robust background estimate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClippedStats {
    pub mean: f64,
    pub median: f64,
    pub std: f64,
}

/// Iteratively rejects values further than `sigma` standard deviations from
/// the median, at most `max_iters` times or until nothing changes.
/// Non-finite values are ignored.
pub fn sigma_clipped_stats(values: impl IntoIterator<Item = f64>, sigma: f64, max_iters: usize) -> ClippedStats {
    let mut kept: Vec<f64> = values.into_iter().filter(|v| v.is_finite()).collect();
    for _ in 0..max_iters {
        let Some(stats) = plain_stats(&mut kept) else { break };
        let before = kept.len();
        kept.retain(|v| (v - stats.median).abs() <= sigma * stats.std);
        if kept.len() == before || kept.is_empty() {
            break;
        }
    }
    plain_stats(&mut kept).unwrap_or(ClippedStats { mean: 0.0, median: 0.0, std: 0.0 })
}

fn plain_stats(values: &mut [f64]) -> Option<ClippedStats> {
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let std = (values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n).sqrt();
    Some(ClippedStats { mean, median: median(values)?, std })
}

/// A connected group of pixels, as `(row, col)`.
pub type Segment = Vec<(usize, usize)>;

/// 8-connected components of `mask` with at least `min_pixels` members, in
/// raster order of their first pixel.
pub fn label_components(mask: &ArrayView2<bool>, min_pixels: usize) -> Vec<Segment> {
    let (rows, cols) = mask.dim();
    let mut seen = Array2::<bool>::from_elem((rows, cols), false);
    let mut segments = Vec::new();
    let mut queue = VecDeque::new();

    for ((r, c), &on) in mask.indexed_iter() {
        if !on || seen[[r, c]] {
            continue;
        }
        seen[[r, c]] = true;
        queue.push_back((r, c));
        let mut segment = Vec::new();
        while let Some((pr, pc)) = queue.pop_front() {
            segment.push((pr, pc));
            for nr in pr.saturating_sub(1)..=(pr + 1).min(rows - 1) {
                for nc in pc.saturating_sub(1)..=(pc + 1).min(cols - 1) {
                    if mask[[nr, nc]] && !seen[[nr, nc]] {
                        seen[[nr, nc]] = true;
                        queue.push_back((nr, nc));
                    }
                }
            }
        }
        if segment.len() >= min_pixels {
            segments.push(segment);
        }
    }
    segments
}

/// Intensity-weighted centre `(x, y)` of a segment. Falls back to the plain
/// pixel mean when the weights do not sum to a positive value.
pub fn weighted_centroid(image: &ArrayView2<f64>, segment: &[(usize, usize)], floor: f64) -> (f64, f64) {
    let (mut w, mut sx, mut sy) = (0.0, 0.0, 0.0);
    for &(r, c) in segment {
        let v = (image[[r, c]] - floor).max(0.0);
        w += v;
        sx += v * c as f64;
        sy += v * r as f64;
    }
    if w > 0.0 {
        return (sx / w, sy / w);
    }
    let n = segment.len().max(1) as f64;
    let (sx, sy) = segment.iter().fold((0.0, 0.0), |(x, y), &(r, c)| (x + c as f64, y + r as f64));
    (sx / n, sy / n)
}

/// Positions of sources brighter than `median + nsigma * std` of the
/// sigma-clipped background, each covering at least `min_pixels` pixels.
pub fn detect_sources(image: &ArrayView2<f64>, nsigma: f64, min_pixels: usize) -> Vec<(f64, f64)> {
    let stats = sigma_clipped_stats(image.iter().copied(), 3.0, 5);
    let threshold = stats.median + nsigma * stats.std;
    let mask = image.mapv(|v| v > threshold);
    let segments = label_components(&mask.view(), min_pixels);
    debug!(
        "background median {:.3} std {:.3}; {} sources above {threshold:.3}",
        stats.median,
        stats.std,
        segments.len()
    );
    segments.iter().map(|s| weighted_centroid(image, s, stats.median)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn clipping_removes_outliers() {
        let mut values: Vec<f64> = (0..100).map(|i| 10.0 + (i % 5) as f64 * 0.1).collect();
        values.push(1e6);
        let stats = sigma_clipped_stats(values, 3.0, 5);
        assert!(stats.mean < 11.0);
        assert_relative_eq!(stats.median, 10.2);
    }

    #[test]
    fn diagonal_pixels_join_one_component() {
        let mut mask = Array2::<bool>::from_elem((6, 6), false);
        for i in 0..4 {
            mask[[i, i]] = true;
        }
        mask[[5, 0]] = true;
        let segments = label_components(&mask.view(), 1);
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].len(), 4);
        assert!(label_components(&mask.view(), 2).len() == 1);
    }

    #[test]
    fn finds_two_separated_sources() {
        let mut image = Array2::<f64>::from_shape_fn((60, 60), |(r, c)| ((r * 7 + c * 13) % 5) as f64);
        for (cy, cx) in [(15usize, 20usize), (40, 45)] {
            for r in cy - 2..=cy + 2 {
                for c in cx - 2..=cx + 2 {
                    image[[r, c]] += 100.0;
                }
            }
        }
        let mut found = detect_sources(&image.view(), 2.0, 5);
        found.sort_by(|a, b| a.0.total_cmp(&b.0));
        assert_eq!(found.len(), 2);
        assert!((found[0].0 - 20.0).abs() < 0.5 && (found[0].1 - 15.0).abs() < 0.5);
        assert!((found[1].0 - 45.0).abs() < 0.5 && (found[1].1 - 40.0).abs() < 0.5);
    }
}
