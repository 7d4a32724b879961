use ndarray::{s, ArrayView2};
use serde::{Deserialize, Serialize};

use crate::catalog::detection::{label_components, sigma_clipped_stats, weighted_centroid, Segment};

/// Segments smaller than this are noise.
pub const MIN_SEGMENT_PIXELS: usize = 5;

/// Shape descriptors of the segment nearest an object.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Morphology {
    /// Centroid in full-image coordinates.
    pub x: f64,
    pub y: f64,
    /// Pixels in the segment.
    pub area: usize,
    /// Intensity-weighted central second moments.
    pub m_xx: f64,
    pub m_yy: f64,
    pub m_xy: f64,
    pub semimajor: f64,
    pub semiminor: f64,
    /// Angle of the major axis from +x, radians in (-pi/2, pi/2].
    pub orientation: f64,
    /// `1 - semiminor / semimajor`.
    pub ellipticity: f64,
}

/// Segments a `crop_size` window around `(x, y)` at `median + 1 sigma` and
/// describes the segment whose centroid is nearest the object. `None` when
/// the window holds no segment.
pub fn morphology(image: &ArrayView2<f64>, x: f64, y: f64, crop_size: usize) -> Option<Morphology> {
    let (rows, cols) = image.dim();
    let half = (crop_size / 2) as isize;
    let r0 = (y.round() as isize - half).clamp(0, rows as isize) as usize;
    let c0 = (x.round() as isize - half).clamp(0, cols as isize) as usize;
    let r1 = (r0 + crop_size).min(rows);
    let c1 = (c0 + crop_size).min(cols);
    if r1 <= r0 || c1 <= c0 {
        return None;
    }
    let crop = image.slice(s![r0..r1, c0..c1]);

    let stats = sigma_clipped_stats(crop.iter().copied(), 3.0, 5);
    let threshold = stats.median + stats.std;
    let mask = crop.mapv(|v| v > threshold);
    let segments = label_components(&mask.view(), MIN_SEGMENT_PIXELS);

    let (lx, ly) = (x - c0 as f64, y - r0 as f64);
    let nearest = segments
        .iter()
        .map(|seg| (weighted_centroid(&crop, seg, stats.median), seg))
        .min_by(|((ax, ay), _), ((bx, by), _)| {
            (ax - lx).hypot(ay - ly).total_cmp(&(bx - lx).hypot(by - ly))
        })?;
    let ((cx, cy), segment) = nearest;
    Some(describe(&crop, segment, cx, cy, stats.median, (c0, r0)))
}

fn describe(
    crop: &ArrayView2<f64>,
    segment: &Segment,
    cx: f64,
    cy: f64,
    floor: f64,
    origin: (usize, usize),
) -> Morphology {
    let (mut w, mut mxx, mut myy, mut mxy) = (0.0, 0.0, 0.0, 0.0);
    for &(r, c) in segment {
        let v = (crop[[r, c]] - floor).max(0.0);
        let (dx, dy) = (c as f64 - cx, r as f64 - cy);
        w += v;
        mxx += v * dx * dx;
        myy += v * dy * dy;
        mxy += v * dx * dy;
    }
    if w > 0.0 {
        (mxx, myy, mxy) = (mxx / w, myy / w, mxy / w);
    }

    // Eigenvalues of the moment matrix.
    let mean = (mxx + myy) / 2.0;
    let diff = ((mxx - myy) / 2.0).hypot(mxy);
    let semimajor = (mean + diff).max(0.0).sqrt();
    let semiminor = (mean - diff).max(0.0).sqrt();
    let ellipticity = if semimajor > 0.0 { 1.0 - semiminor / semimajor } else { 0.0 };

    Morphology {
        x: cx + origin.0 as f64,
        y: cy + origin.1 as f64,
        area: segment.len(),
        m_xx: mxx,
        m_yy: myy,
        m_xy: mxy,
        semimajor,
        semiminor,
        orientation: 0.5 * (2.0 * mxy).atan2(mxx - myy),
        ellipticity,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    fn ellipse(rows: usize, cols: usize, cx: f64, cy: f64, a: f64, b: f64) -> Array2<f64> {
        Array2::from_shape_fn((rows, cols), |(r, c)| {
            let (dx, dy) = ((c as f64 - cx) / a, (r as f64 - cy) / b);
            if dx * dx + dy * dy <= 1.0 { 50.0 } else { 1.0 }
        })
    }

    #[test]
    fn elongated_source_along_x() {
        let image = ellipse(100, 100, 50.0, 50.0, 12.0, 4.0);
        let m = morphology(&image.view(), 50.0, 50.0, 100).unwrap();
        assert!((m.x - 50.0).abs() < 0.5 && (m.y - 50.0).abs() < 0.5);
        assert!(m.semimajor > 2.0 * m.semiminor);
        assert!(m.orientation.abs() < 0.1);
        assert!(m.ellipticity > 0.5);
    }

    #[test]
    fn picks_the_segment_nearest_the_object() {
        let mut image = ellipse(120, 120, 30.0, 30.0, 5.0, 5.0);
        let other = ellipse(120, 120, 70.0, 60.0, 3.0, 8.0);
        image.zip_mut_with(&other, |a, &b| *a = a.max(b));
        let m = morphology(&image.view(), 68.0, 61.0, 100).unwrap();
        assert!((m.x - 70.0).abs() < 0.5);
        assert!(m.orientation.abs() > 1.0, "major axis should be near vertical");
    }

    #[test]
    fn empty_window_has_no_morphology() {
        let image = Array2::<f64>::zeros((50, 50));
        assert!(morphology(&image.view(), 25.0, 25.0, 20).is_none());
    }
}
