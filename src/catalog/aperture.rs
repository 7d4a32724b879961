//! Circular aperture and background annulus sums.
//!
//! Pixels are assigned with the "center" method: a pixel belongs to a region
//! when its centre lies inside it. Pixel `[[row, col]]` has centre
//! `(x, y) = (col, row)`.

use ndarray::ArrayView2;

use crate::error::{Error, Result};

/// Radii of the measurement aperture and the background annulus, in pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ApertureRadii {
    pub aperture: f64,
    pub annulus_in: f64,
    pub annulus_out: f64,
}

impl ApertureRadii {
    /// Requires `0 < aperture <= annulus_in <= annulus_out`.
    pub fn new(aperture: f64, annulus_in: f64, annulus_out: f64) -> Result<Self> {
        if !(aperture > 0.0 && aperture.is_finite()) {
            return Err(Error::aperture(format!("aperture radius must be positive, got {aperture}")));
        }
        if aperture > annulus_in || annulus_in > annulus_out {
            return Err(Error::aperture(format!(
                "radii must satisfy aperture <= annulus_in <= annulus_out, got {aperture}, {annulus_in}, {annulus_out}"
            )));
        }
        Ok(ApertureRadii { aperture, annulus_in, annulus_out })
    }
}

/// Pixel coordinates `(row, col)` of the aperture and of the annulus around
/// `(x, y)`, clipped to an image of `dim = (rows, cols)`.
pub fn region_pixels(dim: (usize, usize), x: f64, y: f64, radii: &ApertureRadii) -> (Vec<(usize, usize)>, Vec<(usize, usize)>) {
    let (rows, cols) = dim;
    let reach = radii.annulus_out.ceil() as isize;
    let (cx, cy) = (x.round() as isize, y.round() as isize);
    let col_range = (cx - reach).max(0)..(cx + reach + 1).min(cols as isize).max(0);
    let row_range = (cy - reach).max(0)..(cy + reach + 1).min(rows as isize).max(0);

    let mut aperture = Vec::new();
    let mut annulus = Vec::new();
    for row in row_range {
        for col in col_range.clone() {
            let r = (col as f64 - x).hypot(row as f64 - y);
            let px = (row as usize, col as usize);
            if r <= radii.aperture {
                aperture.push(px);
            } else if r >= radii.annulus_in && r <= radii.annulus_out {
                annulus.push(px);
            }
        }
    }
    (aperture, annulus)
}

/// Background-subtracted aperture measurement of one object.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ApertureMeasurement {
    /// Raw aperture sum.
    pub sum: f64,
    /// Median of the annulus pixels.
    pub background: f64,
    /// Pixels inside the aperture.
    pub area: usize,
    /// `sum - background * area`.
    pub flux: f64,
    /// Quadrature sum of the error map over the aperture.
    pub flux_err: Option<f64>,
}

pub fn measure(
    image: &ArrayView2<f64>,
    error: Option<&ArrayView2<f64>>,
    x: f64,
    y: f64,
    radii: &ApertureRadii,
) -> Result<ApertureMeasurement> {
    let (aperture, annulus) = region_pixels(image.dim(), x, y, radii);
    if aperture.is_empty() {
        return Err(Error::catalog(format!("aperture at ({x:.1}, {y:.1}) lies outside the image")));
    }
    let sum: f64 = aperture.iter().map(|&p| image[p]).sum();
    let mut ring: Vec<f64> = annulus.iter().map(|&p| image[p]).collect();
    let background = median(&mut ring).unwrap_or(0.0);
    let flux_err = error.map(|e| aperture.iter().map(|&p| e[p] * e[p]).sum::<f64>().sqrt());

    Ok(ApertureMeasurement {
        sum,
        background,
        area: aperture.len(),
        flux: sum - background * aperture.len() as f64,
        flux_err,
    })
}

/// Median of `values`, reordering them. `None` when empty.
pub fn median(values: &mut [f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(f64::total_cmp);
    let mid = values.len() / 2;
    Some(if values.len() % 2 == 0 { (values[mid - 1] + values[mid]) / 2.0 } else { values[mid] })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::Array2;

    #[test]
    fn radii_ordering_is_enforced() {
        assert!(ApertureRadii::new(15.0, 20.0, 35.0).is_ok());
        assert!(ApertureRadii::new(5.0, 5.0, 5.0).is_ok());
        for (a, i, o) in [(25.0, 20.0, 35.0), (15.0, 40.0, 35.0), (0.0, 1.0, 2.0)] {
            assert!(matches!(ApertureRadii::new(a, i, o), Err(Error::InvalidAperture(_))));
        }
    }

    #[test]
    fn flat_background_cancels() {
        let mut image = Array2::<f64>::from_elem((40, 40), 10.0);
        image[[20, 20]] += 500.0;
        let radii = ApertureRadii::new(3.0, 6.0, 9.0).unwrap();
        let m = measure(&image.view(), None, 20.0, 20.0, &radii).unwrap();
        assert_relative_eq!(m.background, 10.0);
        assert_relative_eq!(m.flux, 500.0, epsilon = 1e-9);
        assert!(m.flux_err.is_none());
    }

    #[test]
    fn error_map_adds_in_quadrature() {
        let image = Array2::<f64>::zeros((20, 20));
        let error = Array2::<f64>::from_elem((20, 20), 2.0);
        let radii = ApertureRadii::new(2.0, 4.0, 6.0).unwrap();
        let m = measure(&image.view(), Some(&error.view()), 10.0, 10.0, &radii).unwrap();
        assert_relative_eq!(m.flux_err.unwrap(), 2.0 * (m.area as f64).sqrt(), epsilon = 1e-12);
    }

    #[test]
    fn edge_objects_are_clipped_not_rejected() {
        let image = Array2::<f64>::ones((10, 10));
        let radii = ApertureRadii::new(1.5, 3.0, 4.5).unwrap();
        let (ap, ring) = region_pixels(image.dim(), 0.0, 0.0, &radii);
        assert!(!ap.is_empty() && !ring.is_empty());
        assert!(measure(&image.view(), None, -50.0, -50.0, &radii).is_err());
    }
}
