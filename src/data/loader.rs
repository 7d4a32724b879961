use std::path::{Path, PathBuf};

use image::DynamicImage;
use log::{debug, info};
use ndarray::Array3;

use crate::data::sample::ImageSample;
use crate::error::{Error, Result};

const IMAGE_EXTENSIONS: [&str; 7] = ["png", "jpg", "jpeg", "bmp", "gif", "tif", "tiff"];

/// Reads one image as an (H, W, channels) sample.
///
/// 8- and 16-bit grayscale or RGB files keep their stored integer counts;
/// any other pixel format is converted to floats in [0, 1].
pub fn load_image(path: &Path, channels: usize) -> Result<ImageSample> {
    if !(1..=3).contains(&channels) {
        return Err(Error::config(format!("img_num_channels must be 1, 2 or 3, got {channels}")));
    }
    let img = image::open(path)?;
    let (w, h) = (img.width() as usize, img.height() as usize);

    let sample = if channels == 1 {
        let data: Vec<f32> = match img {
            DynamicImage::ImageLuma8(buf) => buf.into_raw().into_iter().map(f32::from).collect(),
            DynamicImage::ImageLuma16(buf) => buf.into_raw().into_iter().map(f32::from).collect(),
            other => other.to_luma32f().into_raw(),
        };
        Array3::from_shape_vec((h, w, 1), data)
    } else {
        let rgb: Vec<f32> = match img {
            DynamicImage::ImageRgb8(buf) => buf.into_raw().into_iter().map(f32::from).collect(),
            DynamicImage::ImageRgb16(buf) => buf.into_raw().into_iter().map(f32::from).collect(),
            other => other.to_rgb32f().into_raw(),
        };
        Array3::from_shape_vec((h, w, 3), rgb).map(|a| a.slice(ndarray::s![.., .., ..channels]).to_owned())
    };
    sample.map_err(|e| Error::shape(format!("{}: {e}", path.display())))
}

/// Image files directly inside `dir`, sorted by name.
pub fn list_images(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut paths = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if let Some(ext) = path.extension() {
            let ext = ext.to_string_lossy().to_lowercase();
            if IMAGE_EXTENSIONS.contains(&ext.as_str()) {
                paths.push(path);
            }
        }
    }
    paths.sort();
    Ok(paths)
}

/// Loads every image in `dir`.
pub fn load_dir(dir: &Path, channels: usize) -> Result<Vec<ImageSample>> {
    let paths = list_images(dir)?;
    if paths.is_empty() {
        return Err(Error::config(format!("no images found in {}", dir.display())));
    }
    let samples = paths
        .iter()
        .map(|p| {
            debug!("loading {}", p.display());
            load_image(p, channels)
        })
        .collect::<Result<Vec<_>>>()?;
    info!("loaded {} images from {}", samples.len(), dir.display());
    Ok(samples)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma, Rgb, RgbImage};

    #[test]
    fn grayscale_keeps_raw_counts() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.png");
        GrayImage::from_fn(4, 3, |x, y| Luma([(x * 10 + y) as u8])).save(&path).unwrap();

        let s = load_image(&path, 1).unwrap();
        assert_eq!(s.dim(), (3, 4, 1));
        assert_eq!(s[[2, 3, 0]], 32.0);
    }

    #[test]
    fn rgb_channels_are_truncated_to_request() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("b.png");
        RgbImage::from_pixel(2, 2, Rgb([1, 2, 3])).save(&path).unwrap();

        let s = load_image(&path, 2).unwrap();
        assert_eq!(s.dim(), (2, 2, 2));
        assert_eq!(s[[0, 0, 1]], 2.0);
    }

    #[test]
    fn load_dir_skips_other_files() {
        let dir = tempfile::tempdir().unwrap();
        GrayImage::new(2, 2).save(dir.path().join("x.png")).unwrap();
        std::fs::write(dir.path().join("notes.txt"), "not an image").unwrap();
        assert_eq!(load_dir(dir.path(), 1).unwrap().len(), 1);
    }
}
