use crate::record::AssetMetadata;
use crate::utils::coarse_color_name;
use anyhow::{Context, Result};
use image::imageops::FilterType;
use kmeans_colors::get_kmeans_hamerly;
use palette::{IntoColor, Lab, Srgb};
use rayon::prelude::*;
use std::collections::{HashMap, HashSet};
use std::path::Path;

const K: usize = 5;
const CONVERGENCE_THRESHOLD: f32 = 2.0;
const MAX_ITERATIONS: usize = 100;
const SAMPLE_SIZE: u32 = 128;
/// Below this many distinct pixels clustering is skipped and pixels are counted directly
const MIN_DISTINCT_FOR_KMEANS: usize = K * 4;

/// Measure a cached asset.
///
/// Dimensions and file size describe the asset itself, so they are only
/// reported when it is the full-resolution image; a thumbnail still
/// contributes its colors.
pub fn measure(path: &Path, full_resolution: bool) -> Result<AssetMetadata> {
    let colors = dominant_colors(path)?;

    let mut meta = AssetMetadata {
        colors,
        ..Default::default()
    };
    if full_resolution {
        let (width, height) = image::image_dimensions(path).context("Failed to read image dimensions")?;
        meta.width = width;
        meta.height = height;
        meta.file_size = std::fs::metadata(path).ok().map(|m| m.len());
    }
    Ok(meta)
}

/// Up to five coarse color names, most common first
pub fn dominant_colors(path: &Path) -> Result<Vec<String>> {
    let img = image::open(path).context("Failed to open image")?;
    let sample = img.resize(SAMPLE_SIZE, SAMPLE_SIZE, FilterType::Triangle);
    let pixels: Vec<[u8; 3]> = sample.to_rgb8().pixels().map(|p| p.0).collect();
    if pixels.is_empty() {
        return Ok(Vec::new());
    }

    let distinct: HashSet<[u8; 3]> = pixels.iter().copied().collect();
    let ranked: Vec<(u8, u8, u8)> = if distinct.len() < MIN_DISTINCT_FOR_KMEANS {
        rank_by_frequency(&pixels)
    } else {
        cluster(&pixels)
    };

    let mut names: Vec<String> = Vec::new();
    for (r, g, b) in ranked {
        let name = coarse_color_name(r, g, b);
        if !names.iter().any(|n| n == name) {
            names.push(name.to_string());
        }
    }
    names.truncate(K);
    Ok(names)
}

fn rank_by_frequency(pixels: &[[u8; 3]]) -> Vec<(u8, u8, u8)> {
    let mut counts: HashMap<[u8; 3], usize> = HashMap::new();
    for p in pixels {
        *counts.entry(*p).or_insert(0) += 1;
    }
    let mut ranked: Vec<([u8; 3], usize)> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
    ranked.into_iter().map(|([r, g, b], _)| (r, g, b)).collect()
}

/// k-means over Lab pixels; centroids ordered by cluster size
fn cluster(pixels: &[[u8; 3]]) -> Vec<(u8, u8, u8)> {
    let lab: Vec<Lab> = pixels
        .par_iter()
        .map(|p| {
            let rgb = Srgb::new(p[0] as f32 / 255.0, p[1] as f32 / 255.0, p[2] as f32 / 255.0);
            rgb.into_color()
        })
        .collect();

    let result = get_kmeans_hamerly(K, MAX_ITERATIONS, CONVERGENCE_THRESHOLD, false, &lab, 0);

    let mut sizes = vec![0usize; result.centroids.len()];
    for &idx in &result.indices {
        if let Some(size) = sizes.get_mut(idx as usize) {
            *size += 1;
        }
    }

    let mut order: Vec<usize> = (0..result.centroids.len()).collect();
    order.sort_by(|a, b| sizes[*b].cmp(&sizes[*a]));

    order
        .into_iter()
        .filter(|&i| sizes[i] > 0)
        .map(|i| {
            let rgb: Srgb = result.centroids[i].into_color();
            (
                (rgb.red * 255.0) as u8,
                (rgb.green * 255.0) as u8,
                (rgb.blue * 255.0) as u8,
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn two_tone(width: u32, height: u32) -> RgbImage {
        RgbImage::from_fn(width, height, |x, y| {
            if x < width / 2 {
                Rgb([200 + (x % 30) as u8, 20 + (y % 10) as u8, 20])
            } else {
                Rgb([20, 60 + (y % 10) as u8, 200 + (x % 30) as u8])
            }
        })
    }

    #[test]
    fn test_measure_full_resolution() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("full.png");
        two_tone(160, 90).save(&path).unwrap();

        let meta = measure(&path, true).unwrap();
        assert_eq!((meta.width, meta.height), (160, 90));
        assert!(meta.file_size.unwrap_or(0) > 0);
        assert!(meta.colors.contains(&"red".to_string()));
        assert!(meta.colors.contains(&"blue".to_string()));
        assert!(meta.colors.len() <= K);
    }

    #[test]
    fn test_thumbnail_reports_colors_only() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("thumb.png");
        two_tone(64, 36).save(&path).unwrap();

        let meta = measure(&path, false).unwrap();
        assert_eq!((meta.width, meta.height), (0, 0));
        assert_eq!(meta.file_size, None);
        assert!(!meta.colors.is_empty());
    }

    #[test]
    fn test_uniform_image() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("flat.png");
        RgbImage::from_pixel(40, 40, Rgb([0, 102, 204])).save(&path).unwrap();
        assert_eq!(dominant_colors(&path).unwrap(), vec!["blue"]);
    }

    #[test]
    fn test_unreadable_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.jpg");
        std::fs::write(&path, b"not an image").unwrap();
        assert!(measure(&path, true).is_err());
    }
}
