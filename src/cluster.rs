use std::collections::HashSet;

use kmeans_colors::{Kmeans, get_kmeans};
use log::{debug, warn};
use palette::Srgb;

use crate::error::{PosterizeError, Result};
use crate::foreground::PixelSample;

/// Assignments are stored as `u8`, which caps the palette size.
pub const MAX_COLORS: usize = 256;

// Centroid movement (0..1 RGB, squared) below which Lloyd iterations stop.
const CONVERGENCE: f32 = 1e-6;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ClusterOptions {
    pub colors: usize,
    pub max_iter: usize,
    /// Independent k-means restarts; the lowest-score run wins.
    pub runs: u32,
    pub seed: u64,
}

impl Default for ClusterOptions {
    fn default() -> Self {
        Self {
            colors: 3,
            max_iter: 300,
            runs: 1,
            seed: 42,
        }
    }
}

/// Cluster centers plus the nearest-center index of every pixel of the image,
/// background included.
#[derive(Clone, Debug)]
pub struct Clustering {
    pub centers: Vec<Srgb<f32>>,
    pub assignments: Vec<u8>,
}

impl Clustering {
    /// Centers rounded to 8-bit, in center order.
    pub fn palette(&self) -> Vec<Srgb<u8>> {
        self.centers.iter().map(|c| c.into_format::<u8>()).collect()
    }
}

/// Run k-means over the foreground pixels, then assign every pixel of the
/// full sequence to its nearest center.
pub fn cluster(sample: &PixelSample<'_>, options: &ClusterOptions) -> Result<Clustering> {
    let k = options.colors;
    if k == 0 || k > MAX_COLORS {
        return Err(PosterizeError::InvalidColorCount(k));
    }
    if sample.foreground.is_empty() {
        return Err(PosterizeError::EmptyForeground);
    }

    let centers = fit_centers(&sample.foreground, options);
    let assignments = assign(sample.all, &centers);

    Ok(Clustering {
        centers,
        assignments,
    })
}

fn fit_centers(foreground: &[Srgb<u8>], options: &ClusterOptions) -> Vec<Srgb<f32>> {
    let k = options.colors;

    // With no more distinct colors than clusters the distinct colors are
    // already an exact palette; pad by repetition to keep K centers.
    let distinct = distinct_colors(foreground);
    if distinct.len() <= k {
        if distinct.len() < k {
            warn!(
                "requested {k} colors but the foreground only has {} distinct colors; palette will contain duplicates",
                distinct.len()
            );
        }
        return distinct
            .iter()
            .cycle()
            .take(k)
            .map(|c| c.into_format::<f32>())
            .collect();
    }

    let buf: Vec<Srgb<f32>> = foreground.iter().map(|c| c.into_format::<f32>()).collect();

    let mut best = Kmeans::<Srgb>::new();
    for run in 0..options.runs.max(1) {
        let seed = options.seed.wrapping_add(u64::from(run));
        let result = get_kmeans(k, options.max_iter, CONVERGENCE, false, &buf, seed);
        debug!("k-means run {run} (seed {seed}) score {}", result.score);
        if result.score < best.score {
            best = result;
        }
    }
    best.centroids
}

/// Distinct colors in order of first appearance.
fn distinct_colors(pixels: &[Srgb<u8>]) -> Vec<Srgb<u8>> {
    let mut seen = HashSet::new();
    pixels
        .iter()
        .copied()
        .filter(|c| seen.insert((c.red, c.green, c.blue)))
        .collect()
}

/// Nearest center by squared Euclidean distance in RGB. Ties go to the lower index.
fn assign(pixels: &[Srgb<u8>], centers: &[Srgb<f32>]) -> Vec<u8> {
    pixels
        .iter()
        .map(|p| {
            let p = p.into_format::<f32>();
            let mut best_idx = 0;
            let mut best_dist = f32::INFINITY;
            for (idx, c) in centers.iter().enumerate() {
                let dr = p.red - c.red;
                let dg = p.green - c.green;
                let db = p.blue - c.blue;
                let dist = dr * dr + dg * dg + db * db;
                if dist < best_dist {
                    best_dist = dist;
                    best_idx = idx;
                }
            }
            best_idx as u8
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foreground::ForegroundImage;

    fn three_blobs() -> ForegroundImage {
        let bases = [(240u8, 20u8, 20u8), (20, 200, 30), (30, 40, 220)];
        let mut pixels = Vec::new();
        for (i, &(r, g, b)) in bases.iter().enumerate() {
            for j in 0..20u8 {
                let jitter = j % 3;
                pixels.push(Srgb::new(r - jitter, g + jitter, b - jitter));
            }
            // one background pixel per blob
            if i < 2 {
                pixels.push(Srgb::new(0, 0, 0));
            }
        }
        // 3 * 20 + 2 = 62 pixels
        ForegroundImage::from_pixels(31, 2, pixels).unwrap()
    }

    #[test]
    fn finds_well_separated_colors() {
        let img = three_blobs();
        let sample = img.sample().unwrap();
        let options = ClusterOptions::default();
        let clustering = cluster(&sample, &options).unwrap();

        assert_eq!(clustering.centers.len(), 3);
        assert_eq!(clustering.assignments.len(), img.pixels().len());

        let palette = clustering.palette();
        for target in [(239, 21, 19), (19, 201, 29), (29, 41, 219)] {
            let hit = palette.iter().any(|c| {
                (i32::from(c.red) - target.0).abs() <= 2
                    && (i32::from(c.green) - target.1).abs() <= 2
                    && (i32::from(c.blue) - target.2).abs() <= 2
            });
            assert!(hit, "no center near {target:?} in {palette:?}");
        }
    }

    #[test]
    fn same_seed_same_centers() {
        let img = three_blobs();
        let sample = img.sample().unwrap();
        let options = ClusterOptions {
            runs: 3,
            ..ClusterOptions::default()
        };
        let a = cluster(&sample, &options).unwrap();
        let b = cluster(&sample, &options).unwrap();
        assert_eq!(a.palette(), b.palette());
        assert_eq!(a.assignments, b.assignments);
    }

    #[test]
    fn more_clusters_than_colors_pads_palette() {
        let pixels = vec![
            Srgb::new(10, 10, 10),
            Srgb::new(200, 200, 200),
            Srgb::new(10, 10, 10),
            Srgb::new(0, 0, 0),
        ];
        let img = ForegroundImage::from_pixels(2, 2, pixels).unwrap();
        let sample = img.sample().unwrap();
        let options = ClusterOptions {
            colors: 5,
            ..ClusterOptions::default()
        };
        let clustering = cluster(&sample, &options).unwrap();

        let palette = clustering.palette();
        assert_eq!(palette.len(), 5);
        assert!(palette.contains(&Srgb::new(10, 10, 10)));
        assert!(palette.contains(&Srgb::new(200, 200, 200)));
        assert_eq!(palette[clustering.assignments[0] as usize], Srgb::new(10, 10, 10));
        assert_eq!(palette[clustering.assignments[1] as usize], Srgb::new(200, 200, 200));
    }

    #[test]
    fn background_pixels_are_assigned_too() {
        let img = three_blobs();
        let sample = img.sample().unwrap();
        let clustering = cluster(&sample, &ClusterOptions::default()).unwrap();
        assert!(clustering.assignments.iter().all(|&a| (a as usize) < 3));
    }

    #[test]
    fn rejects_zero_and_oversized_color_counts() {
        let img = three_blobs();
        let sample = img.sample().unwrap();
        for colors in [0, MAX_COLORS + 1] {
            let options = ClusterOptions {
                colors,
                ..ClusterOptions::default()
            };
            assert!(matches!(
                cluster(&sample, &options),
                Err(PosterizeError::InvalidColorCount(c)) if c == colors
            ));
        }
    }
}
