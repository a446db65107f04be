use image::RgbaImage;
use image::imageops::FilterType;
use log::info;
use palette::Srgb;

use crate::cluster::{ClusterOptions, Clustering, cluster};
use crate::error::Result;
use crate::mask::{ChannelMask, channel_masks};
use crate::reconstruct::{QuantizedImage, reconstruct};
use crate::segment::{AlphaMatte, Segmenter, extract_foreground};

/// Knobs for a single posterize run.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PosterizeConfig {
    /// Palette size K.
    pub colors: usize,
    /// Resize factor applied after background removal.
    pub scale: f32,
    pub filter: FilterType,
    pub seed: u64,
    pub max_iter: usize,
    pub runs: u32,
}

impl Default for PosterizeConfig {
    fn default() -> Self {
        let cluster = ClusterOptions::default();
        Self {
            colors: cluster.colors,
            scale: 1.0,
            filter: FilterType::Nearest,
            seed: cluster.seed,
            max_iter: cluster.max_iter,
            runs: cluster.runs,
        }
    }
}

impl PosterizeConfig {
    pub fn with_colors(mut self, colors: usize) -> Self {
        self.colors = colors;
        self
    }

    pub fn with_scale(mut self, scale: f32) -> Self {
        self.scale = scale;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    fn cluster_options(&self) -> ClusterOptions {
        ClusterOptions {
            colors: self.colors,
            max_iter: self.max_iter,
            runs: self.runs,
            seed: self.seed,
        }
    }
}

/// Result of a run: the quantized image and one mask per palette color.
#[derive(Clone, Debug)]
pub struct Posterized {
    quantized: QuantizedImage,
    masks: Vec<ChannelMask>,
    clustering: Clustering,
}

impl Posterized {
    pub fn quantized(&self) -> &QuantizedImage {
        &self.quantized
    }

    pub fn masks(&self) -> &[ChannelMask] {
        &self.masks
    }

    pub fn clustering(&self) -> &Clustering {
        &self.clustering
    }

    pub fn palette(&self) -> &[Srgb<u8>] {
        self.quantized.palette()
    }

    /// Palette as `RRGGBB` hex strings.
    pub fn palette_hex(&self) -> Vec<String> {
        self.palette()
            .iter()
            .map(|c| format!("{:02X}{:02X}{:02X}", c.red, c.green, c.blue))
            .collect()
    }
}

/// Segment, sample, cluster, reconstruct and split into masks.
pub fn posterize(
    image: RgbaImage,
    segmenter: &dyn Segmenter,
    config: &PosterizeConfig,
) -> Result<Posterized> {
    let fg = extract_foreground(image, segmenter, config.scale, config.filter)?;
    let sample = fg.sample()?;
    let clustering = cluster(&sample, &config.cluster_options())?;
    let quantized = reconstruct(&fg, &clustering);
    let masks = channel_masks(&quantized);

    info!(
        "posterized {}x{} image to {} colors",
        quantized.width(),
        quantized.height(),
        masks.len()
    );

    Ok(Posterized {
        quantized,
        masks,
        clustering,
    })
}

/// Decode an encoded image and posterize it, using its alpha channel as the matte.
pub fn posterize_bytes(input: &[u8], config: &PosterizeConfig) -> Result<Posterized> {
    let img = image::load_from_memory(input)?;
    posterize(img.to_rgba8(), &AlphaMatte, config)
}
