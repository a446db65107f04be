use image::RgbaImage;
use log::debug;
use palette::Srgb;

use crate::error::{PosterizeError, Result};

/// Color every background pixel carries once alpha has been stripped.
pub const BACKGROUND: Srgb<u8> = Srgb::new(0, 0, 0);

/// An RGB image with an explicit per-pixel foreground flag.
///
/// Pixels are stored row-major. Background pixels always hold [`BACKGROUND`],
/// and any pixel equal to [`BACKGROUND`] is background: a pure black pixel
/// coming out of segmentation cannot be told apart from the matte.
#[derive(Clone, Debug, PartialEq)]
pub struct ForegroundImage {
    width: u32,
    height: u32,
    pixels: Vec<Srgb<u8>>,
    foreground: Vec<bool>,
}

/// The flattened pixel sequence of a [`ForegroundImage`] plus the subset that
/// takes part in clustering.
#[derive(Debug)]
pub struct PixelSample<'a> {
    pub all: &'a [Srgb<u8>],
    pub foreground: Vec<Srgb<u8>>,
}

impl ForegroundImage {
    /// Build from row-major RGB triples.
    pub fn from_pixels(width: u32, height: u32, pixels: Vec<Srgb<u8>>) -> Result<Self> {
        if pixels.len() != width as usize * height as usize {
            return Err(PosterizeError::DimensionMismatch {
                len: pixels.len(),
                width,
                height,
            });
        }
        let foreground = pixels.iter().map(|&p| p != BACKGROUND).collect();
        Ok(Self {
            width,
            height,
            pixels,
            foreground,
        })
    }

    /// Strip alpha from a segmented image. Fully transparent pixels become background.
    pub fn from_rgba(image: &RgbaImage) -> Self {
        let (width, height) = image.dimensions();
        let pixels = image
            .pixels()
            .map(|p| {
                let [r, g, b, a] = p.0;
                if a == 0 { BACKGROUND } else { Srgb::new(r, g, b) }
            })
            .collect::<Vec<_>>();
        let foreground = pixels.iter().map(|&p| p != BACKGROUND).collect();
        Self {
            width,
            height,
            pixels,
            foreground,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixels(&self) -> &[Srgb<u8>] {
        &self.pixels
    }

    pub fn is_foreground(&self, index: usize) -> bool {
        self.foreground[index]
    }

    pub fn foreground_mask(&self) -> &[bool] {
        &self.foreground
    }

    /// Split the image into the full pixel sequence and the foreground subset.
    ///
    /// Fails with [`PosterizeError::EmptyForeground`] when no pixel survives
    /// the background filter.
    pub fn sample(&self) -> Result<PixelSample<'_>> {
        let foreground: Vec<Srgb<u8>> = self
            .pixels
            .iter()
            .zip(&self.foreground)
            .filter(|&(_, &fg)| fg)
            .map(|(&p, _)| p)
            .collect();

        if foreground.is_empty() {
            return Err(PosterizeError::EmptyForeground);
        }

        debug!(
            "sampled {} foreground pixels out of {}",
            foreground.len(),
            self.pixels.len()
        );

        Ok(PixelSample {
            all: &self.pixels,
            foreground,
        })
    }
}
