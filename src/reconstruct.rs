use std::io::Cursor;

use image::{ImageFormat, RgbImage};
use palette::Srgb;

use crate::cluster::Clustering;
use crate::error::Result;
use crate::foreground::{BACKGROUND, ForegroundImage};

/// The posterized image: every foreground pixel replaced by its palette color,
/// every background pixel left at [`BACKGROUND`].
#[derive(Clone, Debug, PartialEq)]
pub struct QuantizedImage {
    width: u32,
    height: u32,
    pixels: Vec<Srgb<u8>>,
    palette: Vec<Srgb<u8>>,
}

impl QuantizedImage {
    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixels(&self) -> &[Srgb<u8>] {
        &self.pixels
    }

    pub fn pixel(&self, x: u32, y: u32) -> Srgb<u8> {
        self.pixels[(y * self.width + x) as usize]
    }

    /// Rounded cluster centers, one per cluster.
    pub fn palette(&self) -> &[Srgb<u8>] {
        &self.palette
    }

    pub fn to_rgb_image(&self) -> RgbImage {
        let raw = self
            .pixels
            .iter()
            .flat_map(|c| [c.red, c.green, c.blue])
            .collect::<Vec<u8>>();
        RgbImage::from_raw(self.width, self.height, raw)
            .expect("pixel count always matches the image dimensions")
    }

    pub fn encode(&self, format: ImageFormat) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        self.to_rgb_image()
            .write_to(&mut Cursor::new(&mut buf), format)?;
        Ok(buf)
    }

    pub fn encode_png(&self) -> Result<Vec<u8>> {
        self.encode(ImageFormat::Png)
    }
}

/// Recolor every pixel with its assigned center, then force the background back to black.
pub fn reconstruct(source: &ForegroundImage, clustering: &Clustering) -> QuantizedImage {
    let palette = clustering.palette();

    let pixels = clustering
        .assignments
        .iter()
        .zip(source.foreground_mask())
        .map(|(&idx, &fg)| if fg { palette[idx as usize] } else { BACKGROUND })
        .collect::<Vec<_>>();

    QuantizedImage {
        width: source.width(),
        height: source.height(),
        pixels,
        palette,
    }
}
