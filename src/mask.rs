use std::io::Cursor;

use image::{GrayImage, ImageFormat, Luma};
use palette::Srgb;

use crate::error::Result;
use crate::reconstruct::QuantizedImage;

const ON: Luma<u8> = Luma([255]);
const OFF: Luma<u8> = Luma([0]);

/// Binary stencil of the pixels that carry one palette color.
#[derive(Clone, Debug, PartialEq)]
pub struct ChannelMask {
    color: Srgb<u8>,
    width: u32,
    height: u32,
    bits: Vec<bool>,
}

impl ChannelMask {
    pub fn color(&self) -> Srgb<u8> {
        self.color
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn bits(&self) -> &[bool] {
        &self.bits
    }

    pub fn is_on(&self, x: u32, y: u32) -> bool {
        self.bits[(y * self.width + x) as usize]
    }

    pub fn count_on(&self) -> usize {
        self.bits.iter().filter(|&&b| b).count()
    }

    /// File stem fragment encoding the channel values, e.g. `channel_10_10_10`.
    pub fn channel_name(&self) -> String {
        format!(
            "channel_{}_{}_{}",
            self.color.red, self.color.green, self.color.blue
        )
    }

    /// White where the mask is on, black elsewhere.
    pub fn to_image(&self) -> GrayImage {
        let mut img = GrayImage::new(self.width, self.height);
        for (pixel, &on) in img.pixels_mut().zip(&self.bits) {
            *pixel = if on { ON } else { OFF };
        }
        img
    }

    pub fn encode_png(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        self.to_image()
            .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)?;
        Ok(buf)
    }
}

/// One mask per palette entry, in palette order. Entries that share a rounded
/// color yield identical masks.
pub fn channel_masks(quantized: &QuantizedImage) -> Vec<ChannelMask> {
    quantized
        .palette()
        .iter()
        .map(|&color| ChannelMask {
            color,
            width: quantized.width(),
            height: quantized.height(),
            bits: quantized.pixels().iter().map(|&p| p == color).collect(),
        })
        .collect()
}
