use image::RgbaImage;
use image::imageops::{self, FilterType};
use log::debug;

use crate::error::{PosterizeError, Result};
use crate::foreground::ForegroundImage;

/// Background removal. Implementations return an image of the same size in
/// which background pixels are fully transparent (or black).
pub trait Segmenter {
    fn remove_background(&self, image: RgbaImage) -> Result<RgbaImage>;
}

/// Uses the input's own alpha channel as the matte.
#[derive(Clone, Copy, Debug, Default)]
pub struct AlphaMatte;

impl Segmenter for AlphaMatte {
    fn remove_background(&self, image: RgbaImage) -> Result<RgbaImage> {
        Ok(image)
    }
}

/// Runs an external matting program that reads a PNG on stdin and writes the
/// cut-out PNG to stdout.
#[cfg(not(target_arch = "wasm32"))]
#[derive(Clone, Debug)]
pub struct CommandSegmenter {
    program: String,
    args: Vec<String>,
}

#[cfg(not(target_arch = "wasm32"))]
impl CommandSegmenter {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Split a shell-like command line on whitespace. Quoting is not supported.
    pub fn from_command_line(command: &str) -> Result<Self> {
        let mut parts = command.split_whitespace().map(str::to_owned);
        let program = parts
            .next()
            .ok_or_else(|| PosterizeError::Segmentation("empty segmenter command".into()))?;
        Ok(Self::new(program, parts.collect()))
    }
}

#[cfg(not(target_arch = "wasm32"))]
impl Segmenter for CommandSegmenter {
    fn remove_background(&self, image: RgbaImage) -> Result<RgbaImage> {
        use std::io::{Cursor, Write};
        use std::process::{Command, Stdio};

        let mut png = Vec::new();
        image.write_to(&mut Cursor::new(&mut png), image::ImageFormat::Png)?;

        debug!("running segmenter {} {:?}", self.program, self.args);
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        // Feed stdin from another thread so a child that streams its output
        // cannot fill the stdout pipe while we are still writing.
        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| PosterizeError::Segmentation("segmenter stdin unavailable".into()))?;
        let feeder = std::thread::spawn(move || stdin.write_all(&png));

        let output = child.wait_with_output()?;
        let fed = feeder
            .join()
            .map_err(|_| PosterizeError::Segmentation("stdin writer panicked".into()))?;

        // A failing program may close stdin early; its exit status is the better error.
        if !output.status.success() {
            return Err(PosterizeError::Segmentation(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        fed?;

        Ok(image::load_from_memory(&output.stdout)?.to_rgba8())
    }
}

/// Segment the decoded image, check the collaborator kept its geometry, then
/// apply the resize scalar.
pub fn extract_foreground(
    image: RgbaImage,
    segmenter: &dyn Segmenter,
    scale: f32,
    filter: FilterType,
) -> Result<ForegroundImage> {
    let expected = image.dimensions();
    let target = scaled_dimensions(expected, scale)?;

    let cut = segmenter.remove_background(image)?;
    let actual = cut.dimensions();
    if actual != expected {
        return Err(PosterizeError::SegmentationMismatch { expected, actual });
    }

    let cut = if target == actual {
        cut
    } else {
        debug!(
            "resizing {}x{} -> {}x{} ({filter:?})",
            actual.0, actual.1, target.0, target.1
        );
        imageops::resize(&cut, target.0, target.1, filter)
    };

    Ok(ForegroundImage::from_rgba(&cut))
}

/// Largest resized image accepted, in pixels (16384 x 16384).
pub const MAX_SCALED_PIXELS: u64 = 1 << 28;

/// `floor(side * scale)` for both sides. Results that are empty, overflow
/// `u32`, or exceed [`MAX_SCALED_PIXELS`] are rejected.
pub fn scaled_dimensions((w, h): (u32, u32), scale: f32) -> Result<(u32, u32)> {
    if !scale.is_finite() || scale <= 0.0 {
        return Err(PosterizeError::InvalidScale(scale));
    }
    if scale == 1.0 {
        return Ok((w, h));
    }
    let side = |s: u32| {
        let v = (f64::from(s) * f64::from(scale)).floor();
        u32::try_from(v as u64).ok().filter(|&v| v > 0)
    };
    let (Some(out_w), Some(out_h)) = (side(w), side(h)) else {
        return Err(PosterizeError::InvalidScale(scale));
    };
    match u64::from(out_w).checked_mul(u64::from(out_h)) {
        Some(area) if area <= MAX_SCALED_PIXELS => Ok((out_w, out_h)),
        _ => Err(PosterizeError::InvalidScale(scale)),
    }
}
