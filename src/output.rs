use std::fs;
use std::path::{Path, PathBuf};

use image::ImageFormat;
use log::{info, warn};

use crate::error::{PosterizeError, Result};
use crate::mask::ChannelMask;
use crate::pipeline::Posterized;

/// Where the artifacts of one run go.
///
/// The quantized image defaults to `{stem}_processed_{K}.{ext}` next to the
/// input; masks go to `{stem}_bitmaps/` next to the quantized image.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutputPlan {
    stem: String,
    quantized: PathBuf,
    mask_dir: PathBuf,
}

/// Paths actually written by [`OutputPlan::write`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WrittenArtifacts {
    pub quantized: PathBuf,
    pub masks: Vec<PathBuf>,
}

impl OutputPlan {
    pub fn new(input: &Path, colors: usize, explicit_output: Option<&Path>) -> Self {
        let stem = input.file_stem().unwrap_or_default().to_string_lossy().into_owned();
        let quantized = match explicit_output {
            Some(path) => path.to_path_buf(),
            None => {
                let ext = input
                    .extension()
                    .map(|e| e.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "png".to_owned());
                input.with_file_name(format!("{stem}_processed_{colors}.{ext}"))
            }
        };
        let mask_dir = quantized
            .parent()
            .unwrap_or_else(|| Path::new(""))
            .join(format!("{stem}_bitmaps"));

        Self {
            stem,
            quantized,
            mask_dir,
        }
    }

    pub fn quantized_path(&self) -> &Path {
        &self.quantized
    }

    pub fn mask_dir(&self) -> &Path {
        &self.mask_dir
    }

    pub fn mask_path(&self, mask: &ChannelMask) -> PathBuf {
        self.mask_dir
            .join(format!("{}_{}.png", self.stem, mask.channel_name()))
    }

    /// Write the quantized image and every mask, or nothing.
    ///
    /// All images are encoded before the filesystem is touched, then staged
    /// next to their targets and swapped in. If anything fails, files from a
    /// previous run are left untouched and nothing new remains.
    pub fn write(&self, result: &Posterized) -> Result<WrittenArtifacts> {
        let format = ImageFormat::from_path(&self.quantized)
            .map_err(|_| PosterizeError::UnsupportedFormat(self.quantized.clone()))?;
        if !format.writing_enabled() {
            return Err(PosterizeError::UnsupportedFormat(self.quantized.clone()));
        }
        let quantized_bytes = result.quantized().encode(format)?;

        // Masks whose colors round to the same value share a path; the later one wins.
        let mut masks: Vec<(PathBuf, Vec<u8>)> = Vec::with_capacity(result.masks().len());
        for mask in result.masks() {
            let path = self.mask_path(mask);
            let bytes = mask.encode_png()?;
            match masks.iter_mut().find(|(p, _)| *p == path) {
                Some(slot) => {
                    warn!("duplicate palette color, overwriting {}", path.display());
                    slot.1 = bytes;
                }
                None => masks.push((path, bytes)),
            }
        }

        let created_dir = !self.mask_dir.exists();
        fs::create_dir_all(&self.mask_dir)?;

        let files: Vec<(&Path, &[u8])> =
            std::iter::once((self.quantized.as_path(), quantized_bytes.as_slice()))
                .chain(masks.iter().map(|(p, b)| (p.as_path(), b.as_slice())))
                .collect();

        if let Err(err) = commit(&files) {
            if created_dir {
                // Only succeeds when empty, which is the case we want.
                let _ = fs::remove_dir(&self.mask_dir);
            }
            return Err(err);
        }

        info!(
            "wrote {} and {} masks to {}",
            self.quantized.display(),
            masks.len(),
            self.mask_dir.display()
        );

        Ok(WrittenArtifacts {
            quantized: self.quantized.clone(),
            masks: masks.into_iter().map(|(p, _)| p).collect(),
        })
    }
}

/// `dir/.name.suffix` next to `path`.
fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let name = path.file_name().unwrap_or_default().to_string_lossy();
    path.with_file_name(format!(".{name}.{suffix}"))
}

/// Stage every file next to its target, then swap them in.
///
/// Existing targets are moved aside first and put back if any swap fails, so
/// on error the previous contents are left exactly as they were.
fn commit(files: &[(&Path, &[u8])]) -> Result<()> {
    let mut staged = Vec::with_capacity(files.len());
    for &(path, bytes) in files {
        let tmp = sibling(path, "tmp");
        if let Err(e) = fs::write(&tmp, bytes) {
            let _ = fs::remove_file(&tmp);
            discard(&staged);
            return Err(e.into());
        }
        staged.push(tmp);
    }

    // (target, backup of what was there before)
    let mut swapped: Vec<(&Path, Option<PathBuf>)> = Vec::with_capacity(files.len());
    for (i, &(path, _)) in files.iter().enumerate() {
        match swap_in(&staged[i], path) {
            Ok(backup) => swapped.push((path, backup)),
            Err(e) => {
                restore(&swapped);
                discard(&staged[i..]);
                return Err(e);
            }
        }
    }

    for backup in swapped.iter().filter_map(|(_, b)| b.as_ref()) {
        if let Err(e) = fs::remove_file(backup) {
            warn!("could not remove backup {}: {e}", backup.display());
        }
    }
    Ok(())
}

fn swap_in(tmp: &Path, target: &Path) -> Result<Option<PathBuf>> {
    let backup = if target.is_file() {
        let backup = sibling(target, "bak");
        fs::rename(target, &backup)?;
        Some(backup)
    } else {
        None
    };
    if let Err(e) = fs::rename(tmp, target) {
        if let Some(backup) = &backup {
            let _ = fs::rename(backup, target);
        }
        return Err(e.into());
    }
    Ok(backup)
}

fn restore(swapped: &[(&Path, Option<PathBuf>)]) {
    for (target, backup) in swapped.iter().rev() {
        let outcome = match backup {
            Some(backup) => fs::rename(backup, target),
            None => fs::remove_file(target),
        };
        if let Err(e) = outcome {
            warn!("could not restore {}: {e}", target.display());
        }
    }
}

fn discard(staged: &[PathBuf]) {
    for tmp in staged {
        if let Err(e) = fs::remove_file(tmp) {
            warn!("could not remove staged file {}: {e}", tmp.display());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{PosterizeConfig, posterize};
    use crate::segment::AlphaMatte;
    use image::{Rgba, RgbaImage};

    fn scratch(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "posterize-stencils-{name}-{}",
            std::process::id()
        ));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn two_color_result() -> Posterized {
        let mut img = RgbaImage::from_pixel(2, 2, Rgba([0, 0, 0, 0]));
        img.put_pixel(0, 0, Rgba([10, 10, 10, 255]));
        img.put_pixel(1, 0, Rgba([10, 10, 10, 255]));
        img.put_pixel(0, 1, Rgba([200, 200, 200, 255]));
        posterize(img, &AlphaMatte, &PosterizeConfig::default().with_colors(2)).unwrap()
    }

    fn with_colors(first: [u8; 3], second: [u8; 3], colors: usize) -> Posterized {
        let mut img = RgbaImage::from_pixel(2, 2, Rgba([0, 0, 0, 0]));
        img.put_pixel(0, 0, Rgba([first[0], first[1], first[2], 255]));
        img.put_pixel(1, 0, Rgba([first[0], first[1], first[2], 255]));
        img.put_pixel(0, 1, Rgba([second[0], second[1], second[2], 255]));
        posterize(img, &AlphaMatte, &PosterizeConfig::default().with_colors(colors)).unwrap()
    }

    fn leftovers(dir: &Path) -> Vec<String> {
        fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .filter(|n| n.ends_with(".tmp") || n.ends_with(".bak"))
            .collect()
    }

    #[test]
    fn derives_default_names() {
        let plan = OutputPlan::new(Path::new("art/koala.jpg"), 3, None);
        assert_eq!(plan.quantized_path(), Path::new("art/koala_processed_3.jpg"));
        assert_eq!(plan.mask_dir(), Path::new("art/koala_bitmaps"));
    }

    #[test]
    fn explicit_output_moves_masks_alongside() {
        let plan = OutputPlan::new(Path::new("art/koala.jpg"), 3, Some(Path::new("out/poster.png")));
        assert_eq!(plan.quantized_path(), Path::new("out/poster.png"));
        assert_eq!(plan.mask_dir(), Path::new("out/koala_bitmaps"));
    }

    #[test]
    fn writes_quantized_image_and_masks() {
        let dir = scratch("write");
        let plan = OutputPlan::new(&dir.join("koala.png"), 2, None);
        let written = plan.write(&two_color_result()).unwrap();

        assert!(written.quantized.exists());
        assert_eq!(written.masks.len(), 2);
        let mut names: Vec<String> = written
            .masks
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        names.sort();
        assert_eq!(
            names,
            vec![
                "koala_channel_10_10_10.png".to_string(),
                "koala_channel_200_200_200.png".to_string()
            ]
        );

        let mask = image::open(&written.masks[0]).unwrap().to_luma8();
        assert_eq!(mask.dimensions(), (2, 2));
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn failed_write_leaves_nothing_behind() {
        let dir = scratch("rollback");
        let plan = OutputPlan::new(&dir.join("koala.png"), 2, None);
        // A directory squatting on a mask path makes that write fail.
        fs::create_dir_all(plan.mask_dir().join("koala_channel_200_200_200.png")).unwrap();

        assert!(plan.write(&two_color_result()).is_err());
        assert!(!plan.quantized_path().exists());
        assert!(!plan.mask_dir().join("koala_channel_10_10_10.png").exists());
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn unknown_extension_is_rejected_before_writing() {
        let dir = scratch("format");
        let plan = OutputPlan::new(&dir.join("koala.png"), 2, Some(dir.join("koala.nope").as_path()));
        let err = plan.write(&two_color_result()).unwrap_err();
        assert!(matches!(err, PosterizeError::UnsupportedFormat(_)));
        assert!(!plan.mask_dir().exists());
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn failed_rerun_keeps_previous_output() {
        let dir = scratch("rerun");
        let plan = OutputPlan::new(&dir.join("koala.png"), 2, None);
        plan.write(&with_colors([10, 10, 10], [200, 200, 200], 2)).unwrap();

        let quantized_before = fs::read(plan.quantized_path()).unwrap();
        let mask_10 = plan.mask_dir().join("koala_channel_10_10_10.png");
        let mask_200 = plan.mask_dir().join("koala_channel_200_200_200.png");
        let mask_10_before = fs::read(&mask_10).unwrap();
        let mask_200_before = fs::read(&mask_200).unwrap();

        // The second run replaces the quantized image and mask 10 before it
        // reaches the blocked mask 100, so both must be put back.
        fs::create_dir_all(plan.mask_dir().join("koala_channel_100_100_100.png")).unwrap();
        assert!(plan.write(&with_colors([10, 10, 10], [100, 100, 100], 2)).is_err());

        assert_eq!(fs::read(plan.quantized_path()).unwrap(), quantized_before);
        assert_eq!(fs::read(&mask_10).unwrap(), mask_10_before);
        assert_eq!(fs::read(&mask_200).unwrap(), mask_200_before);
        assert!(leftovers(&dir).is_empty());
        assert!(leftovers(plan.mask_dir()).is_empty());
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn successful_rerun_replaces_files_without_leftovers() {
        let dir = scratch("replace");
        let plan = OutputPlan::new(&dir.join("koala.png"), 2, None);
        plan.write(&with_colors([10, 10, 10], [200, 200, 200], 2)).unwrap();
        let before = fs::read(plan.quantized_path()).unwrap();

        plan.write(&with_colors([10, 10, 10], [100, 100, 100], 2)).unwrap();

        assert_ne!(fs::read(plan.quantized_path()).unwrap(), before);
        assert!(plan.mask_dir().join("koala_channel_100_100_100.png").exists());
        assert!(leftovers(&dir).is_empty());
        assert!(leftovers(plan.mask_dir()).is_empty());
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn repeated_palette_colors_share_one_file() {
        let dir = scratch("collide");
        let plan = OutputPlan::new(&dir.join("koala.png"), 4, None);
        let result = with_colors([10, 10, 10], [200, 200, 200], 4);
        assert_eq!(result.masks().len(), 4);

        let written = plan.write(&result).unwrap();

        let mut unique = written.masks.clone();
        unique.sort();
        unique.dedup();
        assert_eq!(unique.len(), written.masks.len());
        assert_eq!(written.masks.len(), 2);

        let mut on_disk: Vec<PathBuf> = fs::read_dir(plan.mask_dir())
            .unwrap()
            .map(|e| e.unwrap().path())
            .collect();
        on_disk.sort();
        assert_eq!(on_disk, unique);

        for mask in result.masks() {
            let img = image::open(plan.mask_path(mask)).unwrap().to_luma8();
            assert_eq!(img, mask.to_image());
        }
        fs::remove_dir_all(&dir).unwrap();
    }
}
