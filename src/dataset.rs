use image::{imageops::FilterType, GrayImage, RgbImage};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::{BowErr, BowResult, Label};

/// Images of a folder-per-class dataset.
///
/// `gray`, `color` and `labels` are parallel: `gray[i]` is the resized
/// grayscale version of `color[i]`, whose class is `labels[i]`.
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    pub gray: Vec<GrayImage>,
    pub color: Vec<RgbImage>,
    pub labels: Vec<Label>,
}

impl Dataset {
    /// Load the classes at `class_indices` of the alphabetically sorted class
    /// folders under `path`. Grayscale images are resized to `size x size`,
    /// color images are kept at their original size.
    pub fn load<P: AsRef<Path>>(path: P, class_indices: &[usize], size: u32) -> BowResult<Self> {
        let folders = sorted_entries(path.as_ref(), true)?;
        let mut dataset = Self::default();
        for &idx in class_indices {
            let folder = folders.get(idx).ok_or_else(|| {
                BowErr::Configuration(format!(
                    "class index {} out of range, {} class folders in {:?}",
                    idx,
                    folders.len(),
                    path.as_ref()
                ))
            })?;
            let label: Label = folder
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let files = sorted_entries(folder, false)?;
            info!("Loading {} images of class {}", files.len(), label);
            for file in files {
                let (gray, color) = load_image(&file, size)?;
                dataset.gray.push(gray);
                dataset.color.push(color);
                dataset.labels.push(label.clone());
            }
        }
        Ok(dataset)
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

/// Decode an image file into a `size x size` grayscale image (bilinear
/// resize) and the unscaled color image.
pub fn load_image<P: AsRef<Path>>(path: P, size: u32) -> BowResult<(GrayImage, RgbImage)> {
    debug!("Loading {:?}", path.as_ref());
    let img = image::open(path)?;
    let gray = image::imageops::resize(&img.to_luma8(), size, size, FilterType::Triangle);
    Ok((gray, img.to_rgb8()))
}

/// Visible directories (`dirs`) or files of `dir`, sorted by name.
fn sorted_entries(dir: &Path, dirs: bool) -> BowResult<Vec<PathBuf>> {
    let mut entries = Vec::new();
    for entry in dir.read_dir()? {
        let path = entry?.path();
        let hidden = path
            .file_name()
            .map_or(true, |n| n.to_string_lossy().starts_with('.'));
        if !hidden && path.is_dir() == dirs {
            entries.push(path);
        }
    }
    entries.sort();
    Ok(entries)
}
