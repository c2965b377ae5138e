use image::GrayImage;
use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};
use serde::{Deserialize, Serialize};
use std::f32::consts::{PI, SQRT_2};

use crate::{Desc, DESC_LEN};

/// Maximum number of descriptors kept from one image when pooling
/// descriptors for vocabulary construction.
pub const DICT_LIMIT: usize = 500;

/// Spatial cells per descriptor side.
const CELLS: usize = 4;
/// Orientation bins per spatial cell.
const ORI_BINS: usize = 8;
/// Width of one spatial cell in units of the keypoint scale.
const CELL_SCALE: f32 = 3.0;
/// Upper bound for descriptor components after the first normalization.
const CLIP: f32 = 0.2;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
/// Dense sampling parameters.
///
/// `step_size` is the keypoint spacing in both axes, `patch_size` the keypoint
/// diameter in pixels. The descriptor covers 4x4 cells of `1.5 * patch_size`
/// pixels each.
pub struct DenseParams {
    pub step_size: u32,
    pub patch_size: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Which descriptors of an image to return.
pub enum Sampling {
    /// Every grid keypoint, in row-major order.
    Full,
    /// A seeded random subset of at most [`DICT_LIMIT`] descriptors, used when
    /// pooling descriptors for a vocabulary.
    Dictionary { seed: u64 },
}

impl DenseParams {
    pub fn new(step_size: u32, patch_size: u32) -> Self {
        Self {
            step_size,
            patch_size,
        }
    }

    /// Keypoint locations `(x, y)` for an image of the given size, row-major,
    /// starting at the origin.
    pub fn grid(&self, width: u32, height: u32) -> Vec<(u32, u32)> {
        let step = self.step_size.max(1) as usize;
        (0..height)
            .step_by(step)
            .flat_map(|y| (0..width).step_by(step).map(move |x| (x, y)))
            .collect()
    }
}

/// Compute one raw (unnormalized) descriptor per grid keypoint.
pub fn raw_descriptors(img: &GrayImage, params: &DenseParams) -> Vec<Desc> {
    let grads = Gradients::new(img);
    let patch = params.patch_size.max(1) as f32;
    params
        .grid(img.width(), img.height())
        .into_iter()
        .map(|(x, y)| grads.describe_at(x as i64, y as i64, patch))
        .collect()
}

/// Extract normalized descriptors from a grayscale image.
///
/// With [`Sampling::Dictionary`] the descriptors are shuffled with a `StdRng`
/// seeded from `seed` and truncated to [`DICT_LIMIT`] before normalization.
pub fn extract(img: &GrayImage, params: &DenseParams, sampling: Sampling) -> Vec<Desc> {
    let mut descs = raw_descriptors(img, params);
    if let Sampling::Dictionary { seed } = sampling {
        let mut rng = StdRng::seed_from_u64(seed);
        descs.shuffle(&mut rng);
        descs.truncate(DICT_LIMIT);
    }
    descs.iter().map(normalize).collect()
}

/// SIFT style normalization: scale to unit length, clip every component to
/// 0.2 and scale to unit length again. All-zero descriptors are returned as is.
pub fn normalize(desc: &Desc) -> Desc {
    match clipped_unit(desc) {
        None => *desc,
        Some(mut clipped) => {
            let norm = l2(&clipped);
            if norm > 0. {
                clipped.iter_mut().for_each(|v| *v /= norm);
            }
            clipped
        }
    }
}

/// First half of [`normalize`]: unit length, then clipped. `None` for a zero vector.
fn clipped_unit(desc: &Desc) -> Option<Desc> {
    let norm = l2(desc);
    if norm == 0. {
        return None;
    }
    let mut out = *desc;
    out.iter_mut().for_each(|v| *v = (*v / norm).min(CLIP));
    Some(out)
}

#[inline]
/// Euclidean norm.
pub(crate) fn l2(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

/////////////////////                Helpers                 ////////////////////////
/////////////////////////////////////////////////////////////////////////////////////

/// Gradient magnitude and orientation (radians in [0, 2pi)) of every pixel.
/// Border pixels have zero magnitude.
struct Gradients {
    width: usize,
    height: usize,
    mag: Vec<f32>,
    ori: Vec<f32>,
}

impl Gradients {
    fn new(img: &GrayImage) -> Self {
        let (width, height) = (img.width() as usize, img.height() as usize);
        let px = img.as_raw();
        let mut mag = vec![0.; width * height];
        let mut ori = vec![0.; width * height];
        for y in 1..height.saturating_sub(1) {
            for x in 1..width.saturating_sub(1) {
                let i = y * width + x;
                let dx = px[i + 1] as f32 - px[i - 1] as f32;
                // y axis points up, as in SIFT
                let dy = px[i - width] as f32 - px[i + width] as f32;
                mag[i] = (dx * dx + dy * dy).sqrt();
                let mut angle = dy.atan2(dx);
                if angle < 0. {
                    angle += 2. * PI;
                }
                ori[i] = angle;
            }
        }
        Self {
            width,
            height,
            mag,
            ori,
        }
    }

    /// Upright descriptor of the keypoint at `(cx, cy)` with diameter `patch`.
    fn describe_at(&self, cx: i64, cy: i64, patch: f32) -> Desc {
        let d = CELLS as f32;
        let cell = CELL_SCALE * patch * 0.5;
        let max_radius = ((self.width * self.width + self.height * self.height) as f32).sqrt();
        let radius = (cell * SQRT_2 * (d + 1.) * 0.5).round().min(max_radius) as i64;
        // gaussian window with sigma of half the descriptor width
        let exp_scale = -1. / (d * d * 0.5);
        let bins_per_rad = ORI_BINS as f32 / (2. * PI);
        let (w, h) = (self.width as i64, self.height as i64);

        let mut hist = [0.; DESC_LEN];
        for i in -radius..=radius {
            for j in -radius..=radius {
                let r_rot = i as f32 / cell;
                let c_rot = j as f32 / cell;
                let rbin = r_rot + d / 2. - 0.5;
                let cbin = c_rot + d / 2. - 0.5;
                if rbin <= -1. || rbin >= d || cbin <= -1. || cbin >= d {
                    continue;
                }
                let (r, c) = (cy + i, cx + j);
                if r <= 0 || c <= 0 || r >= h - 1 || c >= w - 1 {
                    continue;
                }
                let idx = r as usize * self.width + c as usize;
                let weight = ((r_rot * r_rot + c_rot * c_rot) * exp_scale).exp();
                let obin = self.ori[idx] * bins_per_rad;
                Self::accumulate(&mut hist, rbin, cbin, obin, self.mag[idx] * weight);
            }
        }
        hist
    }

    #[inline]
    /// Trilinear interpolation of one weighted gradient sample into the histogram.
    fn accumulate(hist: &mut Desc, rbin: f32, cbin: f32, obin: f32, value: f32) {
        let (r0, c0, o0) = (rbin.floor(), cbin.floor(), obin.floor());
        let (dr, dc, dor) = (rbin - r0, cbin - c0, obin - o0);
        let (r0, c0, o0) = (r0 as i64, c0 as i64, o0 as usize);
        for (ri, wr) in [(r0, 1. - dr), (r0 + 1, dr)] {
            if ri < 0 || ri >= CELLS as i64 {
                continue;
            }
            for (ci, wc) in [(c0, 1. - dc), (c0 + 1, dc)] {
                if ci < 0 || ci >= CELLS as i64 {
                    continue;
                }
                let base = (ri as usize * CELLS + ci as usize) * ORI_BINS;
                for (oi, wo) in [(o0 % ORI_BINS, 1. - dor), ((o0 + 1) % ORI_BINS, dor)] {
                    hist[base + oi] += value * wr * wc * wo;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;
    use rand::Rng;

    fn noise(size: u32, seed: u64) -> GrayImage {
        let mut rng = StdRng::seed_from_u64(seed);
        GrayImage::from_fn(size, size, |_, _| Luma([rng.gen()]))
    }

    #[test]
    fn grid_is_row_major_from_origin() {
        let grid = DenseParams::new(7, 8).grid(75, 75);
        assert_eq!(grid.len(), 11 * 11);
        assert_eq!(grid[0], (0, 0));
        assert_eq!(grid[1], (7, 0));
        assert_eq!(grid[11], (0, 7));
        assert_eq!(*grid.last().unwrap(), (70, 70));
    }

    #[test]
    fn image_smaller_than_step_gives_one_descriptor() {
        let descs = extract(&noise(5, 1), &DenseParams::new(10, 8), Sampling::Full);
        assert_eq!(descs.len(), 1);
    }

    #[test]
    fn empty_image_gives_no_descriptors() {
        let img = GrayImage::new(0, 0);
        assert!(extract(&img, &DenseParams::new(4, 8), Sampling::Full).is_empty());
    }

    #[test]
    fn dictionary_sampling_is_capped_and_seeded() {
        let img = noise(100, 2);
        let params = DenseParams::new(4, 8);
        let full = extract(&img, &params, Sampling::Full);
        assert_eq!(full.len(), 25 * 25);

        let a = extract(&img, &params, Sampling::Dictionary { seed: 0 });
        let b = extract(&img, &params, Sampling::Dictionary { seed: 0 });
        assert_eq!(a.len(), DICT_LIMIT);
        assert_eq!(a, b);
        assert!(a.iter().all(|d| full.contains(d)));

        let small = extract(&noise(20, 3), &params, Sampling::Dictionary { seed: 0 });
        assert_eq!(small.len(), 25);
    }

    #[test]
    fn flat_image_has_zero_descriptors() {
        let img = GrayImage::from_pixel(30, 30, Luma([128]));
        for d in extract(&img, &DenseParams::new(10, 8), Sampling::Full) {
            assert!(d.iter().all(|&v| v == 0.));
        }
    }

    #[test]
    fn edge_responds_in_horizontal_gradient_bins() {
        let img = GrayImage::from_fn(32, 32, |x, _| Luma([if x < 16 { 0 } else { 255 }]));
        let raw = raw_descriptors(&img, &DenseParams::new(32, 8));
        let d = &raw[0];
        let horizontal: f32 = d.iter().step_by(ORI_BINS).sum();
        let total: f32 = d.iter().sum();
        assert!(total > 0.);
        assert!(horizontal / total > 0.9);
    }

    #[test]
    fn normalized_descriptors_have_unit_norm() {
        for d in extract(&noise(40, 4), &DenseParams::new(10, 8), Sampling::Full) {
            assert!((l2(&d) - 1.).abs() < 1e-4);
        }
    }

    #[test]
    fn normalize_clips_before_renormalizing() {
        let mut desc = [0.; DESC_LEN];
        desc[0] = 10.;
        desc[1] = 1.;
        let clipped = clipped_unit(&desc).unwrap();
        assert!(clipped.iter().all(|&v| v <= CLIP));

        let out = normalize(&desc);
        assert!((l2(&out) - 1.).abs() < 1e-6);
        assert!(out[0] > out[1]);
        assert_eq!(desc[0], 10.);
    }

    #[test]
    fn normalize_passes_zero_vector_through() {
        let zero = [0.; DESC_LEN];
        assert_eq!(normalize(&zero), zero);
    }
}
