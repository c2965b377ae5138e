use serde::{Deserialize, Serialize};

use crate::{BowErr, BowResult, DenseParams, SvmParams};

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
/// Feature extraction hyperparameters shared by vocabulary construction and
/// histogram encoding.
pub struct FeatureParams {
    pub step_size: u32,
    pub patch_size: u32,
    pub vocab_size: usize,
}

impl FeatureParams {
    pub fn new(step_size: u32, patch_size: u32, vocab_size: usize) -> Self {
        Self {
            step_size,
            patch_size,
            vocab_size,
        }
    }

    pub fn dense(&self) -> DenseParams {
        DenseParams::new(self.step_size, self.patch_size)
    }

    pub fn validate(&self) -> BowResult<()> {
        if self.step_size == 0 {
            return Err(BowErr::Configuration("step size must be positive".to_string()));
        }
        if self.patch_size == 0 {
            return Err(BowErr::Configuration("patch size must be positive".to_string()));
        }
        if self.vocab_size == 0 {
            return Err(BowErr::Configuration(
                "vocabulary size must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for FeatureParams {
    fn default() -> Self {
        Self::new(7, 8, 900)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
/// Everything a pipeline run needs besides the images themselves.
///
/// The defaults are the tuned values for Caltech-101 style data: 75x75
/// images, step 7, patch 8, 900 words and a linear SVM with C = 2^14.
pub struct Config {
    /// Side of the square grayscale images fed to the extractor.
    pub image_size: u32,
    pub features: FeatureParams,
    pub svm: SvmParams,
    /// Seed for descriptor subsampling and k-means initialization.
    pub seed: u64,
}

impl Config {
    pub fn validate(&self) -> BowResult<()> {
        if self.image_size == 0 {
            return Err(BowErr::Configuration("image size must be positive".to_string()));
        }
        self.features.validate()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            image_size: 75,
            features: FeatureParams::default(),
            svm: SvmParams::linear(16384.),
            seed: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.features.dense(), DenseParams::new(7, 8));
    }

    #[test]
    fn zero_sizes_are_rejected() {
        let mut config = Config::default();
        config.features.step_size = 0;
        assert!(matches!(config.validate(), Err(BowErr::Configuration(_))));

        let config = Config {
            image_size: 0,
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }
}
