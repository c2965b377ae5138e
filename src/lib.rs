use thiserror::Error;

/// Dense SIFT-like descriptor extraction on a regular keypoint grid,
/// plus the clip-and-renormalize step applied to every descriptor.
pub mod dense;
pub use dense::{normalize, DenseParams, Sampling};

/// Implementation of a visual bag-of-words vocabulary built with k-means.
pub mod vocab;
pub use vocab::Vocabulary;

/// Histogram encoding of whole images against a vocabulary.
pub mod bow;

/// One-vs-rest linear and RBF kernel SVM classifiers.
pub mod svm;
pub use svm::{Classifier, Gamma, Kernel, SvmParams};

/// Deterministic per-class train/test split.
pub mod split;

/// K-fold cross validation of the whole pipeline.
pub mod cv;

/// Grid search over pipeline hyperparameters.
pub mod tune;

/// Accuracy, confusion matrix and worst misclassifications.
pub mod report;

/// Pipeline configuration values.
pub mod config;
pub use config::{Config, FeatureParams};

/// Loading a folder-per-class image dataset.
pub mod dataset;
pub use dataset::Dataset;

/// The full train/test run.
pub mod pipeline;

/// Length of a descriptor: 4x4 spatial cells with 8 orientation bins each.
pub const DESC_LEN: usize = 128;

/// Supported descriptor type is a 128 element float array (SIFT layout).
pub type Desc = [f32; DESC_LEN];

/// Bag-of-Words representation of an image or descriptor set.
///
/// Index: word id in the vocabulary.
///
/// Value: fraction of the image's descriptors assigned to that word.
pub type BoW = Vec<f32>;

/// Class label of an image (the name of its dataset folder).
pub type Label = String;

pub type BowResult<T> = std::result::Result<T, BowErr>;

#[derive(Error, Debug)]
pub enum BowErr {
    #[error("Io Error")]
    Io(#[from] std::io::Error),
    #[cfg(feature = "bincode")]
    #[error("Vocabulary Serialization Error")]
    Bincode(#[from] bincode::Error),
    #[error("Image Error")]
    Image(#[from] image::ImageError),
    #[error("Configuration Error: {0}")]
    Configuration(String),
    #[error("Training Error: {0}")]
    Training(String),
}
