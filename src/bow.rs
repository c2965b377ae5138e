use image::GrayImage;
use tracing::warn;

use crate::dense::{self, DenseParams, Sampling};
use crate::{BoW, Vocabulary};

/// Bag-of-Words histogram of one image.
///
/// `empty` flags an image that produced no descriptors; its histogram is all zeros.
#[derive(Debug, Clone, PartialEq)]
pub struct Encoded {
    pub bow: BoW,
    pub empty: bool,
}

/// Encode an image: extract all grid descriptors, normalize them and count
/// their nearest words.
pub fn encode(img: &GrayImage, voc: &Vocabulary, params: &DenseParams) -> Encoded {
    let features = dense::extract(img, params, Sampling::Full);
    Encoded {
        bow: voc.transform(&features),
        empty: features.is_empty(),
    }
}

/// Encode a batch of images. Returns the histograms and the positions (within
/// the batch) of the images that produced no descriptors.
pub fn encode_all<'a>(
    images: impl IntoIterator<Item = &'a GrayImage>,
    voc: &Vocabulary,
    params: &DenseParams,
) -> (Vec<BoW>, Vec<usize>) {
    let mut bows = Vec::new();
    let mut empty = Vec::new();
    for (i, img) in images.into_iter().enumerate() {
        let encoded = encode(img, voc, params);
        if encoded.empty {
            warn!(
                "image {} ({}x{}) has no descriptors, using a zero histogram",
                i,
                img.width(),
                img.height()
            );
            empty.push(i);
        }
        bows.push(encoded.bow);
    }
    (bows, empty)
}
