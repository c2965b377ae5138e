use image::GrayImage;
use tracing::info;

use crate::bow::encode_all;
use crate::dense::{self, DenseParams, Sampling};
use crate::report::Evaluation;
use crate::split::SplitIndices;
use crate::*;

/// Result of one train/test run. Vocabulary and classifier belong to this run only.
#[derive(Debug)]
pub struct Outcome {
    pub split: SplitIndices,
    pub vocabulary: Vocabulary,
    pub classifier: Classifier,
    pub evaluation: Evaluation,
}

/// Pool build-dict descriptors (at most [`dense::DICT_LIMIT`] per image) of
/// `images[i]` for every `i` in `indices`. Each descriptor is tagged with the
/// index of the image it came from.
pub fn pool_descriptors(
    images: &[GrayImage],
    indices: &[usize],
    params: &DenseParams,
    seed: u64,
) -> Vec<(usize, Desc)> {
    indices
        .iter()
        .flat_map(|&i| {
            dense::extract(&images[i], params, Sampling::Dictionary { seed })
                .into_iter()
                .map(move |d| (i, d))
        })
        .collect()
}

/// Cluster a tagged descriptor pool into a vocabulary of `vocab_size` words.
pub fn vocabulary_from_pool(
    pool: &[(usize, Desc)],
    vocab_size: usize,
    seed: u64,
) -> BowResult<Vocabulary> {
    let features: Vec<Desc> = pool.iter().map(|(_, d)| *d).collect();
    info!(
        "Training K-Means model: {} words from {} descriptors",
        vocab_size,
        features.len()
    );
    Vocabulary::create(&features, vocab_size, seed)
}

/// Split the images, build a vocabulary from the training part, encode both
/// parts, fit the classifier on the training histograms and evaluate it on
/// the test histograms.
pub fn run(config: &Config, images: &[GrayImage], labels: &[Label]) -> BowResult<Outcome> {
    config.validate()?;
    if images.len() != labels.len() {
        return Err(BowErr::Configuration(format!(
            "{} images but {} labels",
            images.len(),
            labels.len()
        )));
    }
    let dense = config.features.dense();
    let split = SplitIndices::new(labels);
    let train_y = split.train_of(labels)?;
    let test_y = split.test_of(labels)?;

    info!("Extracting descriptors from {} training images", split.train.len());
    let pool = pool_descriptors(images, &split.train, &dense, config.seed);
    let vocabulary = vocabulary_from_pool(&pool, config.features.vocab_size, config.seed)?;

    info!("Preparing image histograms");
    let (train_h, empty_train) = encode_all(split.train.iter().map(|&i| &images[i]), &vocabulary, &dense);
    let (test_h, empty_test) = encode_all(split.test.iter().map(|&i| &images[i]), &vocabulary, &dense);

    info!("Training SVM model on {} histograms", train_h.len());
    let classifier = Classifier::fit(&train_h, &train_y, &config.svm)?;

    let mut evaluation = Evaluation::new(&classifier, &train_y, &test_h, &test_y);
    evaluation.empty_images = empty_train
        .iter()
        .map(|&i| split.train[i])
        .chain(empty_test.iter().map(|&i| split.test[i]))
        .collect();
    info!("Test accuracy {:.3}%", evaluation.accuracy * 100.);

    Ok(Outcome {
        split,
        vocabulary,
        classifier,
        evaluation,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;
    use rand::{rngs::StdRng, Rng, SeedableRng};

    fn stripes(vertical: bool, phase: u32) -> GrayImage {
        GrayImage::from_fn(30, 30, |x, y| {
            let t = if vertical { x } else { y } + phase;
            Luma([if (t / 3) % 2 == 0 { 30 } else { 220 }])
        })
    }

    #[test]
    fn pool_is_tagged_with_source_images() {
        let images: Vec<GrayImage> = (0..4).map(|i| stripes(i % 2 == 0, i)).collect();
        let pool = pool_descriptors(&images, &[1, 3], &DenseParams::new(10, 8), 0);
        assert_eq!(pool.len(), 2 * 9);
        assert!(pool.iter().all(|(i, _)| *i == 1 || *i == 3));
    }

    #[test]
    fn separates_stripe_orientations() {
        let mut images = Vec::new();
        let mut labels = Vec::new();
        for (name, vertical) in [("vertical", true), ("horizontal", false)] {
            for phase in 0..12 {
                images.push(stripes(vertical, phase));
                labels.push(name.to_string());
            }
        }
        let config = Config {
            image_size: 30,
            features: FeatureParams::new(10, 8, 4),
            svm: SvmParams::linear(1.),
            seed: 0,
        };
        let outcome = run(&config, &images, &labels).unwrap();
        assert_eq!(outcome.split.train.len(), 12);
        assert_eq!(outcome.split.test.len(), 12);
        assert_eq!(outcome.vocabulary.len(), 4);
        assert_eq!(outcome.evaluation.accuracy, 1.);
        assert!(outcome.evaluation.empty_images.is_empty());
    }

    #[test]
    fn empty_images_are_reported_by_dataset_index() {
        let mut rng = StdRng::seed_from_u64(5);
        let mut images: Vec<GrayImage> = (0..12)
            .map(|_| GrayImage::from_fn(30, 30, |_, _| Luma([rng.gen()])))
            .collect();
        // position 2 of the test part of class "a"
        images[5] = GrayImage::new(0, 0);
        let labels: Vec<Label> = (0..12)
            .map(|i| if i < 6 { "a" } else { "b" }.to_string())
            .collect();
        let config = Config {
            image_size: 30,
            features: FeatureParams::new(10, 8, 4),
            svm: SvmParams::linear(1.),
            seed: 0,
        };
        let outcome = run(&config, &images, &labels).unwrap();
        assert_eq!(outcome.split.test, vec![3, 4, 5, 9, 10, 11]);
        assert_eq!(outcome.evaluation.empty_images, vec![5]);
    }

    #[test]
    fn mismatched_inputs_are_rejected() {
        let images = vec![stripes(true, 0)];
        let labels = vec!["a".to_string(), "b".to_string()];
        assert!(run(&Config::default(), &images, &labels).is_err());
    }
}
