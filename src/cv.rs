use image::GrayImage;
use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};
use tracing::{debug, info};

use crate::bow::encode_all;
use crate::pipeline::{pool_descriptors, vocabulary_from_pool};
use crate::*;

/// K-fold splitter.
///
/// The first `n % k` folds hold `n / k + 1` validation samples, the others
/// `n / k`. Without a seed folds are contiguous ranges of the input order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KFold {
    n_splits: usize,
    seed: Option<u64>,
}

/// Train/validation indices of one fold.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fold {
    pub train: Vec<usize>,
    pub validation: Vec<usize>,
}

impl KFold {
    pub fn new(n_splits: usize) -> Self {
        Self {
            n_splits,
            seed: None,
        }
    }

    /// Shuffle the samples with a `StdRng` seeded from `seed` before folding.
    pub fn shuffled(n_splits: usize, seed: u64) -> Self {
        Self {
            n_splits,
            seed: Some(seed),
        }
    }

    pub fn n_splits(&self) -> usize {
        self.n_splits
    }

    /// Folds over `n` samples. Training indices are sorted, validation indices
    /// keep the (possibly shuffled) fold order.
    pub fn split(&self, n: usize) -> BowResult<Vec<Fold>> {
        if self.n_splits < 2 {
            return Err(BowErr::Configuration(format!(
                "need at least 2 folds, got {}",
                self.n_splits
            )));
        }
        if self.n_splits > n {
            return Err(BowErr::Configuration(format!(
                "cannot make {} folds from {} samples",
                self.n_splits, n
            )));
        }
        let mut order: Vec<usize> = (0..n).collect();
        if let Some(seed) = self.seed {
            order.shuffle(&mut StdRng::seed_from_u64(seed));
        }

        let mut folds = Vec::with_capacity(self.n_splits);
        let mut start = 0;
        for f in 0..self.n_splits {
            let size = n / self.n_splits + usize::from(f < n % self.n_splits);
            let validation = order[start..start + size].to_vec();
            let mut in_validation = vec![false; n];
            validation.iter().for_each(|&i| in_validation[i] = true);
            let train = (0..n).filter(|&i| !in_validation[i]).collect();
            folds.push(Fold { train, validation });
            start += size;
        }
        Ok(folds)
    }
}

/// Outcome of one fold.
#[derive(Debug, Clone, PartialEq)]
pub struct FoldReport {
    pub fold: Fold,
    /// Validation accuracy in [0, 1].
    pub accuracy: f64,
    /// Sorted indices of the images whose descriptors built this fold's vocabulary.
    pub vocabulary_sources: Vec<usize>,
}

/// Outcome of a cross validation run.
#[derive(Debug, Clone, PartialEq)]
pub struct CvReport {
    pub folds: Vec<FoldReport>,
}

impl CvReport {
    /// Mean validation accuracy over the folds, in percent.
    pub fn mean(&self) -> f64 {
        if self.folds.is_empty() {
            return 0.;
        }
        100. * self.folds.iter().map(|f| f.accuracy).sum::<f64>() / self.folds.len() as f64
    }
}

/// Cross validate the whole pipeline on `(images, labels)`.
///
/// Every fold builds its own vocabulary from its training images only, encodes
/// both partitions with it and fits a fresh classifier. Folds with an empty
/// validation part are skipped.
pub fn cross_validate(
    images: &[GrayImage],
    labels: &[Label],
    kfold: &KFold,
    svm: &SvmParams,
    features: &FeatureParams,
    seed: u64,
) -> BowResult<CvReport> {
    features.validate()?;
    if images.len() != labels.len() {
        return Err(BowErr::Configuration(format!(
            "{} images but {} labels",
            images.len(),
            labels.len()
        )));
    }
    let mut folds = Vec::with_capacity(kfold.n_splits());
    for (f, fold) in kfold.split(images.len())?.into_iter().enumerate() {
        if fold.validation.is_empty() {
            debug!("skipping fold {} without validation samples", f);
            continue;
        }
        let report = run_fold(images, labels, fold, svm, features, seed)?;
        debug!("fold {}: accuracy {:.3}", f, report.accuracy);
        folds.push(report);
    }
    let report = CvReport { folds };
    info!(
        "CV step {} patch {} words {} C {}: {:.3}%",
        features.step_size,
        features.patch_size,
        features.vocab_size,
        svm.c,
        report.mean()
    );
    Ok(report)
}

/// Train on `fold.train` and score on `fold.validation`.
pub fn run_fold(
    images: &[GrayImage],
    labels: &[Label],
    fold: Fold,
    svm: &SvmParams,
    features: &FeatureParams,
    seed: u64,
) -> BowResult<FoldReport> {
    let dense = features.dense();
    let pool = pool_descriptors(images, &fold.train, &dense, seed);
    let mut vocabulary_sources: Vec<usize> = pool.iter().map(|(i, _)| *i).collect();
    vocabulary_sources.sort_unstable();
    vocabulary_sources.dedup();
    let vocabulary = vocabulary_from_pool(&pool, features.vocab_size, seed)?;

    let (train_h, _) = encode_all(fold.train.iter().map(|&i| &images[i]), &vocabulary, &dense);
    let train_y: Vec<Label> = fold.train.iter().map(|&i| labels[i].clone()).collect();
    let classifier = Classifier::fit(&train_h, &train_y, svm)?;

    let (val_h, _) = encode_all(
        fold.validation.iter().map(|&i| &images[i]),
        &vocabulary,
        &dense,
    );
    let val_y: Vec<Label> = fold.validation.iter().map(|&i| labels[i].clone()).collect();
    let accuracy = classifier.score(&val_h, &val_y);

    Ok(FoldReport {
        fold,
        accuracy,
        vocabulary_sources,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fold_sizes_differ_by_at_most_one() {
        let folds = KFold::shuffled(5, 0).split(23).unwrap();
        let sizes: Vec<usize> = folds.iter().map(|f| f.validation.len()).collect();
        assert_eq!(sizes, vec![5, 5, 5, 4, 4]);
        for f in &folds {
            assert_eq!(f.train.len() + f.validation.len(), 23);
            assert!(f.train.iter().all(|i| !f.validation.contains(i)));
        }
    }

    #[test]
    fn validation_parts_cover_every_sample_once() {
        let folds = KFold::shuffled(4, 9).split(20).unwrap();
        let mut all: Vec<usize> = folds.iter().flat_map(|f| f.validation.clone()).collect();
        all.sort_unstable();
        assert_eq!(all, (0..20).collect::<Vec<_>>());
    }

    #[test]
    fn unshuffled_folds_are_contiguous() {
        let folds = KFold::new(3).split(6).unwrap();
        assert_eq!(folds[1].validation, vec![2, 3]);
        assert_eq!(folds[1].train, vec![0, 1, 4, 5]);
    }

    #[test]
    fn shuffling_is_seeded() {
        assert_eq!(
            KFold::shuffled(5, 1).split(50).unwrap(),
            KFold::shuffled(5, 1).split(50).unwrap()
        );
        assert_ne!(
            KFold::shuffled(5, 1).split(50).unwrap(),
            KFold::new(5).split(50).unwrap()
        );
    }

    #[test]
    fn bad_fold_counts_are_rejected() {
        assert!(KFold::new(1).split(10).is_err());
        assert!(KFold::new(11).split(10).is_err());
    }

    #[test]
    fn empty_report_has_zero_mean() {
        assert_eq!(CvReport { folds: Vec::new() }.mean(), 0.);
    }
}
