use image::GrayImage;
use std::ops::RangeInclusive;
use tracing::info;

use crate::cv::{cross_validate, KFold};
use crate::*;

/// One point of a hyperparameter grid.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
    pub features: FeatureParams,
    pub svm: SvmParams,
}

/// Mean cross validation accuracy (percent) of a candidate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TuningResult {
    pub candidate: Candidate,
    pub accuracy: f64,
}

/// Cartesian product of the given values, step sizes varying slowest.
pub fn grid(
    step_sizes: &[u32],
    patch_sizes: &[u32],
    vocab_sizes: &[usize],
    svms: &[SvmParams],
) -> Vec<Candidate> {
    let mut out = Vec::new();
    for &step in step_sizes {
        for &patch in patch_sizes {
            for &words in vocab_sizes {
                for svm in svms {
                    out.push(Candidate {
                        features: FeatureParams::new(step, patch, words),
                        svm: *svm,
                    });
                }
            }
        }
    }
    out
}

/// `2^e` for every exponent in `exponents`, e.g. `2^-3 ..= 2^15` for C.
pub fn powers_of_two(exponents: RangeInclusive<i32>) -> Vec<f64> {
    exponents.map(|e| 2f64.powi(e)).collect()
}

/// One SVM per value of C: linear, or RBF with [`Gamma::Scale`] when `rbf` is set.
pub fn c_sweep(cs: &[f64], rbf: bool) -> Vec<SvmParams> {
    cs.iter()
        .map(|&c| {
            if rbf {
                SvmParams::rbf(c, Gamma::Scale)
            } else {
                SvmParams::linear(c)
            }
        })
        .collect()
}

/// RBF candidates sharing the features and C of `base`, one per fixed gamma.
pub fn gamma_sweep(base: &Candidate, gammas: &[f64]) -> Vec<Candidate> {
    gammas
        .iter()
        .map(|&g| Candidate {
            features: base.features,
            svm: SvmParams::rbf(base.svm.c, Gamma::Value(g)),
        })
        .collect()
}

/// Cross validate every candidate on the same data and folds.
pub fn search(
    images: &[GrayImage],
    labels: &[Label],
    candidates: &[Candidate],
    kfold: &KFold,
    seed: u64,
) -> BowResult<Vec<TuningResult>> {
    let mut results = Vec::with_capacity(candidates.len());
    for (i, candidate) in candidates.iter().enumerate() {
        info!("Tuning candidate {}/{}", i + 1, candidates.len());
        let report = cross_validate(
            images,
            labels,
            kfold,
            &candidate.svm,
            &candidate.features,
            seed,
        )?;
        results.push(TuningResult {
            candidate: *candidate,
            accuracy: report.mean(),
        });
    }
    Ok(results)
}

/// The most accurate result; the earliest one wins ties.
pub fn best(results: &[TuningResult]) -> Option<&TuningResult> {
    results.iter().fold(None, |best: Option<&TuningResult>, r| match best {
        Some(b) if b.accuracy >= r.accuracy => Some(b),
        _ => Some(r),
    })
}
