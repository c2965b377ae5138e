use linfa::prelude::*;
use linfa_svm::Svm;
use ndarray::{Array1, Array2, ArrayView1};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

use crate::{BoW, BowErr, BowResult, Label};

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
/// Width of the RBF kernel `exp(-gamma * |x - y|^2)`.
pub enum Gamma {
    /// `1 / n_features`
    Auto,
    /// `1 / (n_features * Var(X))`, or 1 when the training data has no variance.
    Scale,
    Value(f64),
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub enum Kernel {
    Linear,
    Rbf(Gamma),
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
/// Classifier hyperparameters.
///
/// `tol` is the stopping tolerance of the SMO solver on the KKT conditions.
pub struct SvmParams {
    pub c: f64,
    pub kernel: Kernel,
    pub tol: f64,
}

impl SvmParams {
    pub fn linear(c: f64) -> Self {
        Self {
            c,
            kernel: Kernel::Linear,
            tol: 1e-3,
        }
    }

    pub fn rbf(c: f64, gamma: Gamma) -> Self {
        Self {
            c,
            kernel: Kernel::Rbf(gamma),
            tol: 1e-3,
        }
    }

    pub fn with_tol(mut self, tol: f64) -> Self {
        self.tol = tol;
        self
    }
}

/// One-vs-rest SVM over BoW histograms.
///
/// Holds one binary `linfa-svm` model per class. The class order (first
/// appearance in the training labels) is the only mapping between labels and
/// the entries of [`Classifier::decision_function`].
pub struct Classifier {
    classes: Vec<Label>,
    n_features: usize,
    /// Resolved RBF width, `None` for a linear kernel.
    gamma: Option<f64>,
    models: Vec<Svm<f64, bool>>,
}

impl Classifier {
    /// Train on a full set of histograms. There is no incremental update.
    pub fn fit(x: &[BoW], y: &[Label], params: &SvmParams) -> BowResult<Self> {
        if x.is_empty() {
            return Err(BowErr::Training("empty training set".to_string()));
        }
        if x.len() != y.len() {
            return Err(BowErr::Training(format!(
                "{} histograms but {} labels",
                x.len(),
                y.len()
            )));
        }
        let n_features = x[0].len();
        if x.iter().any(|h| h.len() != n_features) {
            return Err(BowErr::Training(
                "histograms of different lengths".to_string(),
            ));
        }
        if !(params.c > 0.) {
            return Err(BowErr::Training(format!("C must be positive, got {}", params.c)));
        }

        let mut classes: Vec<Label> = Vec::new();
        for label in y {
            if !classes.contains(label) {
                classes.push(label.clone());
            }
        }
        if classes.len() < 2 {
            return Err(BowErr::Training(format!(
                "need at least two classes, got {}",
                classes.len()
            )));
        }

        let records = Array2::from_shape_vec(
            (x.len(), n_features),
            x.iter().flatten().map(|&v| v as f64).collect(),
        )
        .map_err(|e| BowErr::Training(e.to_string()))?;

        let gamma = match params.kernel {
            Kernel::Linear => None,
            Kernel::Rbf(gamma) => Some(resolve_gamma(gamma, &records)),
        };

        let mut models = Vec::with_capacity(classes.len());
        for class in &classes {
            let targets: Array1<bool> = y.iter().map(|l| l == class).collect();
            let dataset = DatasetBase::new(records.clone(), targets);
            let svm = Svm::<f64, bool>::params()
                .pos_neg_weights(params.c, params.c)
                .eps(params.tol);
            let svm = match gamma {
                None => svm.linear_kernel(),
                // linfa's gaussian kernel is exp(-|x - y|^2 / eps)
                Some(g) => svm.gaussian_kernel(1. / g),
            };
            let model = svm
                .fit(&dataset)
                .map_err(|e| BowErr::Training(format!("class {}: {}", class, e)))?;
            debug!("class {}: {} support vectors", class, model.nsupport());
            models.push(model);
        }

        Ok(Self {
            classes,
            n_features,
            gamma,
            models,
        })
    }

    /// Per class margins, in the order of [`Classifier::classes`].
    ///
    /// `h` must have the length of the training histograms.
    pub fn decision_function(&self, h: &[f32]) -> Vec<f64> {
        debug_assert_eq!(
            h.len(),
            self.n_features,
            "histogram length differs from the training histograms"
        );
        let x: Array1<f64> = h.iter().map(|&v| v as f64).collect();
        self.models
            .iter()
            .map(|m| margin(m, x.view()))
            .collect()
    }

    /// The class with the highest of `scores` (the first one on ties).
    pub fn label_of(&self, scores: &[f64]) -> &Label {
        &self.classes[argmax(scores)]
    }

    pub fn predict(&self, h: &[f32]) -> &Label {
        self.label_of(&self.decision_function(h))
    }

    pub fn predict_all(&self, x: &[BoW]) -> Vec<Label> {
        x.iter().map(|h| self.predict(h).clone()).collect()
    }

    /// Fraction of correctly predicted samples; 0 for an empty batch.
    pub fn score(&self, x: &[BoW], y: &[Label]) -> f64 {
        accuracy(&self.predict_all(x), y)
    }

    /// Class labels in decision function order.
    pub fn classes(&self) -> &[Label] {
        &self.classes
    }

    /// Position of `label` in the decision function output.
    pub fn class_index(&self, label: &str) -> Option<usize> {
        self.classes.iter().position(|c| c == label)
    }

    /// Length of the histograms the classifier was trained on.
    pub fn n_features(&self) -> usize {
        self.n_features
    }

    /// RBF width in use, `None` for a linear classifier.
    pub fn gamma(&self) -> Option<f64> {
        self.gamma
    }
}

impl fmt::Debug for Classifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Classifier")
            .field("Classes", &self.classes)
            .field("Features", &self.n_features)
            .field("Gamma", &self.gamma)
            .field(
                "Support Vectors",
                &self.models.iter().map(|m| m.nsupport()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

/// Fraction of equal pairs; 0 when there are none.
pub fn accuracy(predicted: &[Label], truth: &[Label]) -> f64 {
    if predicted.is_empty() {
        return 0.;
    }
    let correct = predicted.iter().zip(truth).filter(|(p, t)| p == t).count();
    correct as f64 / predicted.len() as f64
}

/// Signed distance to the separating surface, positive for the class side.
fn margin(model: &Svm<f64, bool>, x: ArrayView1<f64>) -> f64 {
    model.weighted_sum(&x) - model.rho
}

fn argmax(scores: &[f64]) -> usize {
    let mut best = 0;
    for (i, &s) in scores.iter().enumerate() {
        if s > scores[best] {
            best = i;
        }
    }
    best
}

fn resolve_gamma(gamma: Gamma, x: &Array2<f64>) -> f64 {
    let n_features = x.ncols().max(1) as f64;
    match gamma {
        Gamma::Auto => 1. / n_features,
        Gamma::Value(g) => g,
        Gamma::Scale => {
            let var = if x.is_empty() { 0. } else { x.var(0.) };
            if var > 0. {
                1. / (n_features * var)
            } else {
                1.
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn labels(names: &[&str]) -> Vec<Label> {
        names.iter().map(|s| s.to_string()).collect()
    }

    /// Three tight clusters around the unit axes.
    fn three_clusters() -> (Vec<BoW>, Vec<Label>) {
        let mut x = Vec::new();
        let mut y = Vec::new();
        for i in 0..5 {
            let e = i as f32 * 0.01;
            x.push(vec![0.9 + e, 0.05, 0.05 - e]);
            y.push("a".to_string());
            x.push(vec![0.05, 0.9 - e, 0.05 + e]);
            y.push("b".to_string());
            x.push(vec![0.05 + e, 0.05, 0.9 - e]);
            y.push("c".to_string());
        }
        (x, y)
    }

    /// Two classes on the diagonals of the unit square.
    fn xor() -> (Vec<BoW>, Vec<Label>) {
        let mut x = Vec::new();
        let mut y = Vec::new();
        for i in 0..4 {
            let e = i as f32 * 0.02;
            x.push(vec![e, e]);
            y.push("same".to_string());
            x.push(vec![1. - e, 1. - e]);
            y.push("same".to_string());
            x.push(vec![e, 1. - e]);
            y.push("diff".to_string());
            x.push(vec![1. - e, e]);
            y.push("diff".to_string());
        }
        (x, y)
    }

    #[test]
    fn linear_separates_clusters() {
        let (x, y) = three_clusters();
        let model = Classifier::fit(&x, &y, &SvmParams::linear(10.)).unwrap();
        assert_eq!(model.score(&x, &y), 1.);
        assert_eq!(model.predict(&[0.8, 0.1, 0.1]), "a");
        assert_eq!(model.predict(&[0.1, 0.1, 0.8]), "c");
        assert_eq!(model.gamma(), None);
    }

    #[test]
    fn class_order_follows_first_appearance() {
        let (mut x, mut y) = three_clusters();
        x.rotate_left(1);
        y.rotate_left(1);
        let model = Classifier::fit(&x, &y, &SvmParams::linear(10.)).unwrap();
        assert_eq!(model.classes(), labels(&["b", "c", "a"]).as_slice());
        assert_eq!(model.class_index("a"), Some(2));
        assert_eq!(model.class_index("z"), None);
    }

    #[test]
    fn decision_function_agrees_with_predict() {
        let (x, y) = three_clusters();
        let model = Classifier::fit(&x, &y, &SvmParams::linear(10.)).unwrap();
        for h in &x {
            let scores = model.decision_function(h);
            assert_eq!(scores.len(), 3);
            let best = model.class_index(model.predict(h)).unwrap();
            assert!(scores.iter().all(|&s| s <= scores[best]));
            assert_eq!(model.label_of(&scores), model.predict(h));
        }
    }

    #[test]
    fn own_class_margin_is_positive() {
        let (x, y) = three_clusters();
        let model = Classifier::fit(&x, &y, &SvmParams::linear(10.)).unwrap();
        let scores = model.decision_function(&x[0]);
        assert!(scores[0] > 0.);
        assert!(scores[1] < 0. && scores[2] < 0.);
    }

    #[test]
    fn rbf_solves_xor() {
        let (x, y) = xor();
        let model = Classifier::fit(&x, &y, &SvmParams::rbf(10., Gamma::Value(2.))).unwrap();
        assert_eq!(model.score(&x, &y), 1.);
        assert_eq!(model.predict(&[0.95, 0.05]), "diff");
        assert_eq!(model.gamma(), Some(2.));
    }

    #[test]
    fn rbf_with_default_gammas_trains() {
        let (x, y) = three_clusters();
        for gamma in [Gamma::Auto, Gamma::Scale] {
            let model = Classifier::fit(&x, &y, &SvmParams::rbf(100., gamma)).unwrap();
            assert_eq!(model.score(&x, &y), 1.);
        }
    }

    #[test]
    fn scale_gamma_without_variance_is_one() {
        let x = array![[0.5, 0.5], [0.5, 0.5]];
        assert_eq!(resolve_gamma(Gamma::Scale, &x), 1.);
        assert_eq!(resolve_gamma(Gamma::Auto, &x), 0.5);
        let x = array![[0., 1.], [1., 0.]];
        assert!((resolve_gamma(Gamma::Scale, &x) - 2.).abs() < 1e-12);
    }

    #[test]
    fn rejects_bad_training_sets() {
        let params = SvmParams::linear(1.);
        assert!(Classifier::fit(&[], &[], &params).is_err());
        assert!(Classifier::fit(&[vec![1.], vec![0.]], &labels(&["a"]), &params).is_err());
        assert!(Classifier::fit(&[vec![1.], vec![0.]], &labels(&["a", "a"]), &params).is_err());
        assert!(Classifier::fit(&[vec![1.], vec![0., 1.]], &labels(&["a", "b"]), &params).is_err());
        assert!(
            Classifier::fit(&[vec![1.], vec![0.]], &labels(&["a", "b"]), &SvmParams::linear(0.))
                .is_err()
        );
    }

    #[test]
    fn empty_batch_scores_zero() {
        let (x, y) = three_clusters();
        let model = Classifier::fit(&x, &y, &SvmParams::linear(1.)).unwrap();
        assert_eq!(model.score(&[], &[]), 0.);
        assert_eq!(accuracy(&[], &[]), 0.);
    }

    #[test]
    fn training_is_deterministic() {
        let (x, y) = three_clusters();
        let params = SvmParams::linear(4.);
        let a = Classifier::fit(&x, &y, &params).unwrap();
        let b = Classifier::fit(&x, &y, &params).unwrap();
        for h in &x {
            assert_eq!(a.decision_function(h), b.decision_function(h));
        }
    }

    #[cfg(debug_assertions)]
    #[test]
    #[should_panic(expected = "histogram length")]
    fn short_histogram_is_caught() {
        let (x, y) = three_clusters();
        let model = Classifier::fit(&x, &y, &SvmParams::linear(1.)).unwrap();
        model.decision_function(&[1.]);
    }
}
