use image::RgbImage;
use smallvec::SmallVec;
use std::{cmp::Ordering, collections::HashMap, fmt};

use crate::*;

/// A wrongly predicted test image.
///
/// `margin` is the best class score minus the true class score: the larger,
/// the more confidently wrong the prediction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Misclassification {
    /// Position in the test set.
    pub index: usize,
    pub margin: f64,
}

/// Counts of (true, predicted) label pairs. Rows are true labels, columns predicted ones.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfusionMatrix {
    classes: Vec<Label>,
    counts: Vec<Vec<usize>>,
}

impl ConfusionMatrix {
    /// Labels outside `classes` are appended in order of first appearance
    /// (true labels first).
    pub fn new(classes: &[Label], truth: &[Label], predicted: &[Label]) -> Self {
        let mut classes = classes.to_vec();
        for label in truth.iter().chain(predicted) {
            if !classes.contains(label) {
                classes.push(label.clone());
            }
        }
        let mut counts = vec![vec![0; classes.len()]; classes.len()];
        for (t, p) in truth.iter().zip(predicted) {
            if let (Some(r), Some(c)) = (
                classes.iter().position(|l| l == t),
                classes.iter().position(|l| l == p),
            ) {
                counts[r][c] += 1;
            }
        }
        Self { classes, counts }
    }

    pub fn classes(&self) -> &[Label] {
        &self.classes
    }

    /// Number of test images labeled `truth` and predicted as `predicted`.
    pub fn get(&self, truth: &str, predicted: &str) -> usize {
        let r = self.classes.iter().position(|l| l == truth);
        let c = self.classes.iter().position(|l| l == predicted);
        match (r, c) {
            (Some(r), Some(c)) => self.counts[r][c],
            _ => 0,
        }
    }

    pub fn rows(&self) -> &[Vec<usize>] {
        &self.counts
    }

    pub fn row_sums(&self) -> Vec<usize> {
        self.counts.iter().map(|r| r.iter().sum()).collect()
    }
}

impl fmt::Display for ConfusionMatrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let width = self
            .counts
            .iter()
            .flatten()
            .map(|c| c.to_string().len())
            .max()
            .unwrap_or(1);
        for row in &self.counts {
            let cells: Vec<String> = row.iter().map(|c| format!("{:>w$}", c, w = width)).collect();
            writeln!(f, "[{}]", cells.join(" "))?;
        }
        Ok(())
    }
}

/// Per class figures of an [`Evaluation`].
#[derive(Debug, Clone, PartialEq)]
pub struct ClassSummary {
    pub label: Label,
    pub train: usize,
    pub test: usize,
    /// The one or two most confident errors on this class, worst first.
    pub worst: SmallVec<[Misclassification; 2]>,
}

/// Test set evaluation of a trained classifier.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    /// Fraction of correct test predictions (0 when there is no test data).
    pub accuracy: f64,
    pub predicted: Vec<Label>,
    pub confusion: ConfusionMatrix,
    pub classes: Vec<ClassSummary>,
    /// Errors per true label, in test set order.
    pub misclassified: HashMap<Label, Vec<Misclassification>>,
    /// Dataset indices of images that produced no descriptors.
    pub empty_images: Vec<usize>,
}

impl Evaluation {
    /// Evaluate `classifier` on the test histograms. Every histogram is scored
    /// once; prediction, accuracy and margins all derive from those scores.
    pub fn new(
        classifier: &Classifier,
        train_y: &[Label],
        test_h: &[BoW],
        test_y: &[Label],
    ) -> Self {
        let scores: Vec<Vec<f64>> = test_h.iter().map(|h| classifier.decision_function(h)).collect();
        let predicted: Vec<Label> = scores.iter().map(|s| classifier.label_of(s).clone()).collect();
        let accuracy = svm::accuracy(&predicted, test_y);
        let confusion = ConfusionMatrix::new(classifier.classes(), test_y, &predicted);
        let misclassified = misclassifications(classifier, &scores, test_y);

        let classes = confusion
            .classes()
            .iter()
            .map(|label| ClassSummary {
                label: label.clone(),
                train: train_y.iter().filter(|&l| l == label).count(),
                test: test_y.iter().filter(|&l| l == label).count(),
                worst: misclassified.get(label).map(|m| worst(m)).unwrap_or_default(),
            })
            .collect();

        Self {
            accuracy,
            predicted,
            confusion,
            classes,
            misclassified,
            empty_images: Vec::new(),
        }
    }

    /// Fraction of wrong test predictions.
    pub fn error(&self) -> f64 {
        1. - self.accuracy
    }
}

/// Group the wrongly predicted samples by their true label, given the
/// classifier's decision values for every sample.
///
/// Margins use the classifier's own class order to find the true class score.
/// A true label the classifier never saw gets an infinite margin.
pub fn misclassifications(
    classifier: &Classifier,
    scores: &[Vec<f64>],
    truth: &[Label],
) -> HashMap<Label, Vec<Misclassification>> {
    let mut out: HashMap<Label, Vec<Misclassification>> = HashMap::new();
    for (index, (s, label)) in scores.iter().zip(truth).enumerate() {
        if classifier.label_of(s) == label {
            continue;
        }
        let best = s.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let margin = match classifier.class_index(label) {
            Some(t) => best - s[t],
            None => f64::INFINITY,
        };
        out.entry(label.clone())
            .or_default()
            .push(Misclassification { index, margin });
    }
    out
}

/// The (at most) two records with the largest margin, largest first.
pub fn worst(records: &[Misclassification]) -> SmallVec<[Misclassification; 2]> {
    let mut sorted = records.to_vec();
    sorted.sort_by(|a, b| b.margin.partial_cmp(&a.margin).unwrap_or(Ordering::Equal));
    sorted.into_iter().take(2).collect()
}

/// Receives the images selected for display.
pub trait ImageSink {
    /// Show `image`, the `rank`-th worst error (0 = worst) of class `label`.
    fn show(&mut self, label: &str, rank: usize, image: &RgbImage) -> BowResult<()>;
}

/// Hand the worst misclassified color test images of every class to `sink`.
/// `color_test` must be the color variant of the test set.
pub fn show_worst<S: ImageSink>(
    evaluation: &Evaluation,
    color_test: &[RgbImage],
    sink: &mut S,
) -> BowResult<()> {
    for class in &evaluation.classes {
        for (rank, m) in class.worst.iter().enumerate() {
            let image = color_test.get(m.index).ok_or_else(|| {
                BowErr::Configuration(format!(
                    "test image {} missing from {} color images",
                    m.index,
                    color_test.len()
                ))
            })?;
            sink.show(&class.label, rank, image)?;
        }
    }
    Ok(())
}

impl fmt::Display for Evaluation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Classes names & number of images:")?;
        for class in &self.classes {
            writeln!(f, "Class Name: {}", class.label)?;
            writeln!(f, "Number of train images: {}", class.train)?;
            writeln!(f, "Number of test images: {}", class.test)?;
            writeln!(f)?;
        }
        writeln!(f, "The test error is: {:.3}", self.error() * 100.)?;
        writeln!(f, "The test score is: {:.3}", self.accuracy * 100.)?;
        writeln!(f)?;
        writeln!(f, "Confusion matrix:")?;
        write!(f, "{}", self.confusion)?;
        for class in &self.classes {
            if class.worst.is_empty() {
                writeln!(f, "There are no errors from class {}", class.label)?;
            } else {
                let indices: Vec<String> = class.worst.iter().map(|m| m.index.to_string()).collect();
                writeln!(
                    f,
                    "Largest error images of class {}: {}",
                    class.label,
                    indices.join(", ")
                )?;
            }
        }
        if !self.empty_images.is_empty() {
            writeln!(f, "Images without descriptors: {:?}", self.empty_images)?;
        }
        Ok(())
    }
}
