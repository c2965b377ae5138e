use crate::{BowErr, BowResult, Label};

/// Classes with at least this many images get a fixed size split.
const FULL_GROUP: usize = 50;
/// Train (and test) images taken from a full group.
const PER_SIDE: usize = 25;

/// Train/test selection over a labeled collection.
///
/// Indices refer to positions in the original collection; applying the same
/// `SplitIndices` to parallel collections (grayscale and color images) selects
/// the same items from each.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitIndices {
    pub train: Vec<usize>,
    pub test: Vec<usize>,
}

/// Output of [`split_data`].
#[derive(Debug, Clone, PartialEq)]
pub struct Split<T> {
    pub train_x: Vec<T>,
    pub train_y: Vec<Label>,
    pub test_x: Vec<T>,
    pub test_y: Vec<Label>,
}

impl SplitIndices {
    /// Group indices by label (labels in first appearance order, indices in
    /// insertion order) and split every group.
    ///
    /// A group of 50 or more gives its first 25 indices to train and the next
    /// 25 to test. A smaller group of `n` gives `ceil(n / 2)` to train and the
    /// rest to test.
    pub fn new(labels: &[Label]) -> Self {
        let mut train = Vec::new();
        let mut test = Vec::new();
        for (_, group) in group_by_label(labels) {
            let n = group.len();
            let (n_train, n_test) = if n >= FULL_GROUP {
                (PER_SIDE, PER_SIDE)
            } else {
                let n_train = n.div_ceil(2);
                (n_train, n - n_train)
            };
            train.extend_from_slice(&group[..n_train]);
            test.extend_from_slice(&group[n_train..n_train + n_test]);
        }
        Self { train, test }
    }

    /// The training items of `data`, a collection parallel to the split labels.
    pub fn train_of<T: Clone>(&self, data: &[T]) -> BowResult<Vec<T>> {
        select(&self.train, data)
    }

    /// The test items of `data`, a collection parallel to the split labels.
    pub fn test_of<T: Clone>(&self, data: &[T]) -> BowResult<Vec<T>> {
        select(&self.test, data)
    }
}

fn select<T: Clone>(indices: &[usize], data: &[T]) -> BowResult<Vec<T>> {
    indices
        .iter()
        .map(|&i| {
            data.get(i).cloned().ok_or_else(|| {
                BowErr::Configuration(format!(
                    "split index {} out of range for {} items",
                    i,
                    data.len()
                ))
            })
        })
        .collect()
}

/// Split a labeled collection into `(train_x, train_y, test_x, test_y)`.
/// `data` and `labels` must have the same length.
pub fn split_data<T: Clone>(data: &[T], labels: &[Label]) -> BowResult<Split<T>> {
    if data.len() != labels.len() {
        return Err(BowErr::Configuration(format!(
            "{} items but {} labels",
            data.len(),
            labels.len()
        )));
    }
    let indices = SplitIndices::new(labels);
    Ok(Split {
        train_x: indices.train_of(data)?,
        train_y: indices.train_of(labels)?,
        test_x: indices.test_of(data)?,
        test_y: indices.test_of(labels)?,
    })
}

/// Indices of every label, labels in order of first appearance.
pub fn group_by_label(labels: &[Label]) -> Vec<(&Label, Vec<usize>)> {
    let mut groups: Vec<(&Label, Vec<usize>)> = Vec::new();
    for (i, label) in labels.iter().enumerate() {
        match groups.iter().position(|(l, _)| *l == label) {
            Some(g) => groups[g].1.push(i),
            None => groups.push((label, vec![i])),
        }
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(groups: &[(&str, usize)]) -> Vec<Label> {
        groups
            .iter()
            .flat_map(|&(name, n)| std::iter::repeat(name.to_string()).take(n))
            .collect()
    }

    #[test]
    fn large_group_takes_25_and_25() {
        let split = SplitIndices::new(&labels(&[("a", 60)]));
        assert_eq!(split.train, (0..25).collect::<Vec<_>>());
        assert_eq!(split.test, (25..50).collect::<Vec<_>>());
    }

    #[test]
    fn small_group_rounds_train_up() {
        let split = SplitIndices::new(&labels(&[("a", 7)]));
        assert_eq!(split.train, vec![0, 1, 2, 3]);
        assert_eq!(split.test, vec![4, 5, 6]);
    }

    #[test]
    fn single_image_class_has_empty_test() {
        let split = split_data(&[10], &labels(&[("a", 1)])).unwrap();
        assert_eq!(split.train_x, vec![10]);
        assert!(split.test_x.is_empty());
    }

    #[test]
    fn interleaved_labels_keep_first_appearance_order() {
        let y: Vec<Label> = ["b", "a", "b", "a", "b"].iter().map(|s| s.to_string()).collect();
        let split = SplitIndices::new(&y);
        assert_eq!(split.train, vec![0, 2, 1]);
        assert_eq!(split.test, vec![4, 3]);
    }

    #[test]
    fn partitions_are_disjoint_and_bounded() {
        let y = labels(&[("a", 60), ("b", 7), ("c", 50), ("d", 49), ("e", 2)]);
        let split = SplitIndices::new(&y);
        for (label, group) in group_by_label(&y) {
            let train: Vec<_> = split.train.iter().filter(|&&i| group.contains(&i)).collect();
            let test: Vec<_> = split.test.iter().filter(|&&i| group.contains(&i)).collect();
            assert!(train.iter().all(|i| !test.contains(i)), "{}", label);
            assert!(train.len() + test.len() <= group.len());
        }
    }

    #[test]
    fn parallel_collections_get_the_same_selection() {
        let y = labels(&[("a", 3), ("b", 55)]);
        let gray: Vec<usize> = (0..y.len()).collect();
        let color: Vec<String> = gray.iter().map(|i| format!("color-{}", i)).collect();
        let a = split_data(&gray, &y).unwrap();
        let b = split_data(&color, &y).unwrap();
        assert_eq!(a.train_y, b.train_y);
        for (g, c) in a.test_x.iter().zip(&b.test_x) {
            assert_eq!(format!("color-{}", g), *c);
        }
    }

    #[test]
    fn short_parallel_collection_is_an_error() {
        let y = labels(&[("a", 4), ("b", 4)]);
        let split = SplitIndices::new(&y);
        let short = vec![0u8; 6];
        assert!(matches!(split.test_of(&short), Err(BowErr::Configuration(_))));
        assert_eq!(split.train_of(&short).unwrap(), vec![0, 0, 0, 0]);
        assert!(matches!(split_data(&short, &y), Err(BowErr::Configuration(_))));
    }

    #[test]
    fn odd_small_groups_round_up() {
        let split = SplitIndices::new(&labels(&[("a", 1), ("b", 5), ("c", 49)]));
        assert_eq!(split.train.len(), 1 + 3 + 25);
        assert_eq!(split.test.len(), 2 + 24);
    }
}
