#[cfg(feature = "bincode")]
use bincode;
use rand::{distributions::WeightedIndex, prelude::Distribution, rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

use crate::*;

/// Lloyd iterations before clustering stops without converging.
const MAX_ITER: usize = 300;

#[derive(Serialize, Deserialize, PartialEq, Clone)]
/// Visual vocabulary built from a pool of normalized image descriptors. Can be:
/// 1. Created with seeded k-means.
/// 2. Saved to a file & loaded from a file (requires bincode feature, enabled by default).
/// 3. Used to transform a set of descriptors into a BoW histogram.
///
/// Words are fixed after construction; the vocabulary is shared read-only by
/// every encoding done with it.
pub struct Vocabulary {
    words: Vec<Word>,
    cluster_size: Vec<usize>,
}

/// Vocabulary API
impl Vocabulary {
    /// Transform a set of descriptors into its bag of words histogram with
    /// respect to the Vocabulary. The histogram is l1 normalized; a descriptor
    /// set without descriptors gives the all-zero histogram.
    pub fn transform(&self, features: &[Desc]) -> BoW {
        let mut bow: BoW = vec![0.; self.words.len()];
        for feature in features {
            bow[self.nearest(feature)] += 1.;
        }
        // Normalize BoW vector
        let sum: f32 = bow.iter().sum();
        if sum > 0. {
            let inv_sum = 1. / sum;
            for w in bow.iter_mut() {
                *w *= inv_sum;
            }
        }
        bow
    }

    /// Build a vocabulary of `k` words from a pool of descriptors.
    ///
    /// Words are k-means centroids; seeding (k-means++) uses a `StdRng` built
    /// from `seed`, so equal inputs give equal vocabularies.
    pub fn create(features: &[Desc], k: usize, seed: u64) -> BowResult<Self> {
        if k == 0 {
            return Err(BowErr::Configuration(
                "vocabulary size must be positive".to_string(),
            ));
        }
        if k > features.len() {
            return Err(BowErr::Configuration(format!(
                "cannot build {} visual words from {} descriptors",
                k,
                features.len()
            )));
        }
        let mut rng = StdRng::seed_from_u64(seed);
        let (clusters, cluster_size) = Self::cluster(features, k, &mut rng);
        Ok(Self {
            words: clusters.into_iter().map(Word).collect(),
            cluster_size,
        })
    }

    /// Index of the word closest (Euclidean) to `feature`. Ties go to the lower index.
    pub fn nearest(&self, feature: &Desc) -> usize {
        nearest(self.words.iter().map(|w| &w.0), feature)
    }

    /// Number of words.
    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    pub fn words(&self) -> impl Iterator<Item = &Desc> {
        self.words.iter().map(|w| &w.0)
    }

    /// Load a vocabulary from a file
    #[cfg(feature = "bincode")]
    pub fn load<P: AsRef<std::path::Path>>(file: P) -> BowResult<Self> {
        let mut file = std::fs::File::open(file)?;
        let mut buffer: Vec<u8> = Vec::new();
        std::io::Read::read_to_end(&mut file, &mut buffer)?;
        Ok(bincode::deserialize(&buffer)?)
    }

    /// Save vocabulary to a file
    #[cfg(feature = "bincode")]
    pub fn save<P: AsRef<std::path::Path>>(&self, file: P) -> BowResult<()> {
        let serialized = bincode::serialize(&self)?;
        let mut file = std::fs::File::create(file)?;
        std::io::Write::write_all(&mut file, &serialized)?;
        Ok(())
    }
}

/////////////////////                Helpers                 ////////////////////////
/////////////////////////////////////////////////////////////////////////////////////

#[derive(Debug, Clone, PartialEq)]
/// One visual word (cluster centroid).
struct Word(Desc);

#[derive(Serialize, Deserialize)]
/// Serde has no impls for arrays longer than 32, so words go through a Vec.
struct SerializableWord(Vec<f32>);

impl Serialize for Word {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        SerializableWord(self.0.to_vec()).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Word {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let ser = SerializableWord::deserialize(deserializer)?;
        let desc: Desc = ser.0.as_slice().try_into().map_err(|_| {
            <D::Error as serde::de::Error>::invalid_length(ser.0.len(), &"128 components")
        })?;
        Ok(Word(desc))
    }
}

impl Vocabulary {
    /// Lloyd's k-means. Returns the centroids and the number of features
    /// assigned to each of them.
    fn cluster(features: &[Desc], k: usize, rng: &mut StdRng) -> (Vec<Desc>, Vec<usize>) {
        debug!("KMeans with {} features, {} clusters", features.len(), k);
        let mut clusters = Self::initialize_clusters(features, k, rng);
        let mut groups: Vec<usize> = Vec::new();

        for iter in 0..MAX_ITER {
            let new_groups: Vec<usize> = features
                .iter()
                .map(|f| nearest(clusters.iter(), f))
                .collect();

            if groups == new_groups {
                debug!("KMeans converged after {} iterations", iter);
                break; // converged
            }

            // update clusters; an emptied cluster keeps its previous centroid
            let mut sums = vec![[0f64; DESC_LEN]; k];
            let mut counts = vec![0usize; k];
            for (f, &g) in features.iter().zip(&new_groups) {
                counts[g] += 1;
                for (s, &v) in sums[g].iter_mut().zip(f) {
                    *s += v as f64;
                }
            }
            for ((c, s), &n) in clusters.iter_mut().zip(&sums).zip(&counts) {
                if n > 0 {
                    for (cv, sv) in c.iter_mut().zip(s) {
                        *cv = (sv / n as f64) as f32;
                    }
                }
            }
            groups = new_groups;
            if iter + 1 == MAX_ITER {
                debug!("KMeans stopped after {} iterations without converging", MAX_ITER);
            }
        }

        let mut cluster_size = vec![0; k];
        for &g in &groups {
            cluster_size[g] += 1;
        }
        (clusters, cluster_size)
    }

    /// Initialize clusters for kmeans with kmeans++ seeding.
    fn initialize_clusters(features: &[Desc], k: usize, rng: &mut StdRng) -> Vec<Desc> {
        let mut clusters: Vec<Desc> = Vec::with_capacity(k);
        clusters.push(features[rng.gen_range(0..features.len())]);
        let mut dists: Vec<f32> = features.iter().map(|f| sq_dist(f, &clusters[0])).collect();

        while clusters.len() < k {
            let next = match WeightedIndex::new(&dists) {
                Ok(weights) => weights.sample(rng),
                // every feature coincides with a chosen centroid
                Err(_) => rng.gen_range(0..features.len()),
            };
            let c = features[next];
            for (d, f) in dists.iter_mut().zip(features) {
                *d = d.min(sq_dist(f, &c));
            }
            clusters.push(c);
        }
        clusters
    }
}

#[inline]
/// Squared Euclidean distance between two descriptors.
fn sq_dist(x: &Desc, y: &Desc) -> f32 {
    x.iter().zip(y).map(|(a, b)| (a - b) * (a - b)).sum()
}

fn nearest<'a>(words: impl Iterator<Item = &'a Desc>, feature: &Desc) -> usize {
    let mut best: (usize, f32) = (0, f32::INFINITY);
    for (j, w) in words.enumerate() {
        let d = sq_dist(w, feature);
        if d < best.1 {
            best = (j, d);
        }
    }
    best.0
}

impl fmt::Debug for Vocabulary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sum = self.cluster_size.iter().sum::<usize>();
        f.debug_struct("Vocabulary")
            .field("Words", &self.words.len())
            .field("Total Training Features", &sum)
            .field(
                "Min Word Cluster Size",
                &self.cluster_size.iter().min().copied().unwrap_or(0),
            )
            .field(
                "Max Word Cluster Size",
                &self.cluster_size.iter().max().copied().unwrap_or(0),
            )
            .field(
                "Mean Word Cluster Size",
                &(sum / self.cluster_size.len().max(1)),
            )
            .finish()
    }
}
