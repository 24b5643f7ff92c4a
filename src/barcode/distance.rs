use itertools::Itertools;

use crate::runtime::Error;

///////////////////////////////
/// Precomputed pairwise Hamming distances over a finalized barcode registry.
///
/// Built once by `load` after the registry is frozen, immutable afterwards.
/// The upper triangle holds the pairwise distance; the lower triangle holds
/// the Shannon error-correction bound for that pair, `(d - 1) / 2`.
#[derive(Clone, Debug)]
pub struct DistanceMatrix {
    words: Vec<Vec<u8>>,
    width: usize,
    matrix: Vec<u32>,
    min_distance: u32,
    shannon_bound: u32,
    mean_distance: Vec<f64>,
}

impl DistanceMatrix {
    ///////////////////////////////
    /// Build the matrix from the registry's concatenated code words.
    /// All words must share one width; anything else is a configuration
    /// error, rejected before the run starts.
    pub fn load(words: Vec<Vec<u8>>) -> Result<DistanceMatrix, Error> {
        if words.is_empty() {
            return Err(Error::config("barcode registry is empty"));
        }
        let width = words[0].len();
        if width == 0 {
            return Err(Error::config("barcode registry contains an empty word"));
        }
        for (i, w) in words.iter().enumerate() {
            if w.len() != width {
                return Err(Error::config(format!(
                    "barcode word {} has width {} but the registry width is {}",
                    i,
                    w.len(),
                    width
                )));
            }
        }

        let n = words.len();
        let mut matrix = vec![0u32; n * n];
        let mut min_distance = u32::MAX;
        let mut mean_distance = vec![0.0f64; n];

        for (i, j) in (0..n).tuple_combinations() {
            let d = hamming(&words[i], &words[j]);
            matrix[i * n + j] = d;
            matrix[j * n + i] = d.saturating_sub(1) / 2;
            if d < min_distance {
                min_distance = d;
            }
            mean_distance[i] += d as f64;
            mean_distance[j] += d as f64;
        }

        if n == 1 {
            // a single-entry registry can correct anything up to its width
            min_distance = width as u32;
        }
        let shannon_bound = min_distance.saturating_sub(1) / 2;
        if n > 1 {
            for m in mean_distance.iter_mut() {
                *m /= (n - 1) as f64;
            }
        }

        Ok(DistanceMatrix {
            words,
            width,
            matrix,
            min_distance,
            shannon_bound,
            mean_distance,
        })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.words.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    /// Pairwise distance; symmetric in the Hamming sense regardless of
    /// argument order.
    #[inline]
    pub fn distance(&self, i: usize, j: usize) -> u32 {
        let n = self.words.len();
        if i == j {
            0
        } else if i < j {
            self.matrix[i * n + j]
        } else {
            self.matrix[j * n + i]
        }
    }

    /// Shannon bound of one pair, stored in the lower triangle.
    #[inline]
    pub fn pair_shannon_bound(&self, i: usize, j: usize) -> u32 {
        let n = self.words.len();
        if i == j {
            0
        } else if i < j {
            self.matrix[j * n + i]
        } else {
            self.matrix[i * n + j]
        }
    }

    #[inline]
    pub fn min_distance(&self) -> u32 {
        self.min_distance
    }

    /// How many errors the registry can always correct: `(min_d - 1) / 2`.
    #[inline]
    pub fn shannon_bound(&self) -> u32 {
        self.shannon_bound
    }

    #[inline]
    pub fn mean_distance(&self, i: usize) -> f64 {
        self.mean_distance[i]
    }
}

#[inline]
fn hamming(a: &[u8], b: &[u8]) -> u32 {
    a.iter().zip(b.iter()).filter(|(x, y)| x != y).count() as u32
}
