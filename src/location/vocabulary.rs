//! Flat bag-of-words vocabulary.
//!
//! Words are descriptors sampled from the reference map with a fixed seed;
//! each descriptor is quantized to its nearest word. Word weights follow the
//! usual TF-IDF scheme and bag-of-words vectors are L2-normalized so that a
//! dot product is a cosine similarity.

use std::collections::HashMap;

use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::features::Descriptor;

/// Bag-of-words vector: word_id -> weight.
pub type BowVector = HashMap<u32, f64>;

pub struct Vocabulary {
    words: Vec<Descriptor>,
    /// Inverse document frequency per word.
    idf: Vec<f64>,
}

impl Vocabulary {
    /// Sample up to `size` distinct descriptors as words.
    ///
    /// `documents` is one descriptor list per training image; it is used to
    /// compute the IDF weights.
    pub fn train(documents: &[Vec<&Descriptor>], size: usize, seed: u64) -> Self {
        let pool: Vec<&Descriptor> = documents.iter().flatten().copied().collect();
        if pool.is_empty() || size == 0 {
            return Self {
                words: Vec::new(),
                idf: Vec::new(),
            };
        }

        let mut rng = StdRng::seed_from_u64(seed);
        let amount = size.min(pool.len());
        let mut indices = rand::seq::index::sample(&mut rng, pool.len(), amount).into_vec();
        indices.sort_unstable();

        let mut words: Vec<Descriptor> = Vec::with_capacity(amount);
        for idx in indices {
            let candidate = pool[idx];
            if !words.iter().any(|w| w == candidate) {
                words.push(candidate.clone());
            }
        }

        let mut vocab = Self {
            idf: vec![0.0; words.len()],
            words,
        };

        let mut doc_freq = vec![0usize; vocab.words.len()];
        for doc in documents {
            let mut seen = vec![false; vocab.words.len()];
            for d in doc {
                if let Some(w) = vocab.quantize(d) {
                    seen[w as usize] = true;
                }
            }
            for (freq, s) in doc_freq.iter_mut().zip(seen) {
                if s {
                    *freq += 1;
                }
            }
        }

        let n_docs = documents.len().max(1) as f64;
        for (idf, &freq) in vocab.idf.iter_mut().zip(doc_freq.iter()) {
            *idf = if freq > 0 {
                (n_docs / freq as f64).ln()
            } else {
                0.0
            };
        }
        vocab
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// Nearest word to a descriptor, `None` if nothing is comparable.
    pub fn quantize(&self, descriptor: &Descriptor) -> Option<u32> {
        let mut best: Option<(u32, f32)> = None;
        for (i, w) in self.words.iter().enumerate() {
            let Some(d) = descriptor.distance(w) else {
                continue;
            };
            if best.map_or(true, |(_, bd)| d < bd) {
                best = Some((i as u32, d));
            }
        }
        best.map(|(i, _)| i)
    }

    /// TF-IDF weighted, L2-normalized bag-of-words vector.
    pub fn transform<'a, I>(&self, descriptors: I) -> BowVector
    where
        I: IntoIterator<Item = &'a Descriptor>,
    {
        let mut counts: HashMap<u32, usize> = HashMap::new();
        let mut total = 0usize;
        for d in descriptors {
            if let Some(w) = self.quantize(d) {
                *counts.entry(w).or_insert(0) += 1;
                total += 1;
            }
        }

        let mut bow = BowVector::new();
        if total == 0 {
            return bow;
        }
        for (w, c) in counts {
            let weight = (c as f64 / total as f64) * self.idf[w as usize];
            if weight > 0.0 {
                bow.insert(w, weight);
            }
        }

        let norm = bow.values().map(|v| v * v).sum::<f64>().sqrt();
        if norm > 0.0 {
            for v in bow.values_mut() {
                *v /= norm;
            }
        }
        bow
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn desc(v: u8) -> Descriptor {
        Descriptor::Binary(vec![v, v.rotate_left(3), !v])
    }

    #[test]
    fn test_train_and_quantize() {
        let a: Vec<Descriptor> = (0..8).map(desc).collect();
        let b: Vec<Descriptor> = (100..108).map(desc).collect();
        let docs = vec![a.iter().collect::<Vec<_>>(), b.iter().collect::<Vec<_>>()];

        let vocab = Vocabulary::train(&docs, 64, 1);

        assert_eq!(vocab.len(), 16);
        for d in a.iter().chain(b.iter()) {
            let w = vocab.quantize(d).unwrap();
            assert_eq!(vocab.words[w as usize], *d);
        }
    }

    #[test]
    fn test_transform_is_normalized() {
        let a: Vec<Descriptor> = (0..8).map(desc).collect();
        let b: Vec<Descriptor> = (100..108).map(desc).collect();
        let docs = vec![a.iter().collect::<Vec<_>>(), b.iter().collect::<Vec<_>>()];
        let vocab = Vocabulary::train(&docs, 64, 1);

        let bow = vocab.transform(a.iter());
        let norm: f64 = bow.values().map(|v| v * v).sum::<f64>().sqrt();
        assert!((norm - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_word_in_every_document_has_zero_weight() {
        let shared = desc(55);
        let docs = vec![vec![&shared], vec![&shared]];
        let vocab = Vocabulary::train(&docs, 4, 1);

        assert!(vocab.transform([&shared]).is_empty());
    }

    #[test]
    fn test_empty_vocabulary() {
        let vocab = Vocabulary::train(&[], 10, 1);
        assert!(vocab.is_empty());
        assert!(vocab.quantize(&desc(1)).is_none());
    }
}
