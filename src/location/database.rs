//! FrameDatabase - inverted-index place recognition over reference frames.

use std::collections::HashMap;

use crate::map::FrameId;

use super::vocabulary::BowVector;

/// Candidate frame with similarity score.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub frame_id: FrameId,
    pub score: f64,
}

/// Bag-of-words vectors of reference frames with an inverted index.
pub struct FrameDatabase {
    entries: Vec<(FrameId, BowVector)>,
    /// word_id -> indices into `entries` containing that word.
    inverted: HashMap<u32, Vec<usize>>,
}

impl FrameDatabase {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            inverted: HashMap::new(),
        }
    }

    pub fn add(&mut self, frame_id: FrameId, bow: BowVector) {
        let idx = self.entries.len();
        for word in bow.keys() {
            self.inverted.entry(*word).or_default().push(idx);
        }
        self.entries.push((frame_id, bow));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Frames similar to the query, sorted by decreasing dot-product score.
    pub fn detect_candidates(&self, query: &BowVector, max_results: usize) -> Vec<Candidate> {
        let mut scores: HashMap<usize, f64> = HashMap::new();
        for (word, weight) in query {
            let Some(postings) = self.inverted.get(word) else {
                continue;
            };
            for &idx in postings {
                if let Some(other_w) = self.entries[idx].1.get(word) {
                    *scores.entry(idx).or_insert(0.0) += weight * other_w;
                }
            }
        }

        let mut cands: Vec<Candidate> = scores
            .into_iter()
            .filter(|(_, score)| *score > 0.0)
            .map(|(idx, score)| Candidate {
                frame_id: self.entries[idx].0,
                score,
            })
            .collect();

        // Ties fall back to frame order so results are reproducible.
        cands.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| {
                    (a.frame_id.camera, a.frame_id.segment, a.frame_id.frame).cmp(&(
                        b.frame_id.camera,
                        b.frame_id.segment,
                        b.frame_id.frame,
                    ))
                })
        });
        cands.truncate(max_results);
        cands
    }
}

impl Default for FrameDatabase {
    fn default() -> Self {
        Self::new()
    }
}
