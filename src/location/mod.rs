//! Place recognition against the reference map.

pub mod database;
pub mod vocabulary;

pub use database::{Candidate, FrameDatabase};
pub use vocabulary::{BowVector, Vocabulary};

use rayon::prelude::*;
use tracing::info;

use crate::map::{Frame, FrameId, SparseGraph};

/// Given a frame's descriptors, rank previously mapped frames by similarity.
pub trait PlaceRecognizer: Send + Sync {
    fn knn_match(&self, frame: &Frame, k: usize) -> Vec<FrameId>;
}

/// Bag-of-words place recognition over every frame of a reference graph.
pub struct LocationRecognition {
    vocabulary: Vocabulary,
    database: FrameDatabase,
}

impl LocationRecognition {
    pub fn setup(graph: &SparseGraph, vocabulary_size: usize, seed: u64) -> Self {
        let frames: Vec<(FrameId, &Frame)> = graph.frames().collect();
        let documents: Vec<Vec<_>> = frames
            .iter()
            .map(|(_, f)| f.features.iter().map(|feat| &feat.descriptor).collect())
            .collect();

        let vocabulary = Vocabulary::train(&documents, vocabulary_size, seed);

        let bows: Vec<BowVector> = documents
            .par_iter()
            .map(|doc| vocabulary.transform(doc.iter().copied()))
            .collect();

        let mut database = FrameDatabase::new();
        for ((id, _), bow) in frames.iter().zip(bows) {
            database.add(*id, bow);
        }

        info!(
            "Location recognition ready: {} words, {} frames",
            vocabulary.len(),
            database.len()
        );

        Self {
            vocabulary,
            database,
        }
    }
}

impl PlaceRecognizer for LocationRecognition {
    fn knn_match(&self, frame: &Frame, k: usize) -> Vec<FrameId> {
        let query = self
            .vocabulary
            .transform(frame.features.iter().map(|f| &f.descriptor));
        self.database
            .detect_candidates(&query, k)
            .into_iter()
            .map(|c| c.frame_id)
            .collect()
    }
}
