//! SparseGraph - per-camera frame sequences plus a scene point arena.
//!
//! Used both as the prebuilt reference map and as the on-disk format for
//! calibration frame sets.

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::{Frame, FrameId, PointId, ScenePoint};

#[derive(Debug, Error)]
pub enum GraphError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed graph file: {0}")]
    Codec(#[from] bincode::Error),
    #[error("feature references point {point} but the graph only has {count} points")]
    DanglingPoint { point: PointId, count: usize },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SparseGraph {
    /// camera -> segment -> frames ordered by timestamp.
    frames: Vec<Vec<Vec<Frame>>>,
    points: Vec<ScenePoint>,
}

impl SparseGraph {
    pub fn new(camera_count: usize) -> Self {
        Self {
            frames: vec![Vec::new(); camera_count],
            points: Vec::new(),
        }
    }

    pub fn camera_count(&self) -> usize {
        self.frames.len()
    }

    pub fn frame_segments(&self, camera: usize) -> &[Vec<Frame>] {
        self.frames.get(camera).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn frame_segments_mut(&mut self, camera: usize) -> &mut Vec<Vec<Frame>> {
        if camera >= self.frames.len() {
            self.frames.resize(camera + 1, Vec::new());
        }
        &mut self.frames[camera]
    }

    pub fn frame(&self, id: FrameId) -> Option<&Frame> {
        self.frames.get(id.camera)?.get(id.segment)?.get(id.frame)
    }

    /// Every frame in the graph with its id.
    pub fn frames(&self) -> impl Iterator<Item = (FrameId, &Frame)> {
        self.frames.iter().enumerate().flat_map(|(c, segments)| {
            segments.iter().enumerate().flat_map(move |(s, frames)| {
                frames
                    .iter()
                    .enumerate()
                    .map(move |(f, frame)| (FrameId::new(c, s, f), frame))
            })
        })
    }

    pub fn frame_count(&self) -> usize {
        self.frames
            .iter()
            .flat_map(|segments| segments.iter())
            .map(Vec::len)
            .sum()
    }

    pub fn points(&self) -> &[ScenePoint] {
        &self.points
    }

    pub fn point(&self, id: PointId) -> Option<&ScenePoint> {
        self.points.get(id.index())
    }

    pub fn add_point(&mut self, point: ScenePoint) -> PointId {
        let id = PointId::new(self.points.len() as u32);
        self.points.push(point);
        id
    }

    pub fn set_points(&mut self, points: Vec<ScenePoint>) {
        self.points = points;
    }

    pub fn into_parts(self) -> (Vec<Vec<Vec<Frame>>>, Vec<ScenePoint>) {
        (self.frames, self.points)
    }

    /// Check that every feature's point reference lies inside the arena.
    pub fn validate(&self) -> Result<(), GraphError> {
        let count = self.points.len();
        for (_, frame) in self.frames() {
            for feature in &frame.features {
                if let Some(point) = feature.point {
                    if point.index() >= count {
                        return Err(GraphError::DanglingPoint { point, count });
                    }
                }
            }
        }
        Ok(())
    }

    pub fn write_to_binary_file<P: AsRef<Path>>(&self, path: P) -> Result<(), GraphError> {
        let mut writer = BufWriter::new(File::create(path)?);
        bincode::serialize_into(&mut writer, self)?;
        writer.flush()?;
        Ok(())
    }

    pub fn read_from_binary_file<P: AsRef<Path>>(path: P) -> Result<Self, GraphError> {
        let reader = BufReader::new(File::open(path)?);
        let graph: SparseGraph = bincode::deserialize_from(reader)?;
        graph.validate()?;
        Ok(graph)
    }
}
