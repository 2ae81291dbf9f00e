//! Frame sets to and from the sparse graph file format.
//!
//! Frame sets are flattened into one segment per camera. Loading merges the
//! per-camera sequences back together on timestamp.

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::path::Path;

use tracing::info;

use crate::map::{Frame, SparseGraph};

use super::{CalibrationError, FrameSet, ScenePointStore};

/// Flatten frame sets and their scene points into a graph.
pub fn to_graph(frame_sets: &[FrameSet], points: &ScenePointStore, camera_count: usize) -> SparseGraph {
    let mut graph = SparseGraph::new(camera_count);
    let mut segments: Vec<Vec<Frame>> = vec![Vec::new(); camera_count];
    for set in frame_sets {
        for frame in &set.frames {
            if let Some(segment) = segments.get_mut(frame.camera_id) {
                segment.push(frame.clone());
            }
        }
    }
    for (camera, segment) in segments.into_iter().enumerate() {
        graph.frame_segments_mut(camera).push(segment);
    }
    graph.set_points(points.points().to_vec());
    graph
}

/// Rebuild frame sets by merging the first segment of every camera.
///
/// Frames sharing the smallest pending timestamp form one set, so the sets
/// come out in timestamp order.
pub fn from_graph(graph: SparseGraph) -> (Vec<FrameSet>, ScenePointStore) {
    let (frames, points) = graph.into_parts();
    let mut sequences: Vec<std::vec::IntoIter<Frame>> = frames
        .into_iter()
        .map(|segments| segments.into_iter().next().unwrap_or_default().into_iter())
        .collect();

    let mut heads: Vec<Option<Frame>> = sequences.iter_mut().map(Iterator::next).collect();
    let mut heap: BinaryHeap<Reverse<(u64, usize)>> = heads
        .iter()
        .enumerate()
        .filter_map(|(c, f)| f.as_ref().map(|f| Reverse((f.timestamp_ns, c))))
        .collect();

    let mut frame_sets = Vec::new();
    while let Some(Reverse((timestamp_ns, camera))) = heap.pop() {
        let mut cameras = vec![camera];
        while let Some(&Reverse((ts, c))) = heap.peek() {
            if ts != timestamp_ns {
                break;
            }
            heap.pop();
            cameras.push(c);
        }
        cameras.sort_unstable();

        let mut set_frames = Vec::with_capacity(cameras.len());
        for c in cameras {
            if let Some(frame) = heads[c].take() {
                set_frames.push(frame);
            }
            heads[c] = sequences[c].next();
            if let Some(next) = &heads[c] {
                heap.push(Reverse((next.timestamp_ns, c)));
            }
        }
        frame_sets.push(FrameSet::new(timestamp_ns, set_frames));
    }

    (frame_sets, ScenePointStore::from_points(points))
}

pub fn save_frame_sets<P: AsRef<Path>>(
    path: P,
    frame_sets: &[FrameSet],
    points: &ScenePointStore,
    camera_count: usize,
) -> Result<(), CalibrationError> {
    let path = path.as_ref();
    to_graph(frame_sets, points, camera_count)
        .write_to_binary_file(path)
        .map_err(|source| CalibrationError::Persistence {
            path: path.to_path_buf(),
            source,
        })?;
    info!("Saved {} frame sets to {}", frame_sets.len(), path.display());
    Ok(())
}

pub fn load_frame_sets<P: AsRef<Path>>(path: P) -> Result<(Vec<FrameSet>, ScenePointStore), CalibrationError> {
    let path = path.as_ref();
    let graph = SparseGraph::read_from_binary_file(path).map_err(|source| CalibrationError::Persistence {
        path: path.to_path_buf(),
        source,
    })?;
    let (frame_sets, points) = from_graph(graph);
    info!(
        "Loaded {} frame sets and {} scene points from {}",
        frame_sets.len(),
        points.len(),
        path.display()
    );
    Ok((frame_sets, points))
}
