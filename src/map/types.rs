//! Core ID types for the map structures.

use serde::{Deserialize, Serialize};

/// Index of a scene point in a point arena.
///
/// Used instead of shared pointers so that features, frames and the
/// deduplication table can refer to points without reference cycles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PointId(pub u32);

impl PointId {
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl std::fmt::Display for PointId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "P{}", self.0)
    }
}

/// Location of a frame inside a [`SparseGraph`](super::SparseGraph):
/// camera, segment within that camera, frame within the segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FrameId {
    pub camera: usize,
    pub segment: usize,
    pub frame: usize,
}

impl FrameId {
    pub fn new(camera: usize, segment: usize, frame: usize) -> Self {
        Self {
            camera,
            segment,
            frame,
        }
    }
}

impl std::fmt::Display for FrameId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "cam{}/seg{}/F{}", self.camera, self.segment, self.frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_point_id_display() {
        assert_eq!(format!("{}", PointId::new(123)), "P123");
    }

    #[test]
    fn test_frame_id_display() {
        assert_eq!(format!("{}", FrameId::new(2, 0, 17)), "cam2/seg0/F17");
    }

    #[test]
    fn test_id_as_hashmap_key() {
        use std::collections::HashMap;

        let mut map: HashMap<PointId, &str> = HashMap::new();
        map.insert(PointId::new(1), "first");
        map.insert(PointId::new(2), "second");

        assert_eq!(map.get(&PointId::new(1)), Some(&"first"));
        assert_eq!(map.get(&PointId::new(3)), None);
    }
}
