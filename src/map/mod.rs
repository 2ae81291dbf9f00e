//! Map structures shared by the reference map and the calibration state.

pub mod frame;
pub mod scene_point;
pub mod sparse_graph;
pub mod types;

pub use frame::{Feature2D, Frame};
pub use scene_point::{Observation, ScenePoint};
pub use sparse_graph::{GraphError, SparseGraph};
pub use types::{FrameId, PointId};
