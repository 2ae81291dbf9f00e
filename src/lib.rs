pub mod calibration;
pub mod camera;
pub mod features;
pub mod geometry;
pub mod io;
pub mod location;
pub mod map;
pub mod optimizer;
