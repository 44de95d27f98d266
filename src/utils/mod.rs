//! Utility modules

pub mod visualization;

pub use visualization::{colors, PathStyle, Visualizer};
