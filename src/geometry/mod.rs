//! Vehicle shapes used for outlines and hitch connectors

pub mod shape;

pub use shape::{segment, Shape};
