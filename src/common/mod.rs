//! Common types, traits, and error definitions for articulated_planning
//!
//! This module provides the foundational building blocks shared by every
//! node of a vehicle chain.

pub mod types;
pub mod traits;
pub mod error;

pub use types::*;
pub use traits::*;
pub use error::*;
