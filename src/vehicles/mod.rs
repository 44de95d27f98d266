//! Vehicle chain nodes
//!
//! A chain is built from the inside out: the holonomic base first, then one
//! `Trailer` per hitched link, each owning the node it wraps.
//!
//! # Example
//!
//! ```no_run
//! use articulated_planning::vehicles::{build_chain, HolonomicOrient, TrailerConfig};
//! use articulated_planning::common::VehicleNode;
//!
//! let mut leaf = HolonomicOrient::with_defaults();
//! leaf.set_initial_conditions(&[0.0, 0.0, 0.0], None).unwrap();
//! let chain = build_chain(
//!     Box::new(leaf),
//!     vec![(TrailerConfig::new(0.2, 0.2), 0.0)],
//! )
//! .unwrap();
//! assert_eq!(chain.n_spl(), 4);
//! ```

pub mod holonomic_orient;
pub mod trailer;

pub use holonomic_orient::{HolonomicOrient, HolonomicOrientConfig};
pub use trailer::{Trailer, TrailerConfig};

use crate::common::{PlanningResult, VehicleNode};

/// Wrap an initialized `leaf` in one trailer per `(config, initial heading)`,
/// innermost link first
pub fn build_chain(
    leaf: Box<dyn VehicleNode>,
    links: Vec<(TrailerConfig, f64)>,
) -> PlanningResult<Box<dyn VehicleNode>> {
    links
        .into_iter()
        .try_fold(leaf, |child, (config, theta0)| {
            let mut link = Trailer::new(child, config);
            link.set_initial_conditions(&[theta0], None)?;
            Ok(Box::new(link) as Box<dyn VehicleNode>)
        })
}
