//! Control point grids.
//!
//! A grid geometry describes how lattice indices map to physical space; a
//! coefficient grid is one scalar field stored on that lattice.

pub mod geometry;
pub mod coefficients;

pub use geometry::{GridGeometry, ContinuousIndex};
pub use coefficients::CoefficientGrid;
