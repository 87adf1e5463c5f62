//! Differentiable spatial transforms for deformable image registration.
//!
//! The crate provides a capability trait for transforms that expose point
//! mapping together with first and second order derivatives, a combination
//! transform that chains an initial and a current transform by addition or
//! composition, and a recursive B-spline deformation transform.

pub mod error;
pub mod spatial;
pub mod grid;
pub mod transform;
pub mod config;

pub use error::{TransformError, Result};
pub use spatial::{Point, Vector, Spacing, Direction};
pub use grid::{CoefficientGrid, GridGeometry};
pub use transform::{
    AdvancedTransform, AffineTransform, BSplineEvaluation, CombinationMode, CombinationStrategy,
    CombinationTransform, RecursiveBSplineTransform, SharedTransform, TranslationTransform,
    VersorRigid3DTransform,
};
pub use config::{BSplineGridConfig, CombinationConfig};
