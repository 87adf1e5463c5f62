//! Transform types and operations.
//!
//! This module provides the transform capability trait, leaf transforms,
//! the combination transform, and the recursive B-spline transform.

pub mod trait_;
pub mod translation;
pub mod affine;
pub mod versor;
pub mod bspline;
pub mod combination;
pub mod batch;
pub mod tensor;

pub use trait_::{
    AdvancedTransform, SharedTransform, Jacobian, NonZeroJacobianIndices, SpatialJacobian,
    SpatialHessian, JacobianOfSpatialJacobian, JacobianOfSpatialHessian,
};
pub use translation::TranslationTransform;
pub use affine::AffineTransform;
pub use versor::VersorRigid3DTransform;
pub use bspline::{RecursiveBSplineTransform, BSplineEvaluation};
pub use combination::{CombinationMode, CombinationStrategy, CombinationTransform};
pub use batch::{transform_points_parallel, accumulate_image_jacobian, GradientSample};
pub use tensor::Transform;
