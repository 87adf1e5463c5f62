//! Transform capability trait.
//!
//! Every transform maps points from the fixed space to the moving space and
//! answers derivative queries with respect to both space and parameters.
//! Parameter derivatives are sparse: each query returning them also fills an
//! ordered list of the parameter indices the values belong to.

use std::sync::Arc;
use nalgebra::{DMatrix, SMatrix};
use crate::error::Result;
use crate::spatial::{Point, Vector};
use super::combination::CombinationTransform;

/// Derivative of the output point with respect to the input point.
pub type SpatialJacobian<const D: usize> = SMatrix<f64, D, D>;

/// Second derivative of each output coordinate with respect to the input point.
pub type SpatialHessian<const D: usize> = [SMatrix<f64, D, D>; D];

/// Derivative of the spatial Jacobian with respect to each nonzero parameter.
pub type JacobianOfSpatialJacobian<const D: usize> = Vec<SpatialJacobian<D>>;

/// Derivative of the spatial Hessian with respect to each nonzero parameter.
pub type JacobianOfSpatialHessian<const D: usize> = Vec<SpatialHessian<D>>;

/// Parameter Jacobian of shape `[D, nonzero parameters]`.
pub type Jacobian = DMatrix<f64>;

/// Parameter indices whose derivatives are nonzero at a point.
pub type NonZeroJacobianIndices = Vec<usize>;

/// Shared, immutable handle to a transform.
pub type SharedTransform<const D: usize> = Arc<dyn AdvancedTransform<D>>;

/// Spatial Hessian with all entries zero.
pub fn zero_spatial_hessian<const D: usize>() -> SpatialHessian<D> {
    [SMatrix::zeros(); D]
}

/// Resize a Jacobian buffer to `rows x cols` and clear it.
///
/// Reallocates only when the shape changes.
pub fn reset_jacobian(jacobian: &mut Jacobian, rows: usize, cols: usize) {
    if jacobian.nrows() != rows || jacobian.ncols() != cols {
        *jacobian = DMatrix::zeros(rows, cols);
    } else {
        jacobian.fill(0.0);
    }
}

/// Fill `indices` with `0..count`.
pub fn identity_indices(indices: &mut NonZeroJacobianIndices, count: usize) {
    indices.clear();
    indices.extend(0..count);
}

/// Capability set of a differentiable spatial transform.
///
/// # Type Parameters
/// * `D` - The spatial dimensionality
///
/// Evaluation methods take `&self` and must be safe to call from many threads
/// at once. Mutation (`set_parameters`) takes `&mut self`, so a transform can
/// only be reconfigured while nobody is evaluating it.
pub trait AdvancedTransform<const D: usize>: Send + Sync + std::fmt::Debug {
    /// Number of transform parameters.
    fn number_of_parameters(&self) -> Result<usize>;

    /// Current parameter vector.
    fn parameters(&self) -> Result<Vec<f64>>;

    /// Replace the parameter vector.
    fn set_parameters(&mut self, parameters: &[f64]) -> Result<()>;

    /// Number of parameters that can have a nonzero derivative at one point.
    fn number_of_nonzero_jacobian_indices(&self) -> Result<usize>;

    /// True when the transform is an affine map.
    fn is_linear(&self) -> bool;

    /// True when the spatial Hessian can be nonzero.
    fn has_nonzero_spatial_hessian(&self) -> Result<bool>;

    /// True when the Jacobian of the spatial Hessian can be nonzero.
    fn has_nonzero_jacobian_of_spatial_hessian(&self) -> Result<bool> {
        self.has_nonzero_spatial_hessian()
    }

    /// Map a point from the fixed space to the moving space.
    fn transform_point(&self, point: &Point<D>) -> Result<Point<D>>;

    /// Sparse derivative of the output point with respect to the parameters.
    fn jacobian(
        &self,
        point: &Point<D>,
        jacobian: &mut Jacobian,
        nonzero_indices: &mut NonZeroJacobianIndices,
    ) -> Result<()>;

    /// Product of the parameter Jacobian with a moving image gradient.
    ///
    /// `image_jacobian[k]` is `sum_d gradient[d] * J[d, k]` for the k-th entry
    /// of `nonzero_indices`.
    fn evaluate_jacobian_with_image_gradient_product(
        &self,
        point: &Point<D>,
        moving_image_gradient: &Vector<D>,
        image_jacobian: &mut Vec<f64>,
        nonzero_indices: &mut NonZeroJacobianIndices,
    ) -> Result<()> {
        let mut jacobian = Jacobian::zeros(D, 0);
        self.jacobian(point, &mut jacobian, nonzero_indices)?;

        image_jacobian.clear();
        image_jacobian.extend(
            jacobian
                .column_iter()
                .map(|column| column.dot(&moving_image_gradient.0)),
        );
        Ok(())
    }

    /// Derivative of the output point with respect to the input point.
    fn spatial_jacobian(&self, point: &Point<D>) -> Result<SpatialJacobian<D>>;

    /// Second derivatives of each output coordinate.
    fn spatial_hessian(&self, point: &Point<D>) -> Result<SpatialHessian<D>>;

    /// Derivative of the spatial Jacobian with respect to the nonzero parameters.
    fn jacobian_of_spatial_jacobian(
        &self,
        point: &Point<D>,
        jsj: &mut JacobianOfSpatialJacobian<D>,
        nonzero_indices: &mut NonZeroJacobianIndices,
    ) -> Result<()>;

    /// Spatial Jacobian together with its parameter derivative.
    fn jacobian_of_spatial_jacobian_with_spatial_jacobian(
        &self,
        point: &Point<D>,
        sj: &mut SpatialJacobian<D>,
        jsj: &mut JacobianOfSpatialJacobian<D>,
        nonzero_indices: &mut NonZeroJacobianIndices,
    ) -> Result<()> {
        *sj = self.spatial_jacobian(point)?;
        self.jacobian_of_spatial_jacobian(point, jsj, nonzero_indices)
    }

    /// Derivative of the spatial Hessian with respect to the nonzero parameters.
    fn jacobian_of_spatial_hessian(
        &self,
        point: &Point<D>,
        jsh: &mut JacobianOfSpatialHessian<D>,
        nonzero_indices: &mut NonZeroJacobianIndices,
    ) -> Result<()>;

    /// Spatial Hessian together with its parameter derivative.
    fn jacobian_of_spatial_hessian_with_spatial_hessian(
        &self,
        point: &Point<D>,
        sh: &mut SpatialHessian<D>,
        jsh: &mut JacobianOfSpatialHessian<D>,
        nonzero_indices: &mut NonZeroJacobianIndices,
    ) -> Result<()> {
        *sh = self.spatial_hessian(point)?;
        self.jacobian_of_spatial_hessian(point, jsh, nonzero_indices)
    }

    /// Inverse transform, or `None` when no closed form exists.
    fn inverse(&self) -> Result<Option<SharedTransform<D>>> {
        Ok(None)
    }

    /// Downcast used to walk chains of nested combination transforms.
    fn as_combination(&self) -> Option<&CombinationTransform<D>> {
        None
    }
}
