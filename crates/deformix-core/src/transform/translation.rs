//! Translation transform implementation.

use std::sync::Arc;
use crate::error::{Result, TransformError};
use crate::spatial::{Point, Vector};
use super::trait_::{
    reset_jacobian, identity_indices, zero_spatial_hessian, AdvancedTransform, Jacobian,
    JacobianOfSpatialHessian, JacobianOfSpatialJacobian, NonZeroJacobianIndices,
    SharedTransform, SpatialHessian, SpatialJacobian,
};

/// Simple Translation Transform.
///
/// Translates points by a fixed offset vector: `T(x) = x + t`.
/// The parameters are the components of `t`.
#[derive(Debug, Clone, PartialEq)]
pub struct TranslationTransform<const D: usize> {
    translation: Vector<D>,
}

impl<const D: usize> TranslationTransform<D> {
    /// Create a new translation transform.
    pub fn new(translation: Vector<D>) -> Self {
        Self { translation }
    }

    /// Zero translation.
    pub fn identity() -> Self {
        Self::new(Vector::zeros())
    }

    /// Get the translation vector.
    pub fn translation(&self) -> &Vector<D> {
        &self.translation
    }
}

impl<const D: usize> Default for TranslationTransform<D> {
    fn default() -> Self {
        Self::identity()
    }
}

impl<const D: usize> AdvancedTransform<D> for TranslationTransform<D> {
    fn number_of_parameters(&self) -> Result<usize> {
        Ok(D)
    }

    fn parameters(&self) -> Result<Vec<f64>> {
        Ok(self.translation.to_array().to_vec())
    }

    fn set_parameters(&mut self, parameters: &[f64]) -> Result<()> {
        TransformError::check_parameter_count(D, parameters.len())?;
        self.translation = Vector::new(std::array::from_fn(|i| parameters[i]));
        Ok(())
    }

    fn number_of_nonzero_jacobian_indices(&self) -> Result<usize> {
        Ok(D)
    }

    fn is_linear(&self) -> bool {
        true
    }

    fn has_nonzero_spatial_hessian(&self) -> Result<bool> {
        Ok(false)
    }

    fn transform_point(&self, point: &Point<D>) -> Result<Point<D>> {
        Ok(*point + self.translation)
    }

    fn jacobian(
        &self,
        _point: &Point<D>,
        jacobian: &mut Jacobian,
        nonzero_indices: &mut NonZeroJacobianIndices,
    ) -> Result<()> {
        reset_jacobian(jacobian, D, D);
        jacobian.fill_with_identity();
        identity_indices(nonzero_indices, D);
        Ok(())
    }

    fn evaluate_jacobian_with_image_gradient_product(
        &self,
        _point: &Point<D>,
        moving_image_gradient: &Vector<D>,
        image_jacobian: &mut Vec<f64>,
        nonzero_indices: &mut NonZeroJacobianIndices,
    ) -> Result<()> {
        image_jacobian.clear();
        image_jacobian.extend_from_slice(&moving_image_gradient.to_array());
        identity_indices(nonzero_indices, D);
        Ok(())
    }

    fn spatial_jacobian(&self, _point: &Point<D>) -> Result<SpatialJacobian<D>> {
        Ok(SpatialJacobian::identity())
    }

    fn spatial_hessian(&self, _point: &Point<D>) -> Result<SpatialHessian<D>> {
        Ok(zero_spatial_hessian())
    }

    fn jacobian_of_spatial_jacobian(
        &self,
        _point: &Point<D>,
        jsj: &mut JacobianOfSpatialJacobian<D>,
        nonzero_indices: &mut NonZeroJacobianIndices,
    ) -> Result<()> {
        jsj.clear();
        jsj.resize(D, SpatialJacobian::zeros());
        identity_indices(nonzero_indices, D);
        Ok(())
    }

    fn jacobian_of_spatial_hessian(
        &self,
        _point: &Point<D>,
        jsh: &mut JacobianOfSpatialHessian<D>,
        nonzero_indices: &mut NonZeroJacobianIndices,
    ) -> Result<()> {
        jsh.clear();
        jsh.resize(D, zero_spatial_hessian());
        identity_indices(nonzero_indices, D);
        Ok(())
    }

    fn inverse(&self) -> Result<Option<SharedTransform<D>>> {
        Ok(Some(Arc::new(Self::new(-self.translation))))
    }
}
