//! Affine transform implementation.
//!
//! This module provides an affine transform (linear transformation + translation).

use std::sync::Arc;
use nalgebra::SMatrix;
use crate::error::{Result, TransformError};
use crate::spatial::{Point, Vector};
use super::trait_::{
    reset_jacobian, identity_indices, zero_spatial_hessian, AdvancedTransform, Jacobian,
    JacobianOfSpatialHessian, JacobianOfSpatialJacobian, NonZeroJacobianIndices,
    SharedTransform, SpatialHessian, SpatialJacobian,
};

/// Affine Transform (Linear transformation + Translation).
///
/// Represents a general affine transformation with a fixed center:
/// T(x) = A(x - c) + c + t
///
/// where:
/// * A is a D×D matrix (linear transformation: rotation, scale, shear)
/// * t is a D-dimensional translation vector
/// * c is a D-dimensional fixed center of rotation/scaling
///
/// Parameters are the entries of A in row-major order followed by t.
/// The center is fixed and not part of the parameter vector.
#[derive(Debug, Clone, PartialEq)]
pub struct AffineTransform<const D: usize> {
    matrix: SMatrix<f64, D, D>,
    translation: Vector<D>,
    center: Point<D>,
}

impl<const D: usize> AffineTransform<D> {
    /// Create a new affine transform.
    pub fn new(matrix: SMatrix<f64, D, D>, translation: Vector<D>, center: Point<D>) -> Self {
        Self {
            matrix,
            translation,
            center,
        }
    }

    /// Create an identity affine transform around `center`.
    pub fn identity(center: Point<D>) -> Self {
        Self::new(SMatrix::identity(), Vector::zeros(), center)
    }

    /// Get the transformation matrix.
    pub fn matrix(&self) -> &SMatrix<f64, D, D> {
        &self.matrix
    }

    /// Get the translation vector.
    pub fn translation(&self) -> &Vector<D> {
        &self.translation
    }

    /// Get the center of rotation.
    pub fn center(&self) -> &Point<D> {
        &self.center
    }
}

impl<const D: usize> AdvancedTransform<D> for AffineTransform<D> {
    fn number_of_parameters(&self) -> Result<usize> {
        Ok(D * D + D)
    }

    fn parameters(&self) -> Result<Vec<f64>> {
        let mut parameters = Vec::with_capacity(D * D + D);
        for row in 0..D {
            for col in 0..D {
                parameters.push(self.matrix[(row, col)]);
            }
        }
        parameters.extend_from_slice(&self.translation.to_array());
        Ok(parameters)
    }

    fn set_parameters(&mut self, parameters: &[f64]) -> Result<()> {
        TransformError::check_parameter_count(D * D + D, parameters.len())?;
        self.matrix = SMatrix::from_fn(|row, col| parameters[row * D + col]);
        self.translation = Vector::new(std::array::from_fn(|i| parameters[D * D + i]));
        Ok(())
    }

    fn number_of_nonzero_jacobian_indices(&self) -> Result<usize> {
        Ok(D * D + D)
    }

    fn is_linear(&self) -> bool {
        true
    }

    fn has_nonzero_spatial_hessian(&self) -> Result<bool> {
        Ok(false)
    }

    fn transform_point(&self, point: &Point<D>) -> Result<Point<D>> {
        let centered = *point - self.center;
        Ok(self.center + Vector(self.matrix * centered.0) + self.translation)
    }

    fn jacobian(
        &self,
        point: &Point<D>,
        jacobian: &mut Jacobian,
        nonzero_indices: &mut NonZeroJacobianIndices,
    ) -> Result<()> {
        let n = D * D + D;
        reset_jacobian(jacobian, D, n);
        let centered = *point - self.center;

        // dT_i / dA_ij = (x - c)_j, dT_i / dt_i = 1
        for row in 0..D {
            for col in 0..D {
                jacobian[(row, row * D + col)] = centered[col];
            }
            jacobian[(row, D * D + row)] = 1.0;
        }
        identity_indices(nonzero_indices, n);
        Ok(())
    }

    fn spatial_jacobian(&self, _point: &Point<D>) -> Result<SpatialJacobian<D>> {
        Ok(self.matrix)
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
        let n = D * D + D;
        jsj.clear();
        jsj.resize(n, SpatialJacobian::zeros());
        for row in 0..D {
            for col in 0..D {
                jsj[row * D + col][(row, col)] = 1.0;
            }
        }
        identity_indices(nonzero_indices, n);
        Ok(())
    }

    fn jacobian_of_spatial_hessian(
        &self,
        _point: &Point<D>,
        jsh: &mut JacobianOfSpatialHessian<D>,
        nonzero_indices: &mut NonZeroJacobianIndices,
    ) -> Result<()> {
        let n = D * D + D;
        jsh.clear();
        jsh.resize(n, zero_spatial_hessian());
        identity_indices(nonzero_indices, n);
        Ok(())
    }

    fn inverse(&self) -> Result<Option<SharedTransform<D>>> {
        // x = A^-1 (y - c) + c - A^-1 t
        let Some(inverse_matrix) = self.matrix.try_inverse() else {
            return Ok(None);
        };
        let translation = Vector(-(inverse_matrix * self.translation.0));
        Ok(Some(Arc::new(Self::new(inverse_matrix, translation, self.center))))
    }
}
