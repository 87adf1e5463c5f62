//! Versor rigid transform implementation.
//!
//! This module provides a versor rigid transform (unit quaternion rotation + translation).
//! It is robust against gimbal lock and is suitable for 3D registration.

use std::sync::Arc;
use nalgebra::Matrix3;
use crate::error::{Result, TransformError};
use crate::spatial::{Point, Vector};
use super::trait_::{
    identity_indices, reset_jacobian, zero_spatial_hessian, AdvancedTransform, Jacobian,
    JacobianOfSpatialHessian, JacobianOfSpatialJacobian, NonZeroJacobianIndices,
    SharedTransform, SpatialHessian, SpatialJacobian,
};

const NUMBER_OF_PARAMETERS: usize = 6;

/// Versor Rigid Transform (Versor Rotation + Translation).
///
/// Supports 3D only.
/// Includes a fixed center of rotation: T(x) = R(x - c) + c + t
///
/// Parameters are `[vx, vy, vz, tx, ty, tz]`, where `(vx, vy, vz)` is the
/// vector part of a unit quaternion. The scalar part is implied:
/// `w = sqrt(1 - |v|^2)`.
#[derive(Debug, Clone, PartialEq)]
pub struct VersorRigid3DTransform {
    versor: [f64; 3],
    translation: Vector<3>,
    center: Point<3>,
}

impl VersorRigid3DTransform {
    /// Create a new versor rigid transform.
    ///
    /// # Arguments
    /// * `versor` - Vector part of the rotation quaternion (x, y, z)
    /// * `translation` - Translation vector
    /// * `center` - Fixed center of rotation
    pub fn new(versor: [f64; 3], translation: Vector<3>, center: Point<3>) -> Self {
        Self {
            versor,
            translation,
            center,
        }
    }

    /// Rotation of `angle` radians about `axis`.
    pub fn from_axis_angle(axis: [f64; 3], angle: f64, translation: Vector<3>, center: Point<3>) -> Self {
        let norm = (axis[0] * axis[0] + axis[1] * axis[1] + axis[2] * axis[2]).sqrt();
        let s = if norm > 0.0 { (angle * 0.5).sin() / norm } else { 0.0 };
        Self::new([axis[0] * s, axis[1] * s, axis[2] * s], translation, center)
    }

    /// Identity rotation about `center`.
    pub fn identity(center: Point<3>) -> Self {
        Self::new([0.0; 3], Vector::zeros(), center)
    }

    /// Get the vector part of the versor.
    pub fn versor(&self) -> [f64; 3] {
        self.versor
    }

    /// Get the translation vector.
    pub fn translation(&self) -> &Vector<3> {
        &self.translation
    }

    /// Get the center of rotation.
    pub fn center(&self) -> &Point<3> {
        &self.center
    }

    /// Unit quaternion `(x, y, z, w)`.
    fn quaternion(&self) -> (f64, f64, f64, f64) {
        let [mut x, mut y, mut z] = self.versor;
        let norm = (x * x + y * y + z * z).sqrt();
        // A vector part of norm >= 1 has no real scalar part; clamp onto the unit sphere.
        if norm >= 1.0 - 1e-10 {
            let scale = norm + f64::EPSILON * norm;
            x /= scale;
            y /= scale;
            z /= scale;
        }
        let w = (1.0 - (x * x + y * y + z * z)).max(0.0).sqrt();
        (x, y, z, w)
    }

    /// Build the rotation matrix from the versor.
    pub fn rotation_matrix(&self) -> Matrix3<f64> {
        let (x, y, z, w) = self.quaternion();
        Matrix3::new(
            1.0 - 2.0 * (y * y + z * z), 2.0 * (x * y - z * w), 2.0 * (x * z + y * w),
            2.0 * (x * y + z * w), 1.0 - 2.0 * (x * x + z * z), 2.0 * (y * z - x * w),
            2.0 * (x * z - y * w), 2.0 * (y * z + x * w), 1.0 - 2.0 * (x * x + y * y),
        )
    }

    /// Derivative of the rotation matrix with respect to each versor component.
    fn rotation_derivatives(&self) -> [Matrix3<f64>; 3] {
        let (x, y, z, w) = self.quaternion();
        let d_x = Matrix3::new(
            0.0, 2.0 * y, 2.0 * z,
            2.0 * y, -4.0 * x, -2.0 * w,
            2.0 * z, 2.0 * w, -4.0 * x,
        );
        let d_y = Matrix3::new(
            -4.0 * y, 2.0 * x, 2.0 * w,
            2.0 * x, 0.0, 2.0 * z,
            -2.0 * w, 2.0 * z, -4.0 * y,
        );
        let d_z = Matrix3::new(
            -4.0 * z, -2.0 * w, 2.0 * x,
            2.0 * w, -4.0 * z, 2.0 * y,
            2.0 * x, 2.0 * y, 0.0,
        );
        let d_w = Matrix3::new(
            0.0, -2.0 * z, 2.0 * y,
            2.0 * z, 0.0, -2.0 * x,
            -2.0 * y, 2.0 * x, 0.0,
        );

        // w depends on the vector part: dw/dv_k = -v_k / w
        let w_safe = w.max(1e-12);
        [
            d_x - d_w * (x / w_safe),
            d_y - d_w * (y / w_safe),
            d_z - d_w * (z / w_safe),
        ]
    }
}

impl Default for VersorRigid3DTransform {
    fn default() -> Self {
        Self::identity(Point::origin())
    }
}

impl AdvancedTransform<3> for VersorRigid3DTransform {
    fn number_of_parameters(&self) -> Result<usize> {
        Ok(NUMBER_OF_PARAMETERS)
    }

    fn parameters(&self) -> Result<Vec<f64>> {
        let [vx, vy, vz] = self.versor;
        let [tx, ty, tz] = self.translation.to_array();
        Ok(vec![vx, vy, vz, tx, ty, tz])
    }

    fn set_parameters(&mut self, parameters: &[f64]) -> Result<()> {
        TransformError::check_parameter_count(NUMBER_OF_PARAMETERS, parameters.len())?;
        self.versor = [parameters[0], parameters[1], parameters[2]];
        self.translation = Vector::new([parameters[3], parameters[4], parameters[5]]);
        Ok(())
    }

    fn number_of_nonzero_jacobian_indices(&self) -> Result<usize> {
        Ok(NUMBER_OF_PARAMETERS)
    }

    fn is_linear(&self) -> bool {
        true
    }

    fn has_nonzero_spatial_hessian(&self) -> Result<bool> {
        Ok(false)
    }

    fn transform_point(&self, point: &Point<3>) -> Result<Point<3>> {
        let centered = *point - self.center;
        Ok(self.center + Vector(self.rotation_matrix() * centered.0) + self.translation)
    }

    fn jacobian(
        &self,
        point: &Point<3>,
        jacobian: &mut Jacobian,
        nonzero_indices: &mut NonZeroJacobianIndices,
    ) -> Result<()> {
        reset_jacobian(jacobian, 3, NUMBER_OF_PARAMETERS);
        let centered = (*point - self.center).0;

        for (k, derivative) in self.rotation_derivatives().iter().enumerate() {
            jacobian.column_mut(k).copy_from(&(derivative * centered));
        }
        for d in 0..3 {
            jacobian[(d, 3 + d)] = 1.0;
        }
        identity_indices(nonzero_indices, NUMBER_OF_PARAMETERS);
        Ok(())
    }

    fn spatial_jacobian(&self, _point: &Point<3>) -> Result<SpatialJacobian<3>> {
        Ok(self.rotation_matrix())
    }

    fn spatial_hessian(&self, _point: &Point<3>) -> Result<SpatialHessian<3>> {
        Ok(zero_spatial_hessian())
    }

    fn jacobian_of_spatial_jacobian(
        &self,
        _point: &Point<3>,
        jsj: &mut JacobianOfSpatialJacobian<3>,
        nonzero_indices: &mut NonZeroJacobianIndices,
    ) -> Result<()> {
        jsj.clear();
        jsj.extend(self.rotation_derivatives());
        jsj.resize(NUMBER_OF_PARAMETERS, SpatialJacobian::zeros());
        identity_indices(nonzero_indices, NUMBER_OF_PARAMETERS);
        Ok(())
    }

    fn jacobian_of_spatial_hessian(
        &self,
        _point: &Point<3>,
        jsh: &mut JacobianOfSpatialHessian<3>,
        nonzero_indices: &mut NonZeroJacobianIndices,
    ) -> Result<()> {
        jsh.clear();
        jsh.resize(NUMBER_OF_PARAMETERS, zero_spatial_hessian());
        identity_indices(nonzero_indices, NUMBER_OF_PARAMETERS);
        Ok(())
    }

    fn inverse(&self) -> Result<Option<SharedTransform<3>>> {
        // x = R^T (y - c) + c - R^T t
        let rotation_t = self.rotation_matrix().transpose();
        let translation = Vector(-(rotation_t * self.translation.0));
        let (x, y, z, _) = self.quaternion();
        Ok(Some(Arc::new(Self::new([-x, -y, -z], translation, self.center))))
    }
}
