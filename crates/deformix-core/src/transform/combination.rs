//! Combination transform implementation.
//!
//! This module combines an initial transform `T0` and a current transform
//! `T1` into a single transform, either by composition
//! `T(x) = T1(T0(x))` or by addition `T(x) = T1(x) + T0(x) - x`.
//! Only the current transform is parameterized; the initial transform is
//! held fixed.

use std::sync::Arc;
use serde::{Serialize, Deserialize};
use crate::error::{Result, TransformError};
use crate::spatial::{Point, Vector};
use super::trait_::{
    zero_spatial_hessian, AdvancedTransform, Jacobian, JacobianOfSpatialHessian,
    JacobianOfSpatialJacobian, NonZeroJacobianIndices, SharedTransform, SpatialHessian,
    SpatialJacobian,
};

/// Rule used to combine the initial and current transforms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CombinationMode {
    /// `T(x) = T1(x) + T0(x) - x`
    Addition,
    /// `T(x) = T1(T0(x))`
    #[default]
    Composition,
}

/// Evaluation strategy, recomputed whenever the configuration changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CombinationStrategy {
    /// Every query fails.
    NoCurrentTransform,
    /// Queries are forwarded to the current transform.
    NoInitialTransform,
    Addition,
    Composition,
}

/// The transforms taking part in one query.
enum Selected<'a, const D: usize> {
    Single(&'a dyn AdvancedTransform<D>),
    Addition {
        initial: &'a dyn AdvancedTransform<D>,
        current: &'a dyn AdvancedTransform<D>,
    },
    Composition {
        initial: &'a dyn AdvancedTransform<D>,
        current: &'a dyn AdvancedTransform<D>,
    },
}

/// Combination of an initial and a current transform.
///
/// Configuration methods take `&mut self`; every query takes `&self`. Once
/// configured, the transform can be shared between threads and evaluated
/// concurrently without locks.
#[derive(Debug, Clone)]
pub struct CombinationTransform<const D: usize> {
    initial: Option<SharedTransform<D>>,
    current: Option<SharedTransform<D>>,
    mode: CombinationMode,
    strategy: CombinationStrategy,
    modified: u64,
}

impl<const D: usize> Default for CombinationTransform<D> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const D: usize> CombinationTransform<D> {
    /// Create an empty combination transform in composition mode.
    pub fn new() -> Self {
        Self {
            initial: None,
            current: None,
            mode: CombinationMode::Composition,
            strategy: CombinationStrategy::NoCurrentTransform,
            modified: 0,
        }
    }

    /// Create a combination of `initial` followed by `current`.
    pub fn with_transforms(
        initial: Option<SharedTransform<D>>,
        current: SharedTransform<D>,
        mode: CombinationMode,
    ) -> Self {
        let mut combination = Self::new();
        combination.set_combination_mode(mode);
        combination.set_initial_transform(initial);
        combination.set_current_transform(Some(current));
        combination
    }

    /// Set the fixed initial transform.
    pub fn set_initial_transform(&mut self, transform: Option<SharedTransform<D>>) {
        if same_transform(&self.initial, &transform) {
            return;
        }
        self.initial = transform;
        self.mark_modified();
    }

    /// Set the parameterized current transform.
    pub fn set_current_transform(&mut self, transform: Option<SharedTransform<D>>) {
        if same_transform(&self.current, &transform) {
            return;
        }
        self.current = transform;
        self.mark_modified();
    }

    /// Get the initial transform.
    pub fn initial_transform(&self) -> Option<&SharedTransform<D>> {
        self.initial.as_ref()
    }

    /// Get the current transform.
    pub fn current_transform(&self) -> Option<&SharedTransform<D>> {
        self.current.as_ref()
    }

    /// Set the combination rule.
    pub fn set_combination_mode(&mut self, mode: CombinationMode) {
        if self.mode == mode {
            return;
        }
        self.mode = mode;
        self.mark_modified();
    }

    /// Get the combination rule.
    pub fn combination_mode(&self) -> CombinationMode {
        self.mode
    }

    /// Select addition (`true`) or composition (`false`).
    pub fn set_use_addition(&mut self, use_addition: bool) {
        self.set_combination_mode(if use_addition {
            CombinationMode::Addition
        } else {
            CombinationMode::Composition
        });
    }

    /// Select composition (`true`) or addition (`false`).
    pub fn set_use_composition(&mut self, use_composition: bool) {
        self.set_use_addition(!use_composition);
    }

    pub fn use_addition(&self) -> bool {
        self.mode == CombinationMode::Addition
    }

    pub fn use_composition(&self) -> bool {
        self.mode == CombinationMode::Composition
    }

    /// Strategy selected by the last configuration change.
    pub fn strategy(&self) -> CombinationStrategy {
        self.strategy
    }

    /// Counter increased by every effective configuration change.
    pub fn modified_count(&self) -> u64 {
        self.modified
    }

    /// Number of current transforms in the chain of nested combinations.
    ///
    /// The chain is followed through the initial slot. An initial transform
    /// that is not itself a combination counts as one link.
    pub fn number_of_transforms(&self) -> usize {
        if self.current.is_none() {
            return 0;
        }
        match self.initial.as_deref() {
            None => 1,
            Some(initial) => match initial.as_combination() {
                Some(nested) => nested.number_of_transforms() + 1,
                None => 2,
            },
        }
    }

    /// The `n`-th transform of the chain, starting from the current transform.
    pub fn nth_transform(&self, n: usize) -> Result<SharedTransform<D>> {
        let len = self.number_of_transforms();
        if n >= len {
            return Err(TransformError::IndexOutOfRange { index: n, len });
        }
        match (n, self.current.as_ref(), self.initial.as_ref()) {
            (0, Some(current), _) => Ok(Arc::clone(current)),
            (_, _, Some(initial)) => match initial.as_combination() {
                Some(nested) => nested.nth_transform(n - 1),
                None => Ok(Arc::clone(initial)),
            },
            _ => Err(TransformError::IndexOutOfRange { index: n, len }),
        }
    }

    /// Inverse transform, failing when none exists.
    pub fn try_inverse(&self) -> Result<SharedTransform<D>> {
        self.inverse()?.ok_or_else(|| {
            TransformError::unsupported_inverse(match self.strategy {
                CombinationStrategy::Addition => "no closed form exists for the inverse of an additive combination",
                _ => "a transform of the combination is not invertible",
            })
        })
    }

    fn mark_modified(&mut self) {
        self.modified += 1;
        self.strategy = match (&self.current, &self.initial, self.mode) {
            (None, _, _) => CombinationStrategy::NoCurrentTransform,
            (Some(_), None, _) => CombinationStrategy::NoInitialTransform,
            (Some(_), Some(_), CombinationMode::Addition) => CombinationStrategy::Addition,
            (Some(_), Some(_), CombinationMode::Composition) => CombinationStrategy::Composition,
        };
        tracing::debug!("Combination strategy updated to {:?} (mode {:?})", self.strategy, self.mode);
    }

    fn current(&self) -> Result<&dyn AdvancedTransform<D>> {
        self.current.as_deref().ok_or(TransformError::NoCurrentTransform)
    }

    fn dispatch(&self) -> Result<Selected<'_, D>> {
        match (self.strategy, self.initial.as_deref(), self.current.as_deref()) {
            (CombinationStrategy::NoInitialTransform, _, Some(current)) => Ok(Selected::Single(current)),
            (CombinationStrategy::Addition, Some(initial), Some(current)) => {
                Ok(Selected::Addition { initial, current })
            }
            (CombinationStrategy::Composition, Some(initial), Some(current)) => {
                Ok(Selected::Composition { initial, current })
            }
            _ => Err(TransformError::NoCurrentTransform),
        }
    }
}

fn same_transform<const D: usize>(a: &Option<SharedTransform<D>>, b: &Option<SharedTransform<D>>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => Arc::ptr_eq(a, b),
        _ => false,
    }
}

/// Spatial Hessian of `T1(T0(x))`.
///
/// `sh[d] = sj0^T sh1[d] sj0 + sum_p sj1(d, p) sh0[p]`. The second term is
/// skipped when `sh0` is `None`.
fn compose_spatial_hessian<const D: usize>(
    sj0: &SpatialJacobian<D>,
    sj1: &SpatialJacobian<D>,
    sh0: Option<&SpatialHessian<D>>,
    sh1: &SpatialHessian<D>,
) -> SpatialHessian<D> {
    let sj0t = sj0.transpose();
    let mut sh = zero_spatial_hessian::<D>();
    for (dim, hessian) in sh.iter_mut().enumerate() {
        *hessian = sj0t * sh1[dim] * sj0;
        if let Some(sh0) = sh0 {
            for (p, initial_hessian) in sh0.iter().enumerate() {
                *hessian += initial_hessian * sj1[(dim, p)];
            }
        }
    }
    sh
}

impl<const D: usize> AdvancedTransform<D> for CombinationTransform<D> {
    fn number_of_parameters(&self) -> Result<usize> {
        self.current()?.number_of_parameters()
    }

    fn parameters(&self) -> Result<Vec<f64>> {
        self.current()?.parameters()
    }

    /// Set the parameters of the current transform.
    ///
    /// The current transform must not be shared: no other `Arc` handle to it
    /// may be alive, and no evaluation may be in flight.
    fn set_parameters(&mut self, parameters: &[f64]) -> Result<()> {
        let current = self.current.as_mut().ok_or(TransformError::NoCurrentTransform)?;
        let transform = Arc::get_mut(current).ok_or_else(|| {
            TransformError::shared_transform("the current transform has other owners and cannot be updated")
        })?;
        transform.set_parameters(parameters)?;
        self.modified += 1;
        tracing::trace!("Combination parameters updated: {} values", parameters.len());
        Ok(())
    }

    fn number_of_nonzero_jacobian_indices(&self) -> Result<usize> {
        self.current()?.number_of_nonzero_jacobian_indices()
    }

    fn is_linear(&self) -> bool {
        let linear = |t: &Option<SharedTransform<D>>| t.as_ref().map_or(true, |t| t.is_linear());
        linear(&self.current) && linear(&self.initial)
    }

    fn has_nonzero_spatial_hessian(&self) -> Result<bool> {
        let current = self.current()?;
        match self.initial.as_deref() {
            None => current.has_nonzero_spatial_hessian(),
            Some(initial) => Ok(current.has_nonzero_spatial_hessian()? || initial.has_nonzero_spatial_hessian()?),
        }
    }

    fn has_nonzero_jacobian_of_spatial_hessian(&self) -> Result<bool> {
        let current = self.current()?;
        match self.initial.as_deref() {
            None => current.has_nonzero_jacobian_of_spatial_hessian(),
            Some(initial) => Ok(current.has_nonzero_jacobian_of_spatial_hessian()?
                || initial.has_nonzero_jacobian_of_spatial_hessian()?),
        }
    }

    fn transform_point(&self, point: &Point<D>) -> Result<Point<D>> {
        match self.dispatch()? {
            Selected::Single(current) => current.transform_point(point),
            Selected::Addition { initial, current } => {
                let displacement = initial.transform_point(point)? - *point;
                Ok(current.transform_point(point)? + displacement)
            }
            Selected::Composition { initial, current } => {
                current.transform_point(&initial.transform_point(point)?)
            }
        }
    }

    /// Parameter Jacobian. In addition mode only the current transform contributes.
    fn jacobian(
        &self,
        point: &Point<D>,
        jacobian: &mut Jacobian,
        nonzero_indices: &mut NonZeroJacobianIndices,
    ) -> Result<()> {
        match self.dispatch()? {
            Selected::Single(current) | Selected::Addition { current, .. } => {
                current.jacobian(point, jacobian, nonzero_indices)
            }
            Selected::Composition { initial, current } => {
                current.jacobian(&initial.transform_point(point)?, jacobian, nonzero_indices)
            }
        }
    }

    fn evaluate_jacobian_with_image_gradient_product(
        &self,
        point: &Point<D>,
        moving_image_gradient: &Vector<D>,
        image_jacobian: &mut Vec<f64>,
        nonzero_indices: &mut NonZeroJacobianIndices,
    ) -> Result<()> {
        match self.dispatch()? {
            Selected::Single(current) | Selected::Addition { current, .. } => current
                .evaluate_jacobian_with_image_gradient_product(
                    point,
                    moving_image_gradient,
                    image_jacobian,
                    nonzero_indices,
                ),
            Selected::Composition { initial, current } => current
                .evaluate_jacobian_with_image_gradient_product(
                    &initial.transform_point(point)?,
                    moving_image_gradient,
                    image_jacobian,
                    nonzero_indices,
                ),
        }
    }

    fn spatial_jacobian(&self, point: &Point<D>) -> Result<SpatialJacobian<D>> {
        match self.dispatch()? {
            Selected::Single(current) => current.spatial_jacobian(point),
            Selected::Addition { initial, current } => {
                let sj0 = initial.spatial_jacobian(point)?;
                let sj1 = current.spatial_jacobian(point)?;
                Ok(sj0 + sj1 - SpatialJacobian::identity())
            }
            Selected::Composition { initial, current } => {
                let sj0 = initial.spatial_jacobian(point)?;
                let sj1 = current.spatial_jacobian(&initial.transform_point(point)?)?;
                Ok(sj1 * sj0)
            }
        }
    }

    fn spatial_hessian(&self, point: &Point<D>) -> Result<SpatialHessian<D>> {
        match self.dispatch()? {
            Selected::Single(current) => current.spatial_hessian(point),
            Selected::Addition { initial, current } => {
                let sh0 = initial.spatial_hessian(point)?;
                let mut sh = current.spatial_hessian(point)?;
                for (hessian, initial_hessian) in sh.iter_mut().zip(sh0.iter()) {
                    *hessian += initial_hessian;
                }
                Ok(sh)
            }
            Selected::Composition { initial, current } => {
                let mapped = initial.transform_point(point)?;
                let sj0 = initial.spatial_jacobian(point)?;
                let sj1 = current.spatial_jacobian(&mapped)?;
                let sh1 = current.spatial_hessian(&mapped)?;
                let sh0 = if initial.has_nonzero_spatial_hessian()? {
                    Some(initial.spatial_hessian(point)?)
                } else {
                    None
                };
                Ok(compose_spatial_hessian(&sj0, &sj1, sh0.as_ref(), &sh1))
            }
        }
    }

    fn jacobian_of_spatial_jacobian(
        &self,
        point: &Point<D>,
        jsj: &mut JacobianOfSpatialJacobian<D>,
        nonzero_indices: &mut NonZeroJacobianIndices,
    ) -> Result<()> {
        match self.dispatch()? {
            Selected::Single(current) | Selected::Addition { current, .. } => {
                current.jacobian_of_spatial_jacobian(point, jsj, nonzero_indices)
            }
            Selected::Composition { initial, current } => {
                let sj0 = initial.spatial_jacobian(point)?;
                current.jacobian_of_spatial_jacobian(&initial.transform_point(point)?, jsj, nonzero_indices)?;
                for matrix in jsj.iter_mut() {
                    *matrix *= sj0;
                }
                Ok(())
            }
        }
    }

    fn jacobian_of_spatial_jacobian_with_spatial_jacobian(
        &self,
        point: &Point<D>,
        sj: &mut SpatialJacobian<D>,
        jsj: &mut JacobianOfSpatialJacobian<D>,
        nonzero_indices: &mut NonZeroJacobianIndices,
    ) -> Result<()> {
        match self.dispatch()? {
            Selected::Single(current) => {
                current.jacobian_of_spatial_jacobian_with_spatial_jacobian(point, sj, jsj, nonzero_indices)
            }
            Selected::Addition { initial, current } => {
                let mut sj1 = SpatialJacobian::zeros();
                current.jacobian_of_spatial_jacobian_with_spatial_jacobian(point, &mut sj1, jsj, nonzero_indices)?;
                *sj = initial.spatial_jacobian(point)? + sj1 - SpatialJacobian::identity();
                Ok(())
            }
            Selected::Composition { initial, current } => {
                let sj0 = initial.spatial_jacobian(point)?;
                let mut sj1 = SpatialJacobian::zeros();
                current.jacobian_of_spatial_jacobian_with_spatial_jacobian(
                    &initial.transform_point(point)?,
                    &mut sj1,
                    jsj,
                    nonzero_indices,
                )?;
                *sj = sj1 * sj0;
                for matrix in jsj.iter_mut() {
                    *matrix *= sj0;
                }
                Ok(())
            }
        }
    }

    fn jacobian_of_spatial_hessian(
        &self,
        point: &Point<D>,
        jsh: &mut JacobianOfSpatialHessian<D>,
        nonzero_indices: &mut NonZeroJacobianIndices,
    ) -> Result<()> {
        match self.dispatch()? {
            Selected::Single(current) | Selected::Addition { current, .. } => {
                current.jacobian_of_spatial_hessian(point, jsh, nonzero_indices)
            }
            Selected::Composition { initial, current } => {
                let mapped = initial.transform_point(point)?;
                let sj0 = initial.spatial_jacobian(point)?;
                current.jacobian_of_spatial_hessian(&mapped, jsh, nonzero_indices)?;
                compose_jacobian_of_spatial_hessian(initial, current, point, &mapped, &sj0, jsh)
            }
        }
    }

    fn jacobian_of_spatial_hessian_with_spatial_hessian(
        &self,
        point: &Point<D>,
        sh: &mut SpatialHessian<D>,
        jsh: &mut JacobianOfSpatialHessian<D>,
        nonzero_indices: &mut NonZeroJacobianIndices,
    ) -> Result<()> {
        match self.dispatch()? {
            Selected::Single(current) => {
                current.jacobian_of_spatial_hessian_with_spatial_hessian(point, sh, jsh, nonzero_indices)
            }
            Selected::Addition { initial, current } => {
                current.jacobian_of_spatial_hessian_with_spatial_hessian(point, sh, jsh, nonzero_indices)?;
                let sh0 = initial.spatial_hessian(point)?;
                for (hessian, initial_hessian) in sh.iter_mut().zip(sh0.iter()) {
                    *hessian += initial_hessian;
                }
                Ok(())
            }
            Selected::Composition { initial, current } => {
                let mapped = initial.transform_point(point)?;
                let sj0 = initial.spatial_jacobian(point)?;
                let sj1 = current.spatial_jacobian(&mapped)?;
                let mut sh1 = zero_spatial_hessian::<D>();
                current.jacobian_of_spatial_hessian_with_spatial_hessian(&mapped, &mut sh1, jsh, nonzero_indices)?;
                let sh0 = if initial.has_nonzero_spatial_hessian()? {
                    Some(initial.spatial_hessian(point)?)
                } else {
                    None
                };
                *sh = compose_spatial_hessian(&sj0, &sj1, sh0.as_ref(), &sh1);
                compose_jacobian_of_spatial_hessian(initial, current, point, &mapped, &sj0, jsh)
            }
        }
    }

    /// Inverse of the combination.
    ///
    /// Addition has no closed-form inverse and yields `None`. The inverse of
    /// `T1(T0(x))` is `T0^-1(T1^-1(y))`, returned as a new composition with
    /// `T1^-1` as initial and `T0^-1` as current transform.
    fn inverse(&self) -> Result<Option<SharedTransform<D>>> {
        let current = self.current()?;
        let Some(initial) = self.initial.as_deref() else {
            return current.inverse();
        };
        match self.mode {
            CombinationMode::Addition => Ok(None),
            CombinationMode::Composition => {
                let (Some(initial_inverse), Some(current_inverse)) = (initial.inverse()?, current.inverse()?) else {
                    return Ok(None);
                };
                let inverse = Self::with_transforms(
                    Some(current_inverse),
                    initial_inverse,
                    CombinationMode::Composition,
                );
                Ok(Some(Arc::new(inverse)))
            }
        }
    }

    fn as_combination(&self) -> Option<&CombinationTransform<D>> {
        Some(self)
    }
}

/// Turn the current transform's Jacobian of spatial Hessian, evaluated at
/// `mapped = T0(point)`, into the one of the composition.
///
/// Each matrix becomes `sj0^T M sj0`. When the initial transform has a
/// nonzero spatial Hessian, `sum_p jsj1[mu](d, p) sh0[p]` is added.
fn compose_jacobian_of_spatial_hessian<const D: usize>(
    initial: &dyn AdvancedTransform<D>,
    current: &dyn AdvancedTransform<D>,
    point: &Point<D>,
    mapped: &Point<D>,
    sj0: &SpatialJacobian<D>,
    jsh: &mut JacobianOfSpatialHessian<D>,
) -> Result<()> {
    let sj0t = sj0.transpose();
    for hessian in jsh.iter_mut() {
        for matrix in hessian.iter_mut() {
            *matrix = sj0t * *matrix * sj0;
        }
    }

    if initial.has_nonzero_spatial_hessian()? {
        let sh0 = initial.spatial_hessian(point)?;
        let mut jsj1 = Vec::with_capacity(jsh.len());
        let mut indices = Vec::with_capacity(jsh.len());
        current.jacobian_of_spatial_jacobian(mapped, &mut jsj1, &mut indices)?;
        for (hessian, sj_derivative) in jsh.iter_mut().zip(jsj1.iter()) {
            for (dim, matrix) in hessian.iter_mut().enumerate() {
                for (p, initial_hessian) in sh0.iter().enumerate() {
                    *matrix += initial_hessian * sj_derivative[(dim, p)];
                }
            }
        }
    }
    Ok(())
}
