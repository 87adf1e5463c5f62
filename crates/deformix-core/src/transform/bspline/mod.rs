//! Recursive B-spline deformation transform.
//!
//! The transform is a displacement field `T(x) = x + u(x)` where each
//! component of `u` is a tensor-product B-spline over a control point grid.
//! Point values and derivatives are evaluated by a recursion over the axes
//! of the local support window (see [`recursive`]).

pub mod kernel;
pub mod recursive;

use std::cell::RefCell;
use std::sync::atomic::{AtomicBool, Ordering};
use nalgebra::SMatrix;
use crate::error::{Result, TransformError};
use crate::grid::{CoefficientGrid, GridGeometry};
use crate::spatial::{Point, Vector};
use super::trait_::{
    identity_indices, reset_jacobian, zero_spatial_hessian, AdvancedTransform, Jacobian,
    JacobianOfSpatialHessian, JacobianOfSpatialJacobian, NonZeroJacobianIndices,
    SpatialHessian, SpatialJacobian,
};
use kernel::WeightRow;
use recursive::SupportSteps;

pub use kernel::{BSplineKernel, BSplineWeights, MAX_SPLINE_ORDER, MAX_SUPPORT};

thread_local! {
    // Tensor-product weights of the current query, reused across calls on one thread.
    static WEIGHT_SCRATCH: RefCell<Vec<f64>> = RefCell::new(Vec::new());
}

/// Result of evaluating a B-spline transform at one point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BSplineEvaluation<const D: usize> {
    /// Mapped point. Equal to the input when `inside` is false.
    pub point: Point<D>,
    /// Whether the support window lies fully inside the control point grid.
    pub inside: bool,
}

/// Support window of one point.
struct SupportWindow<const D: usize> {
    weights: BSplineWeights<D>,
    steps: SupportSteps<D>,
}

/// B-spline deformation transform with recursive evaluation.
///
/// Parameters are `D` coefficient grids concatenated dimension-major: the
/// displacement along axis `d` of grid node `n` is parameter `d * N + n`,
/// with `N` the number of grid nodes and node offsets running axis 0 fastest.
#[derive(Debug)]
pub struct RecursiveBSplineTransform<const D: usize> {
    geometry: GridGeometry<D>,
    kernel: BSplineKernel,
    coefficients: Vec<f64>,
    parameters_assigned: bool,
    warned_unassigned: AtomicBool,
}

impl<const D: usize> RecursiveBSplineTransform<D> {
    /// Create a transform over `geometry` with zero displacement.
    ///
    /// # Arguments
    /// * `geometry` - Control point grid
    /// * `spline_order` - 1, 2 or 3
    pub fn new(geometry: GridGeometry<D>, spline_order: usize) -> Result<Self> {
        let kernel = BSplineKernel::new(spline_order)?;
        if geometry.size().iter().any(|&s| s < kernel.support_size()) {
            return Err(TransformError::invalid_grid(format!(
                "grid size {:?} is smaller than the order {} support",
                geometry.size(),
                spline_order
            )));
        }

        tracing::debug!(
            "B-spline grid: size {:?}, origin {:?}, spacing {:?}, order {}",
            geometry.size(),
            geometry.origin().to_array(),
            geometry.spacing().to_array(),
            spline_order
        );

        let coefficients = vec![0.0; D * geometry.number_of_nodes()];
        Ok(Self {
            geometry,
            kernel,
            coefficients,
            parameters_assigned: false,
            warned_unassigned: AtomicBool::new(false),
        })
    }

    /// Control point grid.
    pub fn geometry(&self) -> &GridGeometry<D> {
        &self.geometry
    }

    /// Spline order.
    pub fn spline_order(&self) -> usize {
        self.kernel.order()
    }

    /// Number of tensor-product weights per output dimension.
    pub fn number_of_weights(&self) -> usize {
        self.kernel.support_size().pow(D as u32)
    }

    /// Coefficients of one output dimension.
    pub fn coefficient_grid(&self, dimension: usize) -> Result<CoefficientGrid<'_, D>> {
        if dimension >= D {
            return Err(TransformError::IndexOutOfRange { index: dimension, len: D });
        }
        let n = self.geometry.number_of_nodes();
        CoefficientGrid::new(&self.geometry, &self.coefficients[dimension * n..(dimension + 1) * n])
    }

    /// Map a point and report whether it lies inside the support region.
    ///
    /// Points whose support window leaves the grid are returned unchanged.
    pub fn evaluate(&self, point: &Point<D>) -> Result<BSplineEvaluation<D>> {
        self.warn_if_unassigned();
        let Some(window) = self.support_window(point) else {
            return Ok(BSplineEvaluation { point: *point, inside: false });
        };

        let rows = [WeightRow::Value; D];
        let mut mapped = *point;
        for d in 0..D {
            let grid = self.coefficient_grid(d)?;
            mapped[d] += recursive::interpolate(grid.as_slice(), &window.weights, &window.steps, &rows);
        }
        Ok(BSplineEvaluation { point: mapped, inside: true })
    }

    /// True when the support window of the continuous index of `point` fits the grid.
    pub fn is_inside(&self, point: &Point<D>) -> bool {
        self.support_window(point).is_some()
    }

    fn support_window(&self, point: &Point<D>) -> Option<SupportWindow<D>> {
        let cindex = self.geometry.point_to_continuous_index(point);
        let lower = self.kernel.support_offset();
        let size = self.geometry.size();
        for axis in 0..D {
            let upper = size[axis] as f64 - 1.0 - lower;
            // Written so that NaN fails the test.
            if !(cindex[axis] >= lower && cindex[axis] < upper) {
                return None;
            }
        }

        let weights = BSplineWeights::evaluate(&self.kernel, &cindex);
        let strides = self.geometry.offset_table();
        let mut steps = [[0usize; MAX_SUPPORT]; D];
        for axis in 0..D {
            let start = weights.start[axis].max(0) as usize;
            for (k, step) in steps[axis].iter_mut().take(weights.support_size()).enumerate() {
                *step = (start + k) * strides[axis];
            }
        }
        Some(SupportWindow { weights, steps })
    }

    /// Derivatives of the displacement with respect to the continuous index.
    ///
    /// Entry `(d, k)` is `du_d / dxi_k`.
    fn index_gradient(&self, window: &SupportWindow<D>) -> Result<SMatrix<f64, D, D>> {
        let mut gradient = SMatrix::<f64, D, D>::zeros();
        for d in 0..D {
            let grid = self.coefficient_grid(d)?;
            for k in 0..D {
                let mut rows = [WeightRow::Value; D];
                rows[k] = WeightRow::First;
                gradient[(d, k)] =
                    recursive::interpolate(grid.as_slice(), &window.weights, &window.steps, &rows);
            }
        }
        Ok(gradient)
    }

    fn second_derivative_rows(k: usize, l: usize) -> [WeightRow; D] {
        let mut rows = [WeightRow::Value; D];
        if k == l {
            rows[k] = WeightRow::Second;
        } else {
            rows[k] = WeightRow::First;
            rows[l] = WeightRow::First;
        }
        rows
    }

    /// Parameter indices of the support window, block per output dimension.
    fn fill_nonzero_indices(&self, window: &SupportWindow<D>, nonzero_indices: &mut NonZeroJacobianIndices) {
        nonzero_indices.clear();
        recursive::fill_offsets(&window.steps, window.weights.support_size(), nonzero_indices);
        let nw = nonzero_indices.len();
        let n = self.geometry.number_of_nodes();
        for d in 1..D {
            for i in 0..nw {
                let offset = nonzero_indices[i];
                nonzero_indices.push(d * n + offset);
            }
        }
    }

    fn warn_if_unassigned(&self) {
        if !self.parameters_assigned && !self.warned_unassigned.swap(true, Ordering::Relaxed) {
            tracing::warn!("B-spline transform evaluated before its coefficients were set; using zero displacement");
        }
    }
}

impl<const D: usize> Clone for RecursiveBSplineTransform<D> {
    fn clone(&self) -> Self {
        Self {
            geometry: self.geometry.clone(),
            kernel: self.kernel,
            coefficients: self.coefficients.clone(),
            parameters_assigned: self.parameters_assigned,
            warned_unassigned: AtomicBool::new(self.warned_unassigned.load(Ordering::Relaxed)),
        }
    }
}

impl<const D: usize> AdvancedTransform<D> for RecursiveBSplineTransform<D> {
    fn number_of_parameters(&self) -> Result<usize> {
        Ok(self.coefficients.len())
    }

    fn parameters(&self) -> Result<Vec<f64>> {
        Ok(self.coefficients.clone())
    }

    fn set_parameters(&mut self, parameters: &[f64]) -> Result<()> {
        TransformError::check_parameter_count(self.coefficients.len(), parameters.len())?;
        self.coefficients.copy_from_slice(parameters);
        self.parameters_assigned = true;
        tracing::trace!("B-spline coefficients updated: {} values", parameters.len());
        Ok(())
    }

    fn number_of_nonzero_jacobian_indices(&self) -> Result<usize> {
        Ok(D * self.number_of_weights())
    }

    fn is_linear(&self) -> bool {
        false
    }

    /// Pure second derivatives vanish for linear splines, but the tensor
    /// product keeps mixed terms alive whenever there is more than one axis.
    fn has_nonzero_spatial_hessian(&self) -> Result<bool> {
        Ok(self.kernel.order() >= 2 || D >= 2)
    }

    fn transform_point(&self, point: &Point<D>) -> Result<Point<D>> {
        Ok(self.evaluate(point)?.point)
    }

    fn jacobian(
        &self,
        point: &Point<D>,
        jacobian: &mut Jacobian,
        nonzero_indices: &mut NonZeroJacobianIndices,
    ) -> Result<()> {
        let nw = self.number_of_weights();
        reset_jacobian(jacobian, D, D * nw);
        let Some(window) = self.support_window(point) else {
            identity_indices(nonzero_indices, D * nw);
            return Ok(());
        };

        WEIGHT_SCRATCH.with(|scratch| {
            let mut weights = scratch.borrow_mut();
            weights.clear();
            recursive::fill_weights(&window.weights, &[WeightRow::Value; D], &mut weights);
            for d in 0..D {
                for (i, &w) in weights.iter().enumerate() {
                    jacobian[(d, d * nw + i)] = w;
                }
            }
        });
        self.fill_nonzero_indices(&window, nonzero_indices);
        Ok(())
    }

    fn evaluate_jacobian_with_image_gradient_product(
        &self,
        point: &Point<D>,
        moving_image_gradient: &Vector<D>,
        image_jacobian: &mut Vec<f64>,
        nonzero_indices: &mut NonZeroJacobianIndices,
    ) -> Result<()> {
        let nw = self.number_of_weights();
        image_jacobian.clear();
        let Some(window) = self.support_window(point) else {
            image_jacobian.resize(D * nw, 0.0);
            identity_indices(nonzero_indices, D * nw);
            return Ok(());
        };

        WEIGHT_SCRATCH.with(|scratch| {
            let mut weights = scratch.borrow_mut();
            weights.clear();
            recursive::fill_weights(&window.weights, &[WeightRow::Value; D], &mut weights);
            for d in 0..D {
                let g = moving_image_gradient[d];
                image_jacobian.extend(weights.iter().map(|&w| g * w));
            }
        });
        self.fill_nonzero_indices(&window, nonzero_indices);
        Ok(())
    }

    fn spatial_jacobian(&self, point: &Point<D>) -> Result<SpatialJacobian<D>> {
        self.warn_if_unassigned();
        let Some(window) = self.support_window(point) else {
            return Ok(SpatialJacobian::identity());
        };
        let gradient = self.index_gradient(&window)?;
        Ok(SpatialJacobian::identity() + gradient * self.geometry.point_to_index_matrix())
    }

    fn spatial_hessian(&self, point: &Point<D>) -> Result<SpatialHessian<D>> {
        self.warn_if_unassigned();
        let mut sh = zero_spatial_hessian::<D>();
        let Some(window) = self.support_window(point) else {
            return Ok(sh);
        };

        let m = self.geometry.point_to_index_matrix();
        for (d, hessian) in sh.iter_mut().enumerate() {
            let grid = self.coefficient_grid(d)?;
            let mut index_hessian = SMatrix::<f64, D, D>::zeros();
            for k in 0..D {
                for l in k..D {
                    let rows = Self::second_derivative_rows(k, l);
                    let value =
                        recursive::interpolate(grid.as_slice(), &window.weights, &window.steps, &rows);
                    index_hessian[(k, l)] = value;
                    index_hessian[(l, k)] = value;
                }
            }
            *hessian = m.transpose() * index_hessian * m;
        }
        Ok(sh)
    }

    fn jacobian_of_spatial_jacobian(
        &self,
        point: &Point<D>,
        jsj: &mut JacobianOfSpatialJacobian<D>,
        nonzero_indices: &mut NonZeroJacobianIndices,
    ) -> Result<()> {
        let nw = self.number_of_weights();
        jsj.clear();
        jsj.resize(D * nw, SpatialJacobian::zeros());
        let Some(window) = self.support_window(point) else {
            identity_indices(nonzero_indices, D * nw);
            return Ok(());
        };

        let m = self.geometry.point_to_index_matrix();
        WEIGHT_SCRATCH.with(|scratch| {
            // Segment k holds the weight derivatives along axis k.
            let mut derivatives = scratch.borrow_mut();
            derivatives.clear();
            for k in 0..D {
                let mut rows = [WeightRow::Value; D];
                rows[k] = WeightRow::First;
                recursive::fill_weights(&window.weights, &rows, &mut derivatives);
            }
            for i in 0..nw {
                let gradient = SMatrix::<f64, 1, D>::from_fn(|_, k| derivatives[k * nw + i]);
                let row = gradient * m;
                for d in 0..D {
                    jsj[d * nw + i].set_row(d, &row);
                }
            }
        });
        self.fill_nonzero_indices(&window, nonzero_indices);
        Ok(())
    }

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

    fn jacobian_of_spatial_hessian(
        &self,
        point: &Point<D>,
        jsh: &mut JacobianOfSpatialHessian<D>,
        nonzero_indices: &mut NonZeroJacobianIndices,
    ) -> Result<()> {
        let nw = self.number_of_weights();
        jsh.clear();
        jsh.resize(D * nw, zero_spatial_hessian());
        let Some(window) = self.support_window(point) else {
            identity_indices(nonzero_indices, D * nw);
            return Ok(());
        };

        let m = self.geometry.point_to_index_matrix();
        WEIGHT_SCRATCH.with(|scratch| {
            // Segment k * D + l holds the mixed second derivatives along axes k and l.
            let mut derivatives = scratch.borrow_mut();
            derivatives.clear();
            for k in 0..D {
                for l in 0..D {
                    let rows = Self::second_derivative_rows(k, l);
                    recursive::fill_weights(&window.weights, &rows, &mut derivatives);
                }
            }
            for i in 0..nw {
                let index_hessian =
                    SMatrix::<f64, D, D>::from_fn(|k, l| derivatives[(k * D + l) * nw + i]);
                let hessian = m.transpose() * index_hessian * m;
                for d in 0..D {
                    jsh[d * nw + i][d] = hessian;
                }
            }
        });
        self.fill_nonzero_indices(&window, nonzero_indices);
        Ok(())
    }
}
