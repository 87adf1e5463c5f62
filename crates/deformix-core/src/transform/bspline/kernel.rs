//! Centred B-spline basis functions and per-axis support weights.

use crate::error::{Result, TransformError};
use crate::grid::ContinuousIndex;

/// Highest supported spline order.
pub const MAX_SPLINE_ORDER: usize = 3;

/// Largest support window along one axis (`MAX_SPLINE_ORDER + 1`).
pub const MAX_SUPPORT: usize = MAX_SPLINE_ORDER + 1;

/// Centred B-spline basis of order 0 to 3.
fn basis(order: usize, t: f64) -> f64 {
    let a = t.abs();
    match order {
        0 => {
            if a < 0.5 {
                1.0
            } else if a == 0.5 {
                0.5
            } else {
                0.0
            }
        }
        1 => {
            if a < 1.0 {
                1.0 - a
            } else {
                0.0
            }
        }
        2 => {
            if a < 0.5 {
                0.75 - a * a
            } else if a < 1.5 {
                let b = 1.5 - a;
                0.5 * b * b
            } else {
                0.0
            }
        }
        3 => {
            if a < 1.0 {
                (4.0 - 6.0 * a * a + 3.0 * a * a * a) / 6.0
            } else if a < 2.0 {
                let b = 2.0 - a;
                b * b * b / 6.0
            } else {
                0.0
            }
        }
        _ => 0.0,
    }
}

/// B-spline kernel of a fixed order with analytic derivatives.
///
/// Derivatives are expressed through lower order bases:
/// `b'_n(t) = b_{n-1}(t + 1/2) - b_{n-1}(t - 1/2)` and
/// `b''_n(t) = b_{n-2}(t + 1) - 2 b_{n-2}(t) + b_{n-2}(t - 1)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BSplineKernel {
    order: usize,
}

impl BSplineKernel {
    /// Create a kernel of order 1, 2 or 3.
    pub fn new(order: usize) -> Result<Self> {
        if order == 0 || order > MAX_SPLINE_ORDER {
            return Err(TransformError::InvalidSplineOrder(order));
        }
        Ok(Self { order })
    }

    /// Spline order.
    pub fn order(&self) -> usize {
        self.order
    }

    /// Number of nonzero weights along one axis.
    pub fn support_size(&self) -> usize {
        self.order + 1
    }

    /// Offset between a continuous index and the first node of its support.
    pub fn support_offset(&self) -> f64 {
        (self.order as f64 - 1.0) / 2.0
    }

    /// Basis value.
    pub fn value(&self, t: f64) -> f64 {
        basis(self.order, t)
    }

    /// First derivative of the basis.
    pub fn first_derivative(&self, t: f64) -> f64 {
        basis(self.order - 1, t + 0.5) - basis(self.order - 1, t - 0.5)
    }

    /// Second derivative of the basis. Zero for linear splines.
    pub fn second_derivative(&self, t: f64) -> f64 {
        if self.order < 2 {
            return 0.0;
        }
        let lower = self.order - 2;
        basis(lower, t + 1.0) - 2.0 * basis(lower, t) + basis(lower, t - 1.0)
    }
}

/// Which weight row an axis contributes to a tensor product.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WeightRow {
    Value,
    First,
    Second,
}

/// One-dimensional weights of every axis for a single continuous index.
#[derive(Debug, Clone, PartialEq)]
pub struct BSplineWeights<const D: usize> {
    /// First grid node of the support window per axis.
    pub start: [isize; D],
    /// Basis values.
    pub values: [[f64; MAX_SUPPORT]; D],
    /// First derivatives with respect to the continuous index.
    pub first: [[f64; MAX_SUPPORT]; D],
    /// Second derivatives with respect to the continuous index.
    pub second: [[f64; MAX_SUPPORT]; D],
    support: usize,
}

impl<const D: usize> BSplineWeights<D> {
    /// Evaluate the weights of `kernel` at a continuous index.
    pub fn evaluate(kernel: &BSplineKernel, cindex: &ContinuousIndex<D>) -> Self {
        let support = kernel.support_size();
        let offset = kernel.support_offset();
        let mut weights = Self {
            start: [0; D],
            values: [[0.0; MAX_SUPPORT]; D],
            first: [[0.0; MAX_SUPPORT]; D],
            second: [[0.0; MAX_SUPPORT]; D],
            support,
        };

        for axis in 0..D {
            let start = (cindex[axis] - offset).floor();
            let x = cindex[axis] - start;
            weights.start[axis] = start as isize;
            for k in 0..support {
                let t = x - k as f64;
                weights.values[axis][k] = kernel.value(t);
                weights.first[axis][k] = kernel.first_derivative(t);
                weights.second[axis][k] = kernel.second_derivative(t);
            }
        }
        weights
    }

    /// Number of weights per axis.
    pub fn support_size(&self) -> usize {
        self.support
    }

    /// Weights of one axis.
    pub fn row(&self, axis: usize, row: WeightRow) -> &[f64] {
        let values = match row {
            WeightRow::Value => &self.values[axis],
            WeightRow::First => &self.first[axis],
            WeightRow::Second => &self.second[axis],
        };
        &values[..self.support]
    }
}
