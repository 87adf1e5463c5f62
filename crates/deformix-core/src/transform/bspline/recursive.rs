//! Recursive tensor-product evaluation over a B-spline support window.
//!
//! The recursion starts at the outermost axis and descends to axis 0,
//! adding the stride of each visited node to a running linear offset. At the
//! bottom a single coefficient is read. Point values and derivatives are
//! computed without building the `(order + 1)^D` weight tensor.

use super::kernel::{BSplineWeights, WeightRow, MAX_SUPPORT};

/// Linear offset contribution of every support node along every axis.
pub type SupportSteps<const D: usize> = [[usize; MAX_SUPPORT]; D];

/// Interpolate `coefficients` with the weight row selected per axis.
pub fn interpolate<const D: usize>(
    coefficients: &[f64],
    weights: &BSplineWeights<D>,
    steps: &SupportSteps<D>,
    rows: &[WeightRow; D],
) -> f64 {
    accumulate(coefficients, weights, steps, rows, D, 0)
}

fn accumulate<const D: usize>(
    coefficients: &[f64],
    weights: &BSplineWeights<D>,
    steps: &SupportSteps<D>,
    rows: &[WeightRow; D],
    level: usize,
    offset: usize,
) -> f64 {
    if level == 0 {
        return coefficients[offset];
    }
    let axis = level - 1;
    weights
        .row(axis, rows[axis])
        .iter()
        .zip(steps[axis].iter())
        .map(|(&w, &step)| w * accumulate(coefficients, weights, steps, rows, axis, offset + step))
        .sum()
}

/// Append the tensor-product weights to `out`, axis 0 varying fastest.
pub fn fill_weights<const D: usize>(weights: &BSplineWeights<D>, rows: &[WeightRow; D], out: &mut Vec<f64>) {
    fill_product(weights, rows, D, 1.0, out);
}

fn fill_product<const D: usize>(
    weights: &BSplineWeights<D>,
    rows: &[WeightRow; D],
    level: usize,
    product: f64,
    out: &mut Vec<f64>,
) {
    if level == 0 {
        out.push(product);
        return;
    }
    let axis = level - 1;
    for &w in weights.row(axis, rows[axis]) {
        fill_product(weights, rows, axis, product * w, out);
    }
}

/// Append the linear offsets of the support window to `out`, in the same
/// order as [`fill_weights`].
pub fn fill_offsets<const D: usize>(steps: &SupportSteps<D>, support: usize, out: &mut Vec<usize>) {
    fill_offset(steps, support, D, 0, out);
}

fn fill_offset<const D: usize>(
    steps: &SupportSteps<D>,
    support: usize,
    level: usize,
    offset: usize,
    out: &mut Vec<usize>,
) {
    if level == 0 {
        out.push(offset);
        return;
    }
    let axis = level - 1;
    for &step in &steps[axis][..support] {
        fill_offset(steps, support, axis, offset + step, out);
    }
}
