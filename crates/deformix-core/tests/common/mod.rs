#![allow(dead_code)]

use deformix_core::spatial::{Direction, Point, Spacing};
use deformix_core::transform::{SpatialHessian, SpatialJacobian};
use deformix_core::{AdvancedTransform, GridGeometry, RecursiveBSplineTransform};
use nalgebra::SMatrix;
use tracing_subscriber::EnvFilter;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn rotation_2d(angle: f64) -> Direction<2> {
    Direction::from_matrix(SMatrix::<f64, 2, 2>::new(
        angle.cos(), -angle.sin(),
        angle.sin(), angle.cos(),
    ))
}

/// B-spline over a square grid with smooth pseudo-random coefficients.
pub fn bspline_2d(
    size: usize,
    origin: f64,
    spacing: f64,
    angle: f64,
    order: usize,
    amplitude: f64,
    phase: f64,
) -> RecursiveBSplineTransform<2> {
    let geometry = GridGeometry::new(
        [size, size],
        Point::new([origin, origin]),
        Spacing::uniform(spacing),
        rotation_2d(angle),
    )
    .unwrap();
    let mut transform = RecursiveBSplineTransform::new(geometry, order).unwrap();
    let n = transform.number_of_parameters().unwrap();
    let params: Vec<f64> = (0..n).map(|i| amplitude * (0.73 * i as f64 + phase).sin()).collect();
    transform.set_parameters(&params).unwrap();
    transform
}

/// Central difference spatial Jacobian of a point map.
pub fn numeric_spatial_jacobian<const D: usize>(
    map: impl Fn(&Point<D>) -> Point<D>,
    point: &Point<D>,
    h: f64,
) -> SpatialJacobian<D> {
    let mut sj = SpatialJacobian::<D>::zeros();
    for j in 0..D {
        let mut forward = *point;
        forward[j] += h;
        let mut backward = *point;
        backward[j] -= h;
        let f = map(&forward);
        let b = map(&backward);
        for i in 0..D {
            sj[(i, j)] = (f[i] - b[i]) / (2.0 * h);
        }
    }
    sj
}

/// Central difference spatial Hessian from a spatial Jacobian map.
///
/// Entry `[d](k, j)` is the derivative of `sj(d, k)` along axis `j`.
pub fn numeric_spatial_hessian<const D: usize>(
    sj_map: impl Fn(&Point<D>) -> SpatialJacobian<D>,
    point: &Point<D>,
    h: f64,
) -> SpatialHessian<D> {
    let mut sh = [SMatrix::<f64, D, D>::zeros(); D];
    for j in 0..D {
        let mut forward = *point;
        forward[j] += h;
        let mut backward = *point;
        backward[j] -= h;
        let f = sj_map(&forward);
        let b = sj_map(&backward);
        for (d, hessian) in sh.iter_mut().enumerate() {
            for k in 0..D {
                hessian[(k, j)] = (f[(d, k)] - b[(d, k)]) / (2.0 * h);
            }
        }
    }
    sh
}

/// Distance of a coordinate from the nearest integer or half-integer knot.
pub fn knot_distance(continuous_index: f64) -> f64 {
    let doubled = 2.0 * continuous_index;
    (doubled - doubled.round()).abs() * 0.5
}
