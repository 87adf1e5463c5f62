//! Parallel batch evaluation.
//!
//! Points are split into chunks processed by rayon workers. Each worker
//! owns its scratch buffers and reuses them for every point of its chunk;
//! the transform itself is only read.

use rayon::prelude::*;
use crate::error::Result;
use crate::spatial::{Point, Vector};
use super::trait_::AdvancedTransform;

/// One sample of a gradient-based registration cost.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GradientSample<const D: usize> {
    /// Fixed space point.
    pub point: Point<D>,
    /// Moving image gradient at the mapped point.
    pub moving_gradient: Vector<D>,
    /// Contribution weight of the sample.
    pub weight: f64,
}

/// Map every point through `transform` in parallel.
pub fn transform_points_parallel<T, const D: usize>(transform: &T, points: &[Point<D>]) -> Result<Vec<Point<D>>>
where
    T: AdvancedTransform<D> + ?Sized,
{
    points.par_iter().map(|p| transform.transform_point(p)).collect()
}

/// Sum `weight * gradient^T * dT/dmu` over all samples.
///
/// The result is dense, with one entry per transform parameter.
pub fn accumulate_image_jacobian<T, const D: usize>(
    transform: &T,
    samples: &[GradientSample<D>],
    chunk_size: usize,
) -> Result<Vec<f64>>
where
    T: AdvancedTransform<D> + ?Sized,
{
    let number_of_parameters = transform.number_of_parameters()?;
    tracing::trace!(
        "Accumulating image jacobian: {} samples, {} parameters",
        samples.len(),
        number_of_parameters
    );

    samples
        .par_chunks(chunk_size.max(1))
        .map(|chunk| accumulate_chunk(transform, chunk, number_of_parameters))
        .try_reduce(
            || vec![0.0; number_of_parameters],
            |mut total, partial| {
                for (t, p) in total.iter_mut().zip(partial.iter()) {
                    *t += p;
                }
                Ok(total)
            },
        )
}

fn accumulate_chunk<T, const D: usize>(
    transform: &T,
    chunk: &[GradientSample<D>],
    number_of_parameters: usize,
) -> Result<Vec<f64>>
where
    T: AdvancedTransform<D> + ?Sized,
{
    let mut derivative = vec![0.0; number_of_parameters];
    let mut image_jacobian = Vec::with_capacity(transform.number_of_nonzero_jacobian_indices()?);
    let mut nonzero_indices = Vec::with_capacity(image_jacobian.capacity());

    for sample in chunk {
        transform.evaluate_jacobian_with_image_gradient_product(
            &sample.point,
            &sample.moving_gradient,
            &mut image_jacobian,
            &mut nonzero_indices,
        )?;
        for (&index, &value) in nonzero_indices.iter().zip(image_jacobian.iter()) {
            derivative[index] += sample.weight * value;
        }
    }
    Ok(derivative)
}
