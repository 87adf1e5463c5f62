//! Batched point mapping on burn tensors.

use burn::tensor::backend::Backend;
use burn::tensor::{Shape, Tensor, TensorData};
use crate::error::{Result, TransformError};
use crate::spatial::Point;
use super::batch::transform_points_parallel;
use super::trait_::AdvancedTransform;

/// Transform trait for batches of points stored in tensors.
///
/// # Type Parameters
/// * `B` - The Burn backend
/// * `D` - The spatial dimensionality
pub trait Transform<B: Backend, const D: usize> {
    /// Apply transform to a batch of points.
    ///
    /// # Arguments
    /// * `points` - Tensor of shape `[Batch, D]` containing the input points
    ///
    /// # Returns
    /// Tensor of shape `[Batch, D]` containing the transformed points
    fn transform_points(&self, points: Tensor<B, 2>) -> Result<Tensor<B, 2>>;
}

impl<B, T, const D: usize> Transform<B, D> for T
where
    B: Backend,
    T: AdvancedTransform<D> + ?Sized,
{
    fn transform_points(&self, points: Tensor<B, 2>) -> Result<Tensor<B, 2>> {
        let [batch, dims] = points.dims();
        if dims != D {
            return Err(TransformError::ShapeMismatch {
                expected: vec![batch, D],
                actual: vec![batch, dims],
            });
        }
        let device = points.device();

        let values = points
            .into_data()
            .convert::<f64>()
            .to_vec::<f64>()
            .map_err(|e| TransformError::tensor(format!("{:?}", e)))?;
        let input: Vec<Point<D>> = values
            .chunks_exact(D)
            .map(|c| Point::new(std::array::from_fn(|i| c[i])))
            .collect();

        let mapped = transform_points_parallel(self, &input)?;
        let output: Vec<f64> = mapped.iter().flat_map(|p| p.to_array()).collect();
        Ok(Tensor::from_data(TensorData::new(output, Shape::new([batch, D])), &device))
    }
}
