//! Grid geometry with physical metadata.
//!
//! Maps between physical points and continuous grid indices using
//! `index = (Direction * diag(Spacing))^-1 * (point - origin)`.

use nalgebra::{SMatrix, SVector};
use crate::error::{Result, TransformError};
use crate::spatial::{Point, Spacing, Direction, Vector};

/// Continuous index into a grid.
pub type ContinuousIndex<const D: usize> = SVector<f64, D>;

/// Regular lattice with origin, spacing and direction.
///
/// Linear offsets follow the usual image layout: axis 0 varies fastest.
#[derive(Debug, Clone, PartialEq)]
pub struct GridGeometry<const D: usize> {
    size: [usize; D],
    origin: Point<D>,
    spacing: Spacing<D>,
    direction: Direction<D>,
    point_to_index: SMatrix<f64, D, D>,
    index_to_point: SMatrix<f64, D, D>,
    offset_table: [usize; D],
}

impl<const D: usize> GridGeometry<D> {
    /// Create a new grid geometry.
    ///
    /// # Arguments
    /// * `size` - Number of grid nodes along each axis
    /// * `origin` - Physical position of node (0, 0, ...)
    /// * `spacing` - Physical distance between nodes along each axis
    /// * `direction` - Orientation of the grid axes
    pub fn new(
        size: [usize; D],
        origin: Point<D>,
        spacing: Spacing<D>,
        direction: Direction<D>,
    ) -> Result<Self> {
        if size.iter().any(|&s| s == 0) {
            return Err(TransformError::invalid_grid(format!("grid size {:?} has an empty axis", size)));
        }
        if !spacing.is_valid_spacing() {
            return Err(TransformError::invalid_grid(format!(
                "spacing {:?} must be positive and finite",
                spacing.to_array()
            )));
        }

        let index_to_point = direction.matrix() * SMatrix::from_diagonal(&spacing.0);
        let point_to_index = index_to_point.try_inverse().ok_or_else(|| {
            TransformError::singular_matrix("grid direction matrix is not invertible")
        })?;

        let mut offset_table = [0usize; D];
        let mut stride = 1usize;
        for (axis, offset) in offset_table.iter_mut().enumerate() {
            *offset = stride;
            stride *= size[axis];
        }

        Ok(Self {
            size,
            origin,
            spacing,
            direction,
            point_to_index,
            index_to_point,
            offset_table,
        })
    }

    /// Axis-aligned grid with unit direction.
    pub fn axis_aligned(size: [usize; D], origin: Point<D>, spacing: Spacing<D>) -> Result<Self> {
        Self::new(size, origin, spacing, Direction::identity())
    }

    /// Number of nodes along each axis.
    pub fn size(&self) -> [usize; D] {
        self.size
    }

    /// Get the origin.
    pub fn origin(&self) -> &Point<D> {
        &self.origin
    }

    /// Get the spacing.
    pub fn spacing(&self) -> &Spacing<D> {
        &self.spacing
    }

    /// Get the direction.
    pub fn direction(&self) -> &Direction<D> {
        &self.direction
    }

    /// Matrix taking physical displacements to index displacements.
    pub fn point_to_index_matrix(&self) -> &SMatrix<f64, D, D> {
        &self.point_to_index
    }

    /// Matrix taking index displacements to physical displacements.
    pub fn index_to_point_matrix(&self) -> &SMatrix<f64, D, D> {
        &self.index_to_point
    }

    /// Linear stride of each axis.
    pub fn offset_table(&self) -> &[usize; D] {
        &self.offset_table
    }

    /// Total number of grid nodes.
    pub fn number_of_nodes(&self) -> usize {
        self.size.iter().product()
    }

    /// Convert a physical point to a continuous grid index.
    pub fn point_to_continuous_index(&self, point: &Point<D>) -> ContinuousIndex<D> {
        self.point_to_index * (point.0.coords - self.origin.0.coords)
    }

    /// Convert a continuous grid index to a physical point.
    pub fn continuous_index_to_point(&self, index: &ContinuousIndex<D>) -> Point<D> {
        self.origin + Vector(self.index_to_point * index)
    }

    /// Physical position of a grid node.
    pub fn node_position(&self, index: [usize; D]) -> Point<D> {
        let cindex = ContinuousIndex::<D>::from_fn(|i, _| index[i] as f64);
        self.continuous_index_to_point(&cindex)
    }

    /// Linear offset of a node, or `None` when the index lies outside the grid.
    pub fn linear_offset(&self, index: [usize; D]) -> Option<usize> {
        let mut offset = 0;
        for axis in 0..D {
            if index[axis] >= self.size[axis] {
                return None;
            }
            offset += index[axis] * self.offset_table[axis];
        }
        Some(offset)
    }

    /// Multi-index of a linear offset.
    pub fn index_of_offset(&self, mut offset: usize) -> [usize; D] {
        let mut index = [0usize; D];
        for axis in 0..D {
            index[axis] = offset % self.size[axis];
            offset /= self.size[axis];
        }
        index
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_axis_aligned_mapping() {
        let geometry = GridGeometry::<2>::axis_aligned(
            [5, 6],
            Point::new([-10.0, 5.0]),
            Spacing::new([2.0, 4.0]),
        )
        .unwrap();

        let cindex = geometry.point_to_continuous_index(&Point::new([-6.0, 13.0]));
        assert!((cindex[0] - 2.0).abs() < 1e-12);
        assert!((cindex[1] - 2.0).abs() < 1e-12);

        let back = geometry.continuous_index_to_point(&cindex);
        assert!(back.max_abs_diff(&Point::new([-6.0, 13.0])) < 1e-12);
    }

    #[test]
    fn test_rotated_mapping_roundtrip() {
        let (s, c) = (0.7f64).sin_cos();
        let direction = Direction::from_matrix(SMatrix::<f64, 2, 2>::new(c, -s, s, c));
        let geometry = GridGeometry::<2>::new(
            [4, 4],
            Point::new([1.0, 2.0]),
            Spacing::new([1.5, 0.5]),
            direction,
        )
        .unwrap();

        let p = Point::new([3.3, -1.2]);
        let back = geometry.continuous_index_to_point(&geometry.point_to_continuous_index(&p));
        assert!(back.max_abs_diff(&p) < 1e-12);
    }

    #[test]
    fn test_offset_table() {
        let geometry = GridGeometry::<3>::axis_aligned([4, 5, 6], Point::origin(), Spacing::uniform(1.0)).unwrap();
        assert_eq!(geometry.offset_table(), &[1, 4, 20]);
        assert_eq!(geometry.number_of_nodes(), 120);
        assert_eq!(geometry.linear_offset([1, 2, 3]), Some(1 + 8 + 60));
        assert_eq!(geometry.index_of_offset(69), [1, 2, 3]);
        assert_eq!(geometry.linear_offset([4, 0, 0]), None);
    }

    #[test]
    fn test_invalid_geometry() {
        let empty = GridGeometry::<2>::axis_aligned([0, 3], Point::origin(), Spacing::uniform(1.0));
        assert!(matches!(empty, Err(TransformError::InvalidGrid(_))));

        let bad_spacing = GridGeometry::<2>::axis_aligned([3, 3], Point::origin(), Spacing::new([1.0, 0.0]));
        assert!(matches!(bad_spacing, Err(TransformError::InvalidGrid(_))));

        let singular = GridGeometry::<2>::new(
            [3, 3],
            Point::origin(),
            Spacing::uniform(1.0),
            Direction::from_matrix(SMatrix::<f64, 2, 2>::new(1.0, 1.0, 1.0, 1.0)),
        );
        assert!(matches!(singular, Err(TransformError::SingularMatrix(_))));
    }
}
