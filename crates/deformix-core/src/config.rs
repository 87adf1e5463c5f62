//! Configuration settings for transforms.
//!
//! Settings are plain serde structs. They are validated when turned into
//! runtime objects, so a malformed file fails before any evaluation starts.

use nalgebra::SMatrix;
use serde::{Deserialize, Serialize};
use crate::error::{Result, TransformError};
use crate::grid::GridGeometry;
use crate::spatial::{Direction, Point, Spacing};
use crate::transform::{CombinationMode, CombinationTransform, RecursiveBSplineTransform};

/// Settings of a combination transform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CombinationConfig {
    /// How the initial and current transforms are combined.
    #[serde(default)]
    pub mode: CombinationMode,
}

impl CombinationConfig {
    /// Create a new combination config with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the combination mode.
    pub fn with_mode(mut self, mode: CombinationMode) -> Self {
        self.mode = mode;
        self
    }

    /// Apply the settings to a combination transform.
    pub fn apply<const D: usize>(&self, transform: &mut CombinationTransform<D>) {
        transform.set_combination_mode(self.mode);
    }
}

fn default_spline_order() -> usize {
    3
}

/// Control point grid of a B-spline transform.
///
/// Vectors must have one entry per axis; `grid_direction`, when present, is
/// a row-major `D x D` matrix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BSplineGridConfig {
    /// Spline order (1, 2 or 3).
    #[serde(default = "default_spline_order")]
    pub spline_order: usize,
    /// Number of control points per axis.
    pub grid_size: Vec<usize>,
    /// Physical position of the first control point.
    pub grid_origin: Vec<f64>,
    /// Distance between control points per axis.
    pub grid_spacing: Vec<f64>,
    /// Axis directions, identity when absent.
    #[serde(default)]
    pub grid_direction: Option<Vec<f64>>,
}

impl Default for BSplineGridConfig {
    fn default() -> Self {
        Self {
            spline_order: default_spline_order(),
            grid_size: Vec::new(),
            grid_origin: Vec::new(),
            grid_spacing: Vec::new(),
            grid_direction: None,
        }
    }
}

impl BSplineGridConfig {
    /// Create an isotropic grid config of `D` axes.
    pub fn uniform<const D: usize>(size: usize, origin: f64, spacing: f64) -> Self {
        Self {
            grid_size: vec![size; D],
            grid_origin: vec![origin; D],
            grid_spacing: vec![spacing; D],
            ..Self::default()
        }
    }

    /// Set the spline order.
    pub fn with_spline_order(mut self, order: usize) -> Self {
        self.spline_order = order;
        self
    }

    /// Set the grid size.
    pub fn with_grid_size(mut self, size: Vec<usize>) -> Self {
        self.grid_size = size;
        self
    }

    /// Set the grid origin.
    pub fn with_grid_origin(mut self, origin: Vec<f64>) -> Self {
        self.grid_origin = origin;
        self
    }

    /// Set the grid spacing.
    pub fn with_grid_spacing(mut self, spacing: Vec<f64>) -> Self {
        self.grid_spacing = spacing;
        self
    }

    /// Set the row-major direction matrix.
    pub fn with_grid_direction(mut self, direction: Vec<f64>) -> Self {
        self.grid_direction = Some(direction);
        self
    }

    /// Check field lengths and the spline order for a `D`-dimensional grid.
    pub fn validate<const D: usize>(&self) -> Result<()> {
        if self.spline_order == 0 || self.spline_order > 3 {
            return Err(TransformError::InvalidSplineOrder(self.spline_order));
        }
        check_len("grid_size", self.grid_size.len(), D)?;
        check_len("grid_origin", self.grid_origin.len(), D)?;
        check_len("grid_spacing", self.grid_spacing.len(), D)?;
        if let Some(direction) = &self.grid_direction {
            check_len("grid_direction", direction.len(), D * D)?;
        }
        Ok(())
    }

    /// Build the grid geometry.
    pub fn into_geometry<const D: usize>(&self) -> Result<GridGeometry<D>> {
        self.validate::<D>()?;
        let size: [usize; D] = std::array::from_fn(|i| self.grid_size[i]);
        let origin = Point::new(std::array::from_fn(|i| self.grid_origin[i]));
        let spacing = Spacing::new(std::array::from_fn(|i| self.grid_spacing[i]));
        let direction = match &self.grid_direction {
            Some(values) => Direction::from_matrix(SMatrix::from_fn(|row, col| values[row * D + col])),
            None => Direction::identity(),
        };
        GridGeometry::new(size, origin, spacing, direction)
    }

    /// Build a zero-displacement B-spline transform on the configured grid.
    pub fn build<const D: usize>(&self) -> Result<RecursiveBSplineTransform<D>> {
        RecursiveBSplineTransform::new(self.into_geometry::<D>()?, self.spline_order)
    }
}

fn check_len(field: &str, actual: usize, expected: usize) -> Result<()> {
    if actual != expected {
        return Err(TransformError::invalid_grid(format!(
            "{} has {} entries, expected {}",
            field, actual, expected
        )));
    }
    Ok(())
}
