//! Spacing type for the physical distance between grid nodes.

use super::Vector;

/// Spacing between adjacent grid nodes along each axis.
///
/// This is a type alias to Vector for semantic clarity.
pub type Spacing<const D: usize> = Vector<D>;

impl<const D: usize> Spacing<D> {
    /// Create uniform spacing (same value for all dimensions).
    pub fn uniform(value: f64) -> Self {
        Self::new([value; D])
    }

    /// True when every component is strictly positive and finite.
    pub fn is_valid_spacing(&self) -> bool {
        (0..D).all(|i| self[i].is_finite() && self[i] > 0.0)
    }
}
