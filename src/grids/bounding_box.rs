use serde::{Deserialize, Serialize};
use serde_with::serde_as;

///
/// Axis aligned box `[lower, upper]` in parametric space. Used for the grid extent,
/// for single elements and for dilating unit-cube quadratures onto an element.
///
#[serde_as]
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox<const D: usize>
{
    #[serde_as(as = "[_; D]")]
    pub lower: [f64; D],
    #[serde_as(as = "[_; D]")]
    pub upper: [f64; D],
}

impl<const D: usize> Default for BoundingBox<D>
{
    #[inline]
    fn default() -> Self
    {
        Self { lower: [0.0; D], upper: [1.0; D] }
    }
}

impl<const D: usize> BoundingBox<D>
{
    #[inline]
    pub fn new(lower: [f64; D], upper: [f64; D]) -> Self
    {
        Self { lower, upper }
    }

    #[inline]
    pub fn width(&self, dim: usize) -> f64
    {
        self.upper[dim] - self.lower[dim]
    }

    #[inline]
    pub fn widths(&self) -> [f64; D]
    {
        std::array::from_fn(|d| self.width(d))
    }

    ///
    /// Volume of the box (width(0)*...*width(D-1)). The empty product gives 1 for `D == 0`.
    ///
    #[inline]
    pub fn volume(&self) -> f64
    {
        (0..D).map(|d| self.width(d)).product()
    }

    #[inline]
    pub fn to_unit_coordinate(&self, point: &[f64; D]) -> [f64; D]
    {
        std::array::from_fn(|i| (point[i] - self.lower[i]) / self.width(i))
    }

    #[inline]
    pub fn to_real_coordinate(&self, point: &[f64; D]) -> [f64; D]
    {
        std::array::from_fn(|i| self.lower[i] + self.width(i) * point[i])
    }

    #[inline]
    pub fn contains(&self, point: &[f64; D]) -> bool
    {
        (0..D).all(|d| self.lower[d] <= point[d] && point[d] <= self.upper[d])
    }

    #[inline]
    pub fn center(&self) -> [f64; D]
    {
        std::array::from_fn(|d| 0.5 * (self.lower[d] + self.upper[d]))
    }
}

#[test]
fn check_bounding_box_coordinates()
{
    let bbox = BoundingBox::new([1.0, -1.0], [3.0, 1.0]);
    approx::assert_relative_eq!(bbox.volume(), 4.0);
    assert_eq!(bbox.to_real_coordinate(&[0.5, 0.5]), [2.0, 0.0]);
    assert_eq!(bbox.to_unit_coordinate(&[3.0, -1.0]), [1.0, 0.0]);
    assert!(bbox.contains(&[1.0, 1.0]));
    assert!(!bbox.contains(&[0.99, 0.0]));
    assert_eq!(bbox.center(), [2.0, 0.0]);
}
