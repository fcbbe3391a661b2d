pub mod gauss_legendre;

use crate::errors::IgaError;
use crate::grids::bounding_box::BoundingBox;
use crate::grids::unit_element::SubElement;
use crate::utilities::next_object_id;
use crate::utilities::tensor_index::TensorIndexer;

use gauss_legendre::gauss_legendre_rule;

///
/// Point set on the unit cube `[0,1]^D`, optionally with weights.
///
/// Every rule carries a unique id; element caches use it to detect a change of quadrature.
/// Rules lifted onto a sub-element keep track of the directions they span, so that
/// dilation scales the weights by the sub-element measure only.
///
#[derive(Clone, Debug, PartialEq)]
pub struct Quadrature<const D: usize>
{
    id: usize,
    points: Vec<[f64; D]>,
    weights: Option<Vec<f64>>,
    active_directions: Vec<usize>,
}

fn tensor_product<const D: usize>(rules: [(Vec<f64>, Vec<f64>); D]) -> (Vec<[f64; D]>, Vec<f64>)
{
    let indexer: TensorIndexer<D> = TensorIndexer::new(std::array::from_fn(|d| rules[d].0.len()));
    let mut points = Vec::with_capacity(indexer.flat_size());
    let mut weights = Vec::with_capacity(indexer.flat_size());
    for t in indexer.iter()
    {
        points.push(std::array::from_fn(|d| rules[d].0[t[d]]));
        weights.push((0..D).map(|d| rules[d].1[t[d]]).product());
    }
    (points, weights)
}

impl<const D: usize> Quadrature<D>
{
    pub fn new(points: Vec<[f64; D]>, weights: Vec<f64>) -> Result<Self, IgaError>
    {
        if points.len() != weights.len()
        {
            return Err(IgaError::DimensionMismatch { expected: points.len(), found: weights.len() });
        }
        Self::check_points(&points)?;
        Ok(Self { id: next_object_id(), points, weights: Some(weights), active_directions: (0..D).collect() })
    }

    /// Point set without weights, e.g. for sampling the basis for visualization.
    pub fn from_points(points: Vec<[f64; D]>) -> Result<Self, IgaError>
    {
        Self::check_points(&points)?;
        Ok(Self { id: next_object_id(), points, weights: None, active_directions: (0..D).collect() })
    }

    fn check_points(points: &[[f64; D]]) -> Result<(), IgaError>
    {
        if points.iter().flatten().any(|&x| !(0.0..=1.0).contains(&x))
        {
            return Err(IgaError::InvalidArgument("quadrature points must lie in the unit cube"));
        }
        Ok(())
    }

    ///
    /// Tensor-product Gauss-Legendre rule with `n[d]` points in direction `d`. Exact for
    /// polynomials of degree `2*n[d]-1` in each direction.
    ///
    pub fn gauss(n: [usize; D]) -> Result<Self, IgaError>
    {
        if n.contains(&0)
        {
            return Err(IgaError::InvalidArgument("a quadrature needs at least one point per direction"));
        }
        let (points, weights) = tensor_product(std::array::from_fn(|d| gauss_legendre_rule(n[d])));
        Self::new(points, weights)
    }

    pub fn gauss_isotropic(n: usize) -> Result<Self, IgaError>
    {
        Self::gauss([n; D])
    }

    ///
    /// Equally spaced points including the end points (the Greville points of a Bernstein
    /// basis of degree `n-1`), with trapezoidal weights. A single point sits at 0.5.
    ///
    pub fn uniform(n: [usize; D]) -> Result<Self, IgaError>
    {
        if n.contains(&0)
        {
            return Err(IgaError::InvalidArgument("a quadrature needs at least one point per direction"));
        }
        let rule_1d = |n: usize| -> (Vec<f64>, Vec<f64>) {
            if n == 1
            {
                return (vec![0.5], vec![1.0]);
            }
            let h = 1.0 / (n - 1) as f64;
            let points = (0..n).map(|i| i as f64 * h).collect();
            let weights = (0..n).map(|i| if i == 0 || i == n - 1 { 0.5 * h } else { h }).collect();
            (points, weights)
        };
        let (points, weights) = tensor_product(std::array::from_fn(|d| rule_1d(n[d])));
        Self::new(points, weights)
    }

    #[inline]
    pub fn get_id(&self) -> usize
    {
        self.id
    }

    #[inline]
    pub fn get_num_points(&self) -> usize
    {
        self.points.len()
    }

    #[inline]
    pub fn get_points(&self) -> &[[f64; D]]
    {
        &self.points
    }

    pub fn get_weights(&self) -> Result<&[f64], IgaError>
    {
        self.weights.as_deref().ok_or(IgaError::InvalidArgument("quadrature has no weights"))
    }

    #[inline]
    pub fn has_weights(&self) -> bool
    {
        self.weights.is_some()
    }

    #[inline]
    pub fn get_active_directions(&self) -> &[usize]
    {
        &self.active_directions
    }

    ///
    /// Lifts this `D`-dimensional rule onto the sub-element `sub` of the unit `N`-cube.
    /// The sub-element must have dimension `D`.
    ///
    pub fn collapse_to_sub_element<const N: usize>(&self, sub: &SubElement) -> Result<Quadrature<N>, IgaError>
    {
        if sub.dim != D
        {
            return Err(IgaError::DimensionMismatch { expected: sub.dim, found: D });
        }
        let active_directions = self.active_directions.iter().map(|&k| sub.active_directions[k]).collect();
        Ok(Quadrature
        {
            id: next_object_id(),
            points: self.points.iter().map(|p| sub.lift_point(p)).collect(),
            weights: self.weights.clone(),
            active_directions,
        })
    }

    /// Weights scaled by the widths of the box in the directions this rule spans.
    pub fn dilated_weights(&self, bbox: &BoundingBox<D>) -> Result<Vec<f64>, IgaError>
    {
        let scale = self.dilation_scale(bbox);
        Ok(self.get_weights()?.iter().map(|w| w * scale).collect())
    }

    /// Measure of `bbox` restricted to the active directions.
    pub fn dilation_scale(&self, bbox: &BoundingBox<D>) -> f64
    {
        self.active_directions.iter().map(|&d| bbox.width(d)).product()
    }

    ///
    /// The rule mapped onto `bbox`. Points are translated and scaled, weights scaled by the
    /// measure of the box restricted to the active directions.
    ///
    pub fn dilate(&self, bbox: &BoundingBox<D>) -> Quadrature<D>
    {
        let scale: f64 = self.active_directions.iter().map(|&d| bbox.width(d)).product();
        Quadrature
        {
            id: next_object_id(),
            points: self.points.iter().map(|p| bbox.to_real_coordinate(p)).collect(),
            weights: self.weights.as_ref().map(|w| w.iter().map(|w| w * scale).collect()),
            active_directions: self.active_directions.clone(),
        }
    }
}

#[test]
fn check_gauss_tensor_rule()
{
    let quad = Quadrature::<2>::gauss([2, 3]).unwrap();
    assert_eq!(quad.get_num_points(), 6);
    let weights = quad.get_weights().unwrap();
    approx::assert_relative_eq!(weights.iter().sum::<f64>(), 1.0, epsilon = 1e-14);
    // direction 0 varies fastest
    assert_eq!(quad.get_points()[0][1], quad.get_points()[1][1]);
    // exact for x^3 y^5
    let integral: f64 = quad.get_points().iter().zip(weights).map(|(p, w)| w * p[0].powi(3) * p[1].powi(5)).sum();
    approx::assert_relative_eq!(integral, 1.0 / 24.0, epsilon = 1e-14);
    assert!(Quadrature::<2>::gauss([0, 1]).is_err());
}

#[test]
fn check_uniform_rule()
{
    let quad = Quadrature::<1>::uniform([3]).unwrap();
    assert_eq!(quad.get_points(), &[[0.0], [0.5], [1.0]]);
    assert_eq!(quad.get_weights().unwrap(), &[0.25, 0.5, 0.25]);
    assert!(Quadrature::<1>::from_points(vec![[1.5]]).is_err());
    assert!(Quadrature::<1>::from_points(vec![[0.5]]).unwrap().get_weights().is_err());
}

#[test]
fn check_collapse_and_dilate()
{
    use crate::grids::unit_element::UnitElement;
    let face_quad = Quadrature::<1>::gauss([2]).unwrap();
    let face = UnitElement::<2>::sub_element(1, 1).unwrap();
    let lifted: Quadrature<2> = face_quad.collapse_to_sub_element(&face).unwrap();
    assert!(lifted.get_points().iter().all(|p| p[0] == 1.0));
    assert_eq!(lifted.get_active_directions(), &[1]);
    assert_ne!(lifted.get_id(), face_quad.get_id());
    let bbox = BoundingBox::new([0.0, 0.0], [2.0, 3.0]);
    let total: f64 = lifted.dilated_weights(&bbox).unwrap().iter().sum();
    approx::assert_relative_eq!(total, 3.0, epsilon = 1e-14);
    let dilated = lifted.dilate(&bbox);
    assert!(dilated.get_points().iter().all(|p| p[0] == 2.0));
    let wrong_dim = UnitElement::<2>::sub_element(0, 0).unwrap();
    assert!(face_quad.collapse_to_sub_element::<2>(&wrong_dim).is_err());
}
