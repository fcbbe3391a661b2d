pub mod ball;
pub mod custom;
pub mod face;
pub mod identity;
pub mod ig_function;
pub mod linear;

use std::rc::Rc;

use crate::errors::IgaError;
use crate::grids::grid::Grid;

/// Jacobian of a map from `D` to `S` dimensions, row `i` holding the gradient of component `i`.
pub type Jacobian<const D: usize, const S: usize> = [[f64; D]; S];
/// Per component the `D x D` Hessian.
pub type Hessian<const D: usize, const S: usize> = [[[f64; D]; D]; S];

///
/// Values of a grid function at the points of one element. `jacobians` is empty unless
/// first derivatives were requested, `hessians` unless second derivatives were.
///
#[derive(Clone, Debug, Default, PartialEq)]
pub struct GridFunctionValues<const D: usize, const S: usize>
{
    pub values: Vec<[f64; S]>,
    pub jacobians: Vec<Jacobian<D, S>>,
    pub hessians: Vec<Hessian<D, S>>,
}

///
/// A map from the parametric domain of a grid to `S`-dimensional space, evaluated element
/// by element.
///
pub trait GridFunction<const D: usize, const S: usize>
{
    fn get_grid(&self) -> &Rc<Grid<D>>;

    ///
    /// Values and derivatives up to `max_order` (at most 2) at `points` of the unit cube of
    /// element `element`. Derivatives are taken with respect to the parametric coordinates.
    /// The vectors of `out` are cleared and refilled.
    ///
    fn evaluate_into(&self, element: usize, points: &[[f64; D]], max_order: usize, out: &mut GridFunctionValues<D, S>) -> Result<(), IgaError>;

    fn evaluate(&self, element: usize, points: &[[f64; D]], max_order: usize) -> Result<GridFunctionValues<D, S>, IgaError>
    {
        let mut result = GridFunctionValues::default();
        self.evaluate_into(element, points, max_order, &mut result)?;
        Ok(result)
    }
}

impl<const D: usize, const S: usize> GridFunctionValues<D, S>
{
    pub fn clear(&mut self)
    {
        self.values.clear();
        self.jacobians.clear();
        self.hessians.clear();
    }
}

///
/// Evaluates a map given in parametric coordinates on the points of an element.
/// `f` returns value, Jacobian and Hessian at a parametric point; derivative slots beyond
/// `max_order` are not read.
///
pub(crate) fn evaluate_parametric<const D: usize, const S: usize, F>(grid: &Grid<D>, element: usize, points: &[[f64; D]], max_order: usize, out: &mut GridFunctionValues<D, S>, f: F) -> Result<(), IgaError>
where
    F: Fn(&[f64; D], usize) -> Result<([f64; S], Jacobian<D, S>, Hessian<D, S>), IgaError>,
{
    if max_order > 2
    {
        return Err(IgaError::NotImplemented("grid function derivatives above second order"));
    }
    let bbox = grid.get_element_bounding_box(element)?;
    out.clear();
    for p in points
    {
        let (value, jac, hess) = f(&bbox.to_real_coordinate(p), max_order)?;
        out.values.push(value);
        if max_order >= 1
        {
            out.jacobians.push(jac);
        }
        if max_order >= 2
        {
            out.hessians.push(hess);
        }
    }
    Ok(())
}
