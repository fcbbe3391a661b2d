use std::rc::Rc;

use crate::errors::IgaError;
use crate::grids::grid::Grid;

use super::{evaluate_parametric, GridFunction, GridFunctionValues, Hessian, Jacobian};

type ValueFn<const D: usize, const S: usize> = Box<dyn Fn(&[f64; D]) -> [f64; S]>;
type JacobianFn<const D: usize, const S: usize> = Box<dyn Fn(&[f64; D]) -> Jacobian<D, S>>;
type HessianFn<const D: usize, const S: usize> = Box<dyn Fn(&[f64; D]) -> Hessian<D, S>>;

///
/// A map given by user closures in parametric coordinates. The second derivative is
/// optional; asking for it when it was not supplied fails with `NotImplemented`.
///
pub struct CustomGridFunction<const D: usize, const S: usize>
{
    grid: Rc<Grid<D>>,
    value: ValueFn<D, S>,
    jacobian: JacobianFn<D, S>,
    hessian: Option<HessianFn<D, S>>,
}

impl<const D: usize, const S: usize> std::fmt::Debug for CustomGridFunction<D, S>
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result
    {
        f.debug_struct("CustomGridFunction").field("grid", &self.grid.get_object_id()).field("has_hessian", &self.hessian.is_some()).finish()
    }
}

impl<const D: usize, const S: usize> CustomGridFunction<D, S>
{
    pub fn create<V, J>(grid: Rc<Grid<D>>, value: V, jacobian: J) -> Rc<Self>
    where
        V: Fn(&[f64; D]) -> [f64; S] + 'static,
        J: Fn(&[f64; D]) -> Jacobian<D, S> + 'static,
    {
        Rc::new(Self { grid, value: Box::new(value), jacobian: Box::new(jacobian), hessian: None })
    }

    pub fn create_with_hessian<V, J, H>(grid: Rc<Grid<D>>, value: V, jacobian: J, hessian: H) -> Rc<Self>
    where
        V: Fn(&[f64; D]) -> [f64; S] + 'static,
        J: Fn(&[f64; D]) -> Jacobian<D, S> + 'static,
        H: Fn(&[f64; D]) -> Hessian<D, S> + 'static,
    {
        Rc::new(Self { grid, value: Box::new(value), jacobian: Box::new(jacobian), hessian: Some(Box::new(hessian)) })
    }
}

impl<const D: usize, const S: usize> GridFunction<D, S> for CustomGridFunction<D, S>
{
    fn get_grid(&self) -> &Rc<Grid<D>>
    {
        &self.grid
    }

    fn evaluate_into(&self, element: usize, points: &[[f64; D]], max_order: usize, out: &mut GridFunctionValues<D, S>) -> Result<(), IgaError>
    {
        if max_order >= 2 && self.hessian.is_none()
        {
            return Err(IgaError::NotImplemented("custom grid function without second derivative"));
        }
        evaluate_parametric(&self.grid, element, points, max_order, out, |x, order| {
            let jac = if order >= 1 { (self.jacobian)(x) } else { [[0.0; D]; S] };
            let hess = match (&self.hessian, order >= 2)
            {
                (Some(h), true) => h(x),
                _ => [[[0.0; D]; D]; S],
            };
            Ok(((self.value)(x), jac, hess))
        })
    }
}

#[test]
fn check_custom_parabola()
{
    let grid = Grid::<1>::create_from_knots([vec![0.0, 2.0]]).unwrap();
    let f = CustomGridFunction::<1, 2>::create(grid.clone(), |x| [x[0], x[0] * x[0]], |x| [[1.0], [2.0 * x[0]]]);
    let v = f.evaluate(0, &[[0.5]], 1).unwrap();
    assert_eq!(v.values, vec![[1.0, 1.0]]);
    assert_eq!(v.jacobians, vec![[[1.0], [2.0]]]);
    assert_eq!(f.evaluate(0, &[[0.5]], 2).unwrap_err(), IgaError::NotImplemented("custom grid function without second derivative"));
    let g = CustomGridFunction::<1, 2>::create_with_hessian(grid, |x| [x[0], x[0] * x[0]], |x| [[1.0], [2.0 * x[0]]], |_| [[[0.0]], [[2.0]]]);
    assert_eq!(g.evaluate(0, &[[0.5]], 2).unwrap().hessians, vec![[[[0.0]], [[2.0]]]]);
}
