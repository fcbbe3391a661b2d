use std::rc::Rc;

use crate::errors::IgaError;
use crate::grids::grid::Grid;

use super::{evaluate_parametric, GridFunction, GridFunctionValues};

/// The parametric coordinates themselves.
#[derive(Clone, Debug)]
pub struct IdentityGridFunction<const D: usize>
{
    grid: Rc<Grid<D>>,
}

impl<const D: usize> IdentityGridFunction<D>
{
    pub fn create(grid: Rc<Grid<D>>) -> Rc<Self>
    {
        Rc::new(Self { grid })
    }
}

impl<const D: usize> GridFunction<D, D> for IdentityGridFunction<D>
{
    fn get_grid(&self) -> &Rc<Grid<D>>
    {
        &self.grid
    }

    fn evaluate_into(&self, element: usize, points: &[[f64; D]], max_order: usize, out: &mut GridFunctionValues<D, D>) -> Result<(), IgaError>
    {
        let identity: [[f64; D]; D] = std::array::from_fn(|i| std::array::from_fn(|j| if i == j { 1.0 } else { 0.0 }));
        evaluate_parametric(&self.grid, element, points, max_order, out, |x, _| Ok((*x, identity, [[[0.0; D]; D]; D])))
    }
}

#[test]
fn check_identity_maps_element_points()
{
    let grid = Grid::<2>::create_from_knots([vec![0.0, 1.0, 3.0], vec![0.0, 2.0]]).unwrap();
    let f = IdentityGridFunction::create(grid);
    let v = f.evaluate(1, &[[0.5, 0.25]], 1).unwrap();
    assert_eq!(v.values, vec![[2.0, 0.5]]);
    assert_eq!(v.jacobians, vec![[[1.0, 0.0], [0.0, 1.0]]]);
    assert!(v.hessians.is_empty());
}
