use std::rc::Rc;

use crate::errors::IgaError;
use crate::grids::grid::Grid;
use crate::utilities::linalg::mat_vec;

use super::{evaluate_parametric, GridFunction, GridFunctionValues, Jacobian};

/// The affine map `x -> A x + b`.
#[derive(Clone, Debug)]
pub struct LinearGridFunction<const D: usize, const S: usize>
{
    grid: Rc<Grid<D>>,
    a: Jacobian<D, S>,
    b: [f64; S],
}

impl<const D: usize, const S: usize> LinearGridFunction<D, S>
{
    pub fn create(grid: Rc<Grid<D>>, a: Jacobian<D, S>, b: [f64; S]) -> Rc<Self>
    {
        Rc::new(Self { grid, a, b })
    }

    pub fn get_a(&self) -> &Jacobian<D, S>
    {
        &self.a
    }

    pub fn get_b(&self) -> &[f64; S]
    {
        &self.b
    }
}

impl<const D: usize, const S: usize> GridFunction<D, S> for LinearGridFunction<D, S>
{
    fn get_grid(&self) -> &Rc<Grid<D>>
    {
        &self.grid
    }

    fn evaluate_into(&self, element: usize, points: &[[f64; D]], max_order: usize, out: &mut GridFunctionValues<D, S>) -> Result<(), IgaError>
    {
        evaluate_parametric(&self.grid, element, points, max_order, out, |x, _| {
            let ax = mat_vec(&self.a, x);
            Ok((std::array::from_fn(|i| ax[i] + self.b[i]), self.a, [[[0.0; D]; D]; S]))
        })
    }
}

#[test]
fn check_linear_map_of_surface()
{
    let grid = Grid::<2>::create_uniform(2).unwrap();
    let f = LinearGridFunction::create(grid, [[1.0, 0.0], [0.0, 2.0], [1.0, 1.0]], [0.0, 0.0, 1.0]);
    let v = f.evaluate(0, &[[1.0, 0.5]], 2).unwrap();
    assert_eq!(v.values, vec![[1.0, 1.0, 2.5]]);
    assert_eq!(v.jacobians[0][2], [1.0, 1.0]);
    assert_eq!(v.hessians[0], [[[0.0; 2]; 2]; 3]);
}
