use std::rc::Rc;

use crate::errors::IgaError;
use crate::grids::grid::Grid;

use super::{evaluate_parametric, GridFunction, GridFunctionValues, Hessian, Jacobian};

///
/// Hyperspherical coordinates `(r, theta_1, ..., theta_{D-1})` mapped to Cartesian ones:
///
/// `x_i = r sin(theta_1) ... sin(theta_i) cos(theta_{i+1})` for `i < D-1`,
/// `x_{D-1} = r sin(theta_1) ... sin(theta_{D-1})`.
///
/// In two dimensions these are polar coordinates, in three the spherical ones with
/// `theta_1` the polar angle measured from the `x_0` axis.
///
#[derive(Clone, Debug)]
pub struct BallGridFunction<const D: usize>
{
    grid: Rc<Grid<D>>,
}

impl<const D: usize> BallGridFunction<D>
{
    pub fn create(grid: Rc<Grid<D>>) -> Rc<Self>
    {
        Rc::new(Self { grid })
    }

    /// `[f, f', f'']` of the factor of component `i` depending on coordinate `k`.
    fn factor(i: usize, k: usize, x: &[f64; D]) -> [f64; 3]
    {
        if k == 0
        {
            return [x[0], 1.0, 0.0];
        }
        let (s, c) = x[k].sin_cos();
        if k <= i
        {
            [s, c, -s]
        }
        else if k == i + 1
        {
            [c, -s, -c]
        }
        else
        {
            [1.0, 0.0, 0.0]
        }
    }

    pub(crate) fn map(x: &[f64; D]) -> ([f64; D], Jacobian<D, D>, Hessian<D, D>)
    {
        let mut value = [0.0; D];
        let mut jac = [[0.0; D]; D];
        let mut hess = [[[0.0; D]; D]; D];
        for i in 0..D
        {
            let factors: [[f64; 3]; D] = std::array::from_fn(|k| Self::factor(i, k, x));
            let product = |orders: [usize; D]| -> f64 { (0..D).map(|k| factors[k][orders[k]]).product() };
            value[i] = product([0; D]);
            for a in 0..D
            {
                let mut orders = [0; D];
                orders[a] = 1;
                jac[i][a] = product(orders);
                for b in 0..D
                {
                    let mut orders = [0; D];
                    orders[a] += 1;
                    orders[b] += 1;
                    hess[i][a][b] = product(orders);
                }
            }
        }
        (value, jac, hess)
    }
}

impl<const D: usize> GridFunction<D, D> for BallGridFunction<D>
{
    fn get_grid(&self) -> &Rc<Grid<D>>
    {
        &self.grid
    }

    fn evaluate_into(&self, element: usize, points: &[[f64; D]], max_order: usize, out: &mut GridFunctionValues<D, D>) -> Result<(), IgaError>
    {
        evaluate_parametric(&self.grid, element, points, max_order, out, |x, _| Ok(Self::map(x)))
    }
}

#[cfg(test)]
mod tests
{
    use super::*;
    use approx::assert_abs_diff_eq;
    use std::f64::consts::PI;

    #[test]
    fn polar_coordinates()
    {
        let (v, jac, hess) = BallGridFunction::<2>::map(&[2.0, PI / 6.0]);
        assert_abs_diff_eq!(v[0], 3.0_f64.sqrt(), epsilon = 1e-14);
        assert_abs_diff_eq!(v[1], 1.0, epsilon = 1e-14);
        // det J = r
        assert_abs_diff_eq!(jac[0][0] * jac[1][1] - jac[0][1] * jac[1][0], 2.0, epsilon = 1e-14);
        // d^2 x / d theta^2 = -x
        assert_abs_diff_eq!(hess[0][1][1], -v[0], epsilon = 1e-14);
        assert_abs_diff_eq!(hess[1][0][1], jac[1][1] / 2.0, epsilon = 1e-14);
    }

    #[test]
    fn spherical_coordinates_stay_on_the_sphere()
    {
        let x = [1.5, 0.7, 2.1];
        let (v, jac, _) = BallGridFunction::<3>::map(&x);
        let r: f64 = v.iter().map(|c| c * c).sum::<f64>().sqrt();
        assert_abs_diff_eq!(r, 1.5, epsilon = 1e-14);
        // r^2 sin(theta_1) is the volume element
        let det = crate::utilities::linalg::determinant(&jac);
        assert_abs_diff_eq!(det.abs(), 1.5 * 1.5 * 0.7_f64.sin(), epsilon = 1e-13);
    }
}
