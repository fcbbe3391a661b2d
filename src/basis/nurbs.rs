use std::cell::{Cell, Ref, RefCell};
use std::rc::{Rc, Weak};

use crate::errors::IgaError;
use crate::grids::refinement_signal::RefinementSignal;
use crate::utilities::next_object_id;

use super::bspline::BSpline;
use super::coefficient_refinement::refine_coefficients;
use super::reference_basis::{BasisCapabilities, BernsteinTables, LocalBasisValues};
use super::spline_space::{SplineSpace, SplineSpaceRefinement};

fn warn_non_positive(object_id: usize, weights: &[f64])
{
    if let Some(w) = weights.iter().find(|&&w| w <= 0.0)
    {
        log::warn!("NURBS basis {} has a non-positive weight {}", object_id, w);
    }
}

///
/// Payload of the NURBS refinement signal: the space and the weights before the refinement.
///
#[derive(Clone, Debug)]
pub struct NurbsRefinement<const D: usize>
{
    pub previous: Rc<SplineSpace<D>>,
    pub previous_weights: Vec<f64>,
}

///
/// Rational basis `R_i = w_i B_i / W` with `W = sum_j w_j B_j`, one weight per dof of the
/// underlying B-spline basis. Components are normalised separately.
///
/// Weights that cannot be refined along with the space leave the basis unusable: evaluation
/// fails with `RefinementFailed` from then on.
///
#[derive(Debug)]
pub struct Nurbs<const D: usize>
{
    object_id: usize,
    bspline: Rc<BSpline<D>>,
    weights: RefCell<Vec<f64>>,
    refinement_failed: Cell<bool>,
    refinement_signal: RefinementSignal<NurbsRefinement<D>>,
}

impl<const D: usize> Nurbs<D>
{
    pub fn create(bspline: Rc<BSpline<D>>, weights: Vec<f64>) -> Result<Rc<Self>, IgaError>
    {
        let n = bspline.get_spline_space().get_num_basis();
        if weights.len() != n
        {
            return Err(IgaError::DimensionMismatch { expected: n, found: weights.len() });
        }
        let object_id = next_object_id();
        warn_non_positive(object_id, &weights);
        let nurbs = Rc::new(Self { object_id, bspline, weights: RefCell::new(weights), refinement_failed: Cell::new(false), refinement_signal: RefinementSignal::default() });
        let weak: Weak<Self> = Rc::downgrade(&nurbs);
        nurbs.bspline.refinement_signal().connect(move |event| match weak.upgrade()
        {
            Some(nurbs) =>
            {
                nurbs.follow_refinement(event);
                true
            }
            None => false,
        });
        Ok(nurbs)
    }

    fn follow_refinement(&self, event: &SplineSpaceRefinement<D>)
    {
        if let Err(e) = self.refine(event)
        {
            log::error!("NURBS basis {} could not refine its weights: {}", self.object_id, e);
            self.refinement_failed.set(true);
        }
    }

    fn refine(&self, event: &SplineSpaceRefinement<D>) -> Result<(), IgaError>
    {
        let space = self.bspline.get_spline_space();
        let refined = {
            let weights = self.weights.borrow();
            refine_coefficients(
                &event.previous.directions(),
                &space.directions(),
                &event.previous.dof_distribution(),
                &space.dof_distribution(),
                &weights,
                1,
            )?
        };
        let previous_weights = std::mem::replace(&mut *self.weights.borrow_mut(), refined);
        log::info!("refined weights of NURBS basis {}", self.object_id);
        self.refinement_signal.emit(&NurbsRefinement { previous: event.previous.clone(), previous_weights });
        Ok(())
    }

    #[inline]
    pub fn get_object_id(&self) -> usize
    {
        self.object_id
    }

    #[inline]
    pub fn get_bspline(&self) -> &Rc<BSpline<D>>
    {
        &self.bspline
    }

    #[inline]
    pub fn get_spline_space(&self) -> &Rc<SplineSpace<D>>
    {
        self.bspline.get_spline_space()
    }

    /// Fired after the weights followed a refinement of the space.
    pub fn refinement_signal(&self) -> &RefinementSignal<NurbsRefinement<D>>
    {
        &self.refinement_signal
    }

    pub fn get_weights(&self) -> Ref<'_, Vec<f64>>
    {
        self.weights.borrow()
    }

    pub fn set_weights(&self, weights: Vec<f64>) -> Result<(), IgaError>
    {
        let n = self.get_spline_space().get_num_basis();
        if weights.len() != n
        {
            return Err(IgaError::DimensionMismatch { expected: n, found: weights.len() });
        }
        warn_non_positive(self.object_id, &weights);
        *self.weights.borrow_mut() = weights;
        Ok(())
    }

    ///
    /// Rational values and derivatives on `element`, written into `out`. The B-spline values
    /// are evaluated into `out` first and divided by the weight function in place.
    ///
    pub fn evaluate_local_into(&self, element: usize, tables: &BernsteinTables<D>, max_order: usize, out: &mut LocalBasisValues<D>) -> Result<(), IgaError>
    {
        if self.refinement_failed.get()
        {
            return Err(IgaError::RefinementFailed { object_id: self.object_id });
        }
        self.bspline.evaluate_local_into(element, tables, max_order, out)?;
        let LocalBasisValues { components, values, gradients, hessians, scratch, .. } = out;
        self.get_spline_space().get_element_dofs_into(element, &mut scratch.dofs)?;
        let all_weights = self.weights.borrow();
        scratch.weights.clear();
        scratch.weights.extend(scratch.dofs.iter().map(|&i| all_weights[i]));
        let w = &scratch.weights;
        let n_points = values.n_points();
        let mut first = 0;
        while first < components.len()
        {
            // functions of one component are contiguous
            let c = components[first];
            let last = first + components[first..].iter().take_while(|&&k| k == c).count();
            for q in 0..n_points
            {
                // weight function and its derivatives
                let mut ww = 0.0;
                let mut wg = [0.0; D];
                let mut wh = [[0.0; D]; D];
                for f in first..last
                {
                    ww += w[f] * values.entry(f, q)[0];
                    if max_order >= 1
                    {
                        for (g, bg) in wg.iter_mut().zip(gradients.entry(f, q))
                        {
                            *g += w[f] * bg;
                        }
                    }
                    if max_order >= 2
                    {
                        let bh = hessians.entry(f, q);
                        for a in 0..D
                        {
                            for b in 0..D
                            {
                                wh[a][b] += w[f] * bh[a * D + b];
                            }
                        }
                    }
                }
                if ww.abs() < f64::EPSILON
                {
                    return Err(IgaError::InvalidArgument("NURBS weight function vanishes"));
                }
                let inv = 1.0 / ww;
                for f in first..last
                {
                    let bv = values.entry(f, q)[0];
                    if max_order >= 2
                    {
                        let bg: [f64; D] = std::array::from_fn(|a| gradients.entry(f, q)[a]);
                        let rh = hessians.entry_mut(f, q);
                        for a in 0..D
                        {
                            for b in 0..D
                            {
                                let i = a * D + b;
                                rh[i] = w[f] * (rh[i] * inv
                                    - (bg[a] * wg[b] + bg[b] * wg[a] + bv * wh[a][b]) * inv * inv
                                    + 2.0 * bv * wg[a] * wg[b] * inv * inv * inv);
                            }
                        }
                    }
                    if max_order >= 1
                    {
                        let rg = gradients.entry_mut(f, q);
                        for a in 0..D
                        {
                            rg[a] = w[f] * (rg[a] * inv - bv * wg[a] * inv * inv);
                        }
                    }
                    values.entry_mut(f, q)[0] = w[f] * bv * inv;
                }
            }
            first = last;
        }
        Ok(())
    }
}

impl<const D: usize> BasisCapabilities<D> for Nurbs<D>
{
    fn get_spline_space(&self) -> &Rc<SplineSpace<D>>
    {
        Nurbs::get_spline_space(self)
    }

    fn evaluate_local_into(&self, element: usize, tables: &BernsteinTables<D>, max_order: usize, out: &mut LocalBasisValues<D>) -> Result<(), IgaError>
    {
        Nurbs::evaluate_local_into(self, element, tables, max_order, out)
    }
}

#[cfg(test)]
mod tests
{
    use super::*;
    use crate::grids::grid::Grid;
    use approx::assert_abs_diff_eq;

    #[test]
    fn unit_weights_reproduce_the_bspline_basis()
    {
        let grid = Grid::<2>::create_uniform(3).unwrap();
        let bspline = BSpline::create(SplineSpace::create_scalar(grid, 2).unwrap());
        let nurbs = Nurbs::create(bspline.clone(), vec![1.0; 16]).unwrap();
        let points = [[0.2, 0.7], [0.9, 0.1]];
        let b = bspline.evaluate_basis_at_points(2, &points, 2).unwrap();
        let r = nurbs.evaluate_basis_at_points(2, &points, 2).unwrap();
        for f in 0..9
        {
            for q in 0..2
            {
                assert_abs_diff_eq!(r.values.entry(f, q)[0], b.values.entry(f, q)[0], epsilon = 1e-13);
                for a in 0..2
                {
                    assert_abs_diff_eq!(r.gradients.entry(f, q)[a], b.gradients.entry(f, q)[a], epsilon = 1e-12);
                }
                for i in 0..4
                {
                    assert_abs_diff_eq!(r.hessians.entry(f, q)[i], b.hessians.entry(f, q)[i], epsilon = 1e-10);
                }
            }
        }
    }

    #[test]
    fn rational_derivative_matches_finite_difference()
    {
        let grid = Grid::<1>::create_uniform(2).unwrap();
        let bspline = BSpline::create(SplineSpace::create_scalar(grid, 2).unwrap());
        let nurbs = Nurbs::create(bspline, vec![1.0, 1.0 / 2.0_f64.sqrt(), 1.0]).unwrap();
        let x = 0.37;
        let h = 1e-6;
        let r = nurbs.evaluate_basis_at_points(0, &[[x], [x - h], [x + h]], 2).unwrap();
        let mut sum = 0.0;
        for f in 0..3
        {
            sum += r.values.entry(f, 0)[0];
            let fd = (r.values.entry(f, 2)[0] - r.values.entry(f, 1)[0]) / (2.0 * h);
            assert_abs_diff_eq!(r.gradients.entry(f, 0)[0], fd, epsilon = 1e-7);
            let fd2 = (r.gradients.entry(f, 2)[0] - r.gradients.entry(f, 1)[0]) / (2.0 * h);
            assert_abs_diff_eq!(r.hessians.entry(f, 0)[0], fd2, epsilon = 1e-6);
        }
        assert_abs_diff_eq!(sum, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn weights_follow_refinement()
    {
        let grid = Grid::<1>::create_uniform(2).unwrap();
        let bspline = BSpline::create(SplineSpace::create_scalar(grid.clone(), 2).unwrap());
        let nurbs = Nurbs::create(bspline, vec![1.0, 0.5, 1.0]).unwrap();
        grid.refine(2).unwrap();
        assert_eq!(nurbs.get_weights().len(), 4);
        // knot insertion at 0.5: (1, 0.5, 1) -> (1, 0.75, 0.75, 1)
        assert_abs_diff_eq!(nurbs.get_weights()[0], 1.0, epsilon = 1e-14);
        assert_abs_diff_eq!(nurbs.get_weights()[3], 1.0, epsilon = 1e-14);
        assert_abs_diff_eq!(nurbs.get_weights()[1], 0.75, epsilon = 1e-14);
        assert_abs_diff_eq!(nurbs.get_weights()[2], 0.75, epsilon = 1e-14);
        assert!(Nurbs::create(BSpline::create(SplineSpace::create_scalar(grid, 1).unwrap()), vec![1.0]).is_err());
    }

    #[test]
    fn weights_that_miss_a_refinement_block_evaluation()
    {
        let grid = Grid::<1>::create_uniform(2).unwrap();
        let nurbs = Nurbs::create(BSpline::create(SplineSpace::create_scalar(grid, 2).unwrap()), vec![1.0, 0.5, 1.0]).unwrap();
        // a coarse space with a different number of functions than there are weights
        let unrelated = SplineSpace::create_scalar(Grid::<1>::create_uniform(3).unwrap(), 2).unwrap();
        nurbs.follow_refinement(&SplineSpaceRefinement { previous: unrelated });
        assert_eq!(nurbs.get_weights().len(), 3);
        let err = nurbs.evaluate_basis_at_points(0, &[[0.5]], 0).unwrap_err();
        assert_eq!(err, IgaError::RefinementFailed { object_id: nurbs.get_object_id() });
    }

    #[test]
    fn evaluation_reuses_the_output_storage()
    {
        let grid = Grid::<2>::create_uniform(4).unwrap();
        let nurbs = Nurbs::create(BSpline::create(SplineSpace::create_scalar(grid, 2).unwrap()), vec![0.8; 25]).unwrap();
        let points = [[0.1, 0.2], [0.6, 0.9], [0.3, 0.3]];
        let degrees = [nurbs.get_spline_space().get_degree(0).unwrap()];
        let tables = BernsteinTables::new(&degrees, &points, 2);
        let mut out = LocalBasisValues::default();
        nurbs.evaluate_local_into(0, &tables, 2, &mut out).unwrap();
        let buffers = (out.values.as_slice().as_ptr(), out.hessians.as_slice().as_ptr(), out.scratch.univariate.as_ptr(), out.scratch.weights.as_ptr());
        for element in 1..9
        {
            nurbs.evaluate_local_into(element, &tables, 2, &mut out).unwrap();
            assert_eq!(buffers, (out.values.as_slice().as_ptr(), out.hessians.as_slice().as_ptr(), out.scratch.univariate.as_ptr(), out.scratch.weights.as_ptr()));
            // constant weights give back the B-splines, a partition of unity
            let sum: f64 = (0..9).map(|f| out.values.entry(f, 1)[0]).sum();
            assert_abs_diff_eq!(sum, 1.0, epsilon = 1e-13);
        }
    }
}
