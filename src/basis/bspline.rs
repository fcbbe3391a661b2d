use std::cell::{Ref, RefCell};
use std::rc::{Rc, Weak};

use crate::errors::IgaError;
use crate::grids::refinement_signal::RefinementSignal;
use crate::utilities::next_object_id;
use crate::utilities::tensor_index::TensorIndexIterator;

use super::bernstein_extraction::BernsteinExtraction;
use super::reference_basis::{BasisCapabilities, BernsteinTables, LocalBasisValues};
use super::spline_space::{SplineSpace, SplineSpaceRefinement};

///
/// B-spline basis of a spline space, evaluated through Bernstein extraction.
///
/// The extraction operators are rebuilt whenever the space follows a grid refinement, after
/// which the basis re-emits the space's refinement event to its own observers.
///
#[derive(Debug)]
pub struct BSpline<const D: usize>
{
    object_id: usize,
    space: Rc<SplineSpace<D>>,
    extraction: RefCell<BernsteinExtraction<D>>,
    refinement_signal: RefinementSignal<SplineSpaceRefinement<D>>,
}

impl<const D: usize> BSpline<D>
{
    pub fn create(space: Rc<SplineSpace<D>>) -> Rc<Self>
    {
        let extraction = RefCell::new(BernsteinExtraction::new(&space));
        let basis = Rc::new(Self { object_id: next_object_id(), space, extraction, refinement_signal: RefinementSignal::default() });
        let weak: Weak<Self> = Rc::downgrade(&basis);
        basis.space.refinement_signal().connect(move |event| match weak.upgrade()
        {
            Some(basis) =>
            {
                basis.refine(event);
                true
            }
            None => false,
        });
        basis
    }

    fn refine(&self, event: &SplineSpaceRefinement<D>)
    {
        *self.extraction.borrow_mut() = BernsteinExtraction::new(&self.space);
        log::info!("rebuilt extraction operators of basis {}", self.object_id);
        self.refinement_signal.emit(event);
    }

    #[inline]
    pub fn get_object_id(&self) -> usize
    {
        self.object_id
    }

    #[inline]
    pub fn get_spline_space(&self) -> &Rc<SplineSpace<D>>
    {
        &self.space
    }

    /// Fired after the extraction operators followed a refinement of the space.
    pub fn refinement_signal(&self) -> &RefinementSignal<SplineSpaceRefinement<D>>
    {
        &self.refinement_signal
    }

    pub fn extraction(&self) -> Ref<'_, BernsteinExtraction<D>>
    {
        self.extraction.borrow()
    }

    ///
    /// Values and parametric derivatives up to `max_order` of the functions active on
    /// `element`, written into `out` with its storage reused.
    ///
    pub fn evaluate_local_into(&self, element: usize, tables: &BernsteinTables<D>, max_order: usize, out: &mut LocalBasisValues<D>) -> Result<(), IgaError>
    {
        if max_order > tables.max_order()
        {
            return Err(IgaError::InvalidArgument("derivative order exceeds the Bernstein tables"));
        }
        self.space.check_refinement()?;
        let grid = self.space.get_grid();
        let element_tensor = grid.flat_to_tensor(element)?;
        let lengths = grid.get_element_lengths(element)?;
        let n_points = tables.n_points();
        let n_comp = self.space.get_num_components();
        out.components.clear();
        for c in 0..n_comp
        {
            let n_local: usize = self.space.get_degree(c)?.iter().map(|q| q + 1).product();
            out.components.extend(std::iter::repeat(c).take(n_local));
        }
        out.set_layout(n_points, max_order);
        let LocalBasisValues { values, gradients, hessians, scratch, .. } = out;
        let extraction = self.extraction.borrow();
        let n_orders = max_order + 1;
        let mut first = 0;
        for c in 0..n_comp
        {
            let p = self.space.get_degree(c)?;
            let local_sizes: [usize; D] = std::array::from_fn(|d| p[d] + 1);
            let operators = extraction.get_element_operators(c, &element_tensor);
            // per direction, per point and order, the univariate B-splines of the element
            let mut starts = [0; D];
            let mut total = 0;
            for d in 0..D
            {
                starts[d] = total;
                total += n_points * n_orders * local_sizes[d];
            }
            scratch.univariate.resize(total, 0.0);
            for d in 0..D
            {
                let n = local_sizes[d];
                let table = tables.get(c, d);
                let scale = 1.0 / lengths[d];
                for q in 0..n_points
                {
                    let mut factor = 1.0;
                    for r in 0..n_orders
                    {
                        let start = starts[d] + (q * n_orders + r) * n;
                        let slot = &mut scratch.univariate[start..start + n];
                        operators[d].apply(table.get(q, r), slot);
                        slot.iter_mut().for_each(|v| *v *= factor);
                        factor *= scale;
                    }
                }
            }
            let univariate = &scratch.univariate;
            let eval = |q: usize, local: &[usize; D], orders: [usize; D]| -> f64 {
                (0..D).map(|d| univariate[starts[d] + (q * n_orders + orders[d]) * local_sizes[d] + local[d]]).product()
            };
            for (i, local) in TensorIndexIterator::new(local_sizes).enumerate()
            {
                let f = first + i;
                for q in 0..n_points
                {
                    values.entry_mut(f, q)[0] = eval(q, &local, [0; D]);
                    if max_order >= 1
                    {
                        let grad = gradients.entry_mut(f, q);
                        for a in 0..D
                        {
                            let mut orders = [0; D];
                            orders[a] = 1;
                            grad[a] = eval(q, &local, orders);
                        }
                    }
                    if max_order >= 2
                    {
                        let hess = hessians.entry_mut(f, q);
                        for a in 0..D
                        {
                            for b in a..D
                            {
                                let mut orders = [0; D];
                                orders[a] += 1;
                                orders[b] += 1;
                                let v = eval(q, &local, orders);
                                hess[a * D + b] = v;
                                hess[b * D + a] = v;
                            }
                        }
                    }
                }
            }
            first += local_sizes.iter().product::<usize>();
        }
        Ok(())
    }
}

impl<const D: usize> BasisCapabilities<D> for BSpline<D>
{
    fn get_spline_space(&self) -> &Rc<SplineSpace<D>>
    {
        &self.space
    }

    fn evaluate_local_into(&self, element: usize, tables: &BernsteinTables<D>, max_order: usize, out: &mut LocalBasisValues<D>) -> Result<(), IgaError>
    {
        BSpline::evaluate_local_into(self, element, tables, max_order, out)
    }
}

#[cfg(test)]
mod tests
{
    use super::*;
    use crate::basis::spline_space::{EndBehaviour, InteriorReg};
    use crate::grids::grid::Grid;
    use approx::assert_abs_diff_eq;

    fn sample_points<const D: usize>(n: usize) -> Vec<[f64; D]>
    {
        TensorIndexIterator::new([n; D]).map(|t| std::array::from_fn(|d| (t[d] as f64 + 0.25) / n as f64)).collect()
    }

    #[test]
    fn partition_of_unity()
    {
        let grid = Grid::<2>::create_from_knots([vec![0.0, 0.5, 0.7, 2.0], vec![-1.0, 0.0, 1.0]]).unwrap();
        let space = SplineSpace::create_with_regularity(grid.clone(), [3, 2], InteriorReg::Maximum, [EndBehaviour::Interpolatory; 2], 1, 1).unwrap();
        let basis = BSpline::create(space);
        let points = sample_points::<2>(3);
        for e in 0..grid.get_num_elements()
        {
            let local = basis.evaluate_basis_at_points(e, &points, 2).unwrap();
            assert_eq!(local.n_functions(), 12);
            for q in 0..points.len()
            {
                let sum: f64 = (0..12).map(|f| local.values.entry(f, q)[0]).sum();
                assert_abs_diff_eq!(sum, 1.0, epsilon = 1e-12);
                for a in 0..2
                {
                    let g: f64 = (0..12).map(|f| local.gradients.entry(f, q)[a]).sum();
                    assert_abs_diff_eq!(g, 0.0, epsilon = 1e-10);
                }
                let h: f64 = (0..12).map(|f| local.hessians.entry(f, q)[1]).sum();
                assert_abs_diff_eq!(h, 0.0, epsilon = 1e-9);
            }
        }
    }

    #[test]
    fn linear_hat_derivatives_are_scaled_by_element_length()
    {
        let grid = Grid::<1>::create_from_knots([vec![0.0, 2.0, 6.0]]).unwrap();
        let basis = BSpline::create(SplineSpace::create_scalar(grid, 1).unwrap());
        let local = basis.evaluate_basis_at_points(1, &[[0.25]], 1).unwrap();
        // on [2, 6] the functions are (6-x)/4 and (x-2)/4
        assert_abs_diff_eq!(local.values.entry(0, 0)[0], 0.75, epsilon = 1e-14);
        assert_abs_diff_eq!(local.gradients.entry(0, 0)[0], -0.25, epsilon = 1e-14);
        assert_abs_diff_eq!(local.gradients.entry(1, 0)[0], 0.25, epsilon = 1e-14);
    }

    #[test]
    fn extraction_follows_refinement()
    {
        let grid = Grid::<1>::create_uniform(3).unwrap();
        let basis = BSpline::create(SplineSpace::create_scalar(grid.clone(), 2).unwrap());
        grid.refine(2).unwrap();
        assert!(basis.extraction().get_operator(0, 0, 3).is_ok());
        let local = basis.evaluate_basis_at_points(3, &[[0.5]], 0).unwrap();
        let sum: f64 = (0..3).map(|f| local.values.entry(f, 0)[0]).sum();
        assert_abs_diff_eq!(sum, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn vector_space_functions_are_grouped_by_component()
    {
        let grid = Grid::<2>::create_uniform(2).unwrap();
        let space = SplineSpace::create_with_regularity(grid, [1, 1], InteriorReg::Maximum, [EndBehaviour::Interpolatory; 2], 2, 1).unwrap();
        let basis = BSpline::create(space);
        let local = basis.evaluate_basis_at_points(0, &[[0.0, 0.0]], 0).unwrap();
        assert_eq!(local.components, vec![0, 0, 0, 0, 1, 1, 1, 1]);
        assert_abs_diff_eq!(local.values.entry(4, 0)[0], 1.0, epsilon = 1e-14);
    }
}
