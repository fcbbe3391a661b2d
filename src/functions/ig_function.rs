use std::cell::{Cell, Ref, RefCell};
use std::rc::{Rc, Weak};

use serde::{Deserialize, Serialize};
use serde_with::serde_as;

use crate::basis::bspline::BSpline;
use crate::basis::coefficient_refinement::refine_coefficients;
use crate::basis::nurbs::{Nurbs, NurbsRefinement};
use crate::basis::reference_basis::{BasisCapabilities, BernsteinTables, LocalBasisValues, ReferenceBasis};
use crate::basis::spline_space::{SplineSpace, SplineSpaceData, SplineSpaceRefinement};
use crate::errors::IgaError;
use crate::grids::grid::{Grid, GridData};
use crate::utilities::next_object_id;

use super::{GridFunction, GridFunctionValues};

///
/// Serializable description of an isogeometric function: grid, space, optional NURBS
/// weights and the control points.
///
#[serde_as]
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IgFunctionData<const D: usize, const S: usize>
{
    pub grid: GridData<D>,
    pub space: SplineSpaceData<D>,
    pub weights: Option<Vec<f64>>,
    #[serde_as(as = "Vec<[_; S]>")]
    pub control_points: Vec<[f64; S]>,
}

#[derive(Debug)]
struct PointTables<const D: usize>
{
    points: Vec<[f64; D]>,
    tables: BernsteinTables<D>,
}

#[derive(Debug, Default)]
struct EvaluationBuffers<const D: usize>
{
    local: LocalBasisValues<D>,
    dofs: Vec<usize>,
}

///
/// `F(x) = sum_i P_i N_i(x)` for a scalar B-spline or NURBS basis `N_i` and control points
/// `P_i`. When the grid is refined the control points are refined by knot insertion (in
/// homogeneous coordinates for NURBS), leaving the map unchanged. If that fails the function
/// stays unusable and every evaluation returns `RefinementFailed`.
///
#[derive(Debug)]
pub struct IgGridFunction<const D: usize, const S: usize>
{
    object_id: usize,
    basis: ReferenceBasis<D>,
    control_points: RefCell<Vec<[f64; S]>>,
    point_tables: RefCell<Option<PointTables<D>>>,
    buffers: RefCell<EvaluationBuffers<D>>,
    refinement_failed: Cell<bool>,
}

fn flatten<const S: usize>(points: &[[f64; S]]) -> Vec<f64>
{
    points.iter().flatten().copied().collect()
}

impl<const D: usize, const S: usize> IgGridFunction<D, S>
{
    pub fn create(basis: ReferenceBasis<D>, control_points: Vec<[f64; S]>) -> Result<Rc<Self>, IgaError>
    {
        let space = basis.get_spline_space();
        if space.get_num_components() != 1
        {
            return Err(IgaError::InvalidArgument("control points need a scalar spline space"));
        }
        if control_points.len() != space.get_num_basis()
        {
            return Err(IgaError::DimensionMismatch { expected: space.get_num_basis(), found: control_points.len() });
        }
        let function = Rc::new(Self
        {
            object_id: next_object_id(),
            basis,
            control_points: RefCell::new(control_points),
            point_tables: RefCell::new(None),
            buffers: RefCell::new(EvaluationBuffers::default()),
            refinement_failed: Cell::new(false),
        });
        let weak: Weak<Self> = Rc::downgrade(&function);
        match &function.basis
        {
            ReferenceBasis::BSpline(bspline) => bspline.refinement_signal().connect(move |event: &SplineSpaceRefinement<D>| match weak.upgrade()
            {
                Some(f) =>
                {
                    let result = f.refine_bspline(event);
                    f.record_refinement(result);
                    true
                }
                None => false,
            }),
            ReferenceBasis::Nurbs(nurbs) => nurbs.refinement_signal().connect(move |event: &NurbsRefinement<D>| match weak.upgrade()
            {
                Some(f) =>
                {
                    let result = f.refine_nurbs(event);
                    f.record_refinement(result);
                    true
                }
                None => false,
            }),
        }
        log::debug!("created isogeometric grid function {}", function.object_id);
        Ok(function)
    }

    /// Rebuilds grid, space, basis and function from a snapshot.
    pub fn create_from_data(data: IgFunctionData<D, S>) -> Result<Rc<Self>, IgaError>
    {
        let grid = Grid::create_from_data(&data.grid)?;
        let bspline = BSpline::create(SplineSpace::create(grid, data.space)?);
        let basis = match data.weights
        {
            Some(weights) => ReferenceBasis::from(Nurbs::create(bspline, weights)?),
            None => ReferenceBasis::from(bspline),
        };
        Self::create(basis, data.control_points)
    }

    pub fn get_data(&self) -> IgFunctionData<D, S>
    {
        let space = self.basis.get_spline_space();
        IgFunctionData
        {
            grid: space.get_grid().get_data(),
            space: space.get_data(),
            weights: match &self.basis
            {
                ReferenceBasis::Nurbs(n) => Some(n.get_weights().clone()),
                ReferenceBasis::BSpline(_) => None,
            },
            control_points: self.control_points.borrow().clone(),
        }
    }

    fn record_refinement(&self, result: Result<(), IgaError>)
    {
        if let Err(e) = result
        {
            log::error!("grid function {} could not refine its control points: {}", self.object_id, e);
            self.refinement_failed.set(true);
        }
    }

    fn refine_bspline(&self, event: &SplineSpaceRefinement<D>) -> Result<(), IgaError>
    {
        let space = self.basis.get_spline_space();
        let flat = flatten(&self.control_points.borrow());
        let refined = refine_coefficients(&event.previous.directions(), &space.directions(), &event.previous.dof_distribution(), &space.dof_distribution(), &flat, S)?;
        *self.control_points.borrow_mut() = refined.chunks_exact(S).map(|c| std::array::from_fn(|i| c[i])).collect();
        log::info!("refined control points of grid function {}", self.object_id);
        Ok(())
    }

    fn refine_nurbs(&self, event: &NurbsRefinement<D>) -> Result<(), IgaError>
    {
        let space = self.basis.get_spline_space();
        // homogeneous coordinates (w P, w)
        let homogeneous: Vec<f64> = self.control_points.borrow().iter().zip(event.previous_weights.iter())
            .flat_map(|(p, &w)| p.iter().map(move |x| x * w).chain(std::iter::once(w)))
            .collect();
        let refined = refine_coefficients(&event.previous.directions(), &space.directions(), &event.previous.dof_distribution(), &space.dof_distribution(), &homogeneous, S + 1)?;
        *self.control_points.borrow_mut() = refined.chunks_exact(S + 1).map(|c| std::array::from_fn(|i| c[i] / c[S])).collect();
        log::info!("refined control points of grid function {}", self.object_id);
        Ok(())
    }

    #[inline]
    pub fn get_object_id(&self) -> usize
    {
        self.object_id
    }

    #[inline]
    pub fn get_basis(&self) -> &ReferenceBasis<D>
    {
        &self.basis
    }

    pub fn get_control_points(&self) -> Ref<'_, Vec<[f64; S]>>
    {
        self.control_points.borrow()
    }

    pub fn set_control_points(&self, control_points: Vec<[f64; S]>) -> Result<(), IgaError>
    {
        let n = self.basis.get_num_basis();
        if control_points.len() != n
        {
            return Err(IgaError::DimensionMismatch { expected: n, found: control_points.len() });
        }
        *self.control_points.borrow_mut() = control_points;
        Ok(())
    }
}

impl<const D: usize, const S: usize> GridFunction<D, S> for IgGridFunction<D, S>
{
    fn get_grid(&self) -> &Rc<Grid<D>>
    {
        self.basis.get_spline_space().get_grid()
    }

    fn evaluate_into(&self, element: usize, points: &[[f64; D]], max_order: usize, out: &mut GridFunctionValues<D, S>) -> Result<(), IgaError>
    {
        if self.refinement_failed.get()
        {
            return Err(IgaError::RefinementFailed { object_id: self.object_id });
        }
        if max_order > 2
        {
            return Err(IgaError::NotImplemented("grid function derivatives above second order"));
        }
        let space = self.basis.get_spline_space();
        {
            let mut cached = self.point_tables.borrow_mut();
            let stale = cached.as_ref().map_or(true, |t| t.points != points || t.tables.max_order() < max_order);
            if stale
            {
                let degrees = [space.get_degree(0)?];
                *cached = Some(PointTables { points: points.to_vec(), tables: BernsteinTables::new(&degrees, points, 2) });
            }
        }
        let cached = self.point_tables.borrow();
        let tables = &cached.as_ref().ok_or(IgaError::CacheNotFilled)?.tables;
        let mut buffers = self.buffers.borrow_mut();
        let EvaluationBuffers { local, dofs } = &mut *buffers;
        self.basis.evaluate_local_into(element, tables, max_order, local)?;
        space.get_element_dofs_into(element, dofs)?;
        let cps = self.control_points.borrow();
        out.clear();
        for q in 0..points.len()
        {
            let mut value = [0.0; S];
            let mut jac = [[0.0; D]; S];
            let mut hess = [[[0.0; D]; D]; S];
            for (f, &dof) in dofs.iter().enumerate()
            {
                let p = &cps[dof];
                let n = local.values.entry(f, q)[0];
                for i in 0..S
                {
                    value[i] += p[i] * n;
                }
                if max_order >= 1
                {
                    let g = local.gradients.entry(f, q);
                    for i in 0..S
                    {
                        for a in 0..D
                        {
                            jac[i][a] += p[i] * g[a];
                        }
                    }
                }
                if max_order >= 2
                {
                    let h = local.hessians.entry(f, q);
                    for i in 0..S
                    {
                        for a in 0..D
                        {
                            for b in 0..D
                            {
                                hess[i][a][b] += p[i] * h[a * D + b];
                            }
                        }
                    }
                }
            }
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
}

#[cfg(test)]
mod tests
{
    use super::*;
    use approx::assert_abs_diff_eq;

    /// Quarter circle of radius 1 as a quadratic NURBS curve.
    fn quarter_circle() -> (Rc<Grid<1>>, Rc<IgGridFunction<1, 2>>)
    {
        let grid = Grid::<1>::create_uniform(2).unwrap();
        let bspline = BSpline::create(SplineSpace::create_scalar(grid.clone(), 2).unwrap());
        let nurbs = Nurbs::create(bspline, vec![1.0, 1.0 / 2.0_f64.sqrt(), 1.0]).unwrap();
        let f = IgGridFunction::create(nurbs.into(), vec![[1.0, 0.0], [1.0, 1.0], [0.0, 1.0]]).unwrap();
        (grid, f)
    }

    #[test]
    fn nurbs_circle_is_exact()
    {
        let (_, f) = quarter_circle();
        let points: Vec<[f64; 1]> = (0..7).map(|i| [i as f64 / 6.0]).collect();
        let v = f.evaluate(0, &points, 1).unwrap();
        for (x, jac) in v.values.iter().zip(v.jacobians.iter())
        {
            assert_abs_diff_eq!(x[0] * x[0] + x[1] * x[1], 1.0, epsilon = 1e-14);
            // tangent orthogonal to the radius
            assert_abs_diff_eq!(x[0] * jac[0][0] + x[1] * jac[1][0], 0.0, epsilon = 1e-13);
        }
    }

    #[test]
    fn refinement_keeps_the_geometry()
    {
        let (grid, f) = quarter_circle();
        let before = f.evaluate(0, &[[0.5]], 0).unwrap().values[0];
        grid.refine(2).unwrap();
        assert_eq!(f.get_control_points().len(), 4);
        // x = 0.5 of the old element is the end of the first new element
        let after = f.evaluate(0, &[[1.0]], 0).unwrap().values[0];
        assert_abs_diff_eq!(before[0], after[0], epsilon = 1e-14);
        assert_abs_diff_eq!(before[1], after[1], epsilon = 1e-14);
        let v = f.evaluate(1, &[[0.3]], 0).unwrap().values[0];
        assert_abs_diff_eq!(v[0] * v[0] + v[1] * v[1], 1.0, epsilon = 1e-14);
    }

    #[test]
    fn bspline_function_reproduces_linear_map()
    {
        let grid = Grid::<2>::create_uniform(3).unwrap();
        let basis: ReferenceBasis<2> = BSpline::create(SplineSpace::create_scalar(grid.clone(), 1).unwrap()).into();
        // control points at the Greville points of a linear basis are the knots
        let cps: Vec<[f64; 2]> = (0..9).map(|i| [(i % 3) as f64 * 0.5 * 2.0, (i / 3) as f64 * 0.5]).collect();
        let f = IgGridFunction::create(basis, cps).unwrap();
        let v = f.evaluate(3, &[[0.5, 0.5]], 2).unwrap();
        assert_abs_diff_eq!(v.values[0][0], 1.5, epsilon = 1e-14);
        assert_abs_diff_eq!(v.values[0][1], 0.75, epsilon = 1e-14);
        assert_abs_diff_eq!(v.jacobians[0][0][0], 2.0, epsilon = 1e-14);
        assert_abs_diff_eq!(v.jacobians[0][1][1], 1.0, epsilon = 1e-14);
        assert_abs_diff_eq!(v.hessians[0][0][0][1], 0.0, epsilon = 1e-14);
        grid.refine(2).unwrap();
        let data = f.get_data();
        assert_eq!(data.control_points.len(), 25);
        let rebuilt = IgGridFunction::create_from_data(data).unwrap();
        let w = rebuilt.evaluate(0, &[[1.0, 1.0]], 0).unwrap();
        assert_abs_diff_eq!(w.values[0][0], 0.5, epsilon = 1e-14);
        assert_abs_diff_eq!(w.values[0][1], 0.25, epsilon = 1e-14);
    }

    #[test]
    fn missed_refinement_blocks_evaluation()
    {
        let grid = Grid::<1>::create_uniform(2).unwrap();
        let basis: ReferenceBasis<1> = BSpline::create(SplineSpace::create_scalar(grid, 1).unwrap()).into();
        let f = IgGridFunction::create(basis, vec![[0.0], [2.0]]).unwrap();
        // four coarse functions against two control points
        let unrelated = SplineSpace::create_scalar(Grid::<1>::create_uniform(4).unwrap(), 1).unwrap();
        let result = f.refine_bspline(&SplineSpaceRefinement { previous: unrelated });
        assert!(result.is_err());
        f.record_refinement(result);
        assert_eq!(f.get_control_points().len(), 2);
        let err = f.evaluate(0, &[[0.5]], 0).unwrap_err();
        assert_eq!(err, IgaError::RefinementFailed { object_id: f.get_object_id() });
    }

    #[test]
    fn evaluation_into_reuses_the_output()
    {
        let (_, f) = quarter_circle();
        let mut out = GridFunctionValues::default();
        f.evaluate_into(0, &[[0.0], [0.5], [1.0]], 2, &mut out).unwrap();
        let buffers = (out.values.as_ptr(), out.jacobians.as_ptr(), out.hessians.as_ptr());
        f.evaluate_into(0, &[[0.25], [0.5], [0.75]], 2, &mut out).unwrap();
        assert_eq!(buffers, (out.values.as_ptr(), out.jacobians.as_ptr(), out.hessians.as_ptr()));
        assert_eq!(out.values.len(), 3);
        for x in &out.values
        {
            assert_abs_diff_eq!(x[0] * x[0] + x[1] * x[1], 1.0, epsilon = 1e-14);
        }
    }
}
