use std::cell::{Cell, Ref, RefCell};
use std::rc::{Rc, Weak};

use serde::{Deserialize, Serialize};
use serde_with::serde_as;

use crate::errors::IgaError;
use crate::grids::grid::{Grid, GridRefinement};
use crate::grids::refinement_signal::RefinementSignal;
use crate::utilities::next_object_id;
use crate::utilities::tensor_index::TensorIndex;

use super::coefficient_refinement::refine_dof_properties;
use super::dof_distribution::{DofDistribution, ElementDofs};

///
/// How the knot vector is closed at the ends of a direction.
///
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum EndBehaviour
{
    /// Open knot vector, boundary knots repeated `degree+1` times.
    #[default]
    Interpolatory,
    /// The last breakpoint is identified with the first one.
    Periodic,
}

///
/// Regularity used to derive interior multiplicities.
///
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum InteriorReg
{
    /// C^(p-1): every interior knot has multiplicity 1.
    #[default]
    Maximum,
    /// C^0: every interior knot has multiplicity `degree`.
    Minimum,
}

///
/// Serializable description of a spline space. The grid is stored separately.
///
#[serde_as]
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SplineSpaceData<const D: usize>
{
    pub range: usize,
    pub rank: usize,
    #[serde_as(as = "Vec<[_; D]>")]
    pub degrees: Vec<[usize; D]>,
    #[serde_as(as = "Vec<[_; D]>")]
    pub multiplicities: Vec<[Vec<usize>; D]>,
    #[serde_as(as = "[_; D]")]
    pub end_behaviour: [EndBehaviour; D],
}

///
/// One component of the space in one direction.
///
#[derive(Clone, Debug, PartialEq)]
pub struct DirectionSpace
{
    pub degree: usize,
    pub periodic: bool,
    pub breakpoints: Vec<f64>,
    pub multiplicities: Vec<usize>,
    /// Knot vector with repetitions. Periodic directions store the unrolled vector of
    /// length `n_functions + 2*degree + 1`.
    pub knots: Vec<f64>,
    /// Per element, the index in `knots` of the last knot equal to the element start.
    pub spans: Vec<usize>,
    /// Per element, the first active function.
    pub offsets: Vec<usize>,
    pub n_functions: usize,
}

impl DirectionSpace
{
    pub fn new(degree: usize, periodic: bool, breakpoints: &[f64], multiplicities: &[usize]) -> Result<Self, IgaError>
    {
        let p = degree;
        let n_el = breakpoints.len() - 1;
        debug_assert_eq!(multiplicities.len(), n_el - 1);
        let sum: usize = multiplicities.iter().sum();
        let mut spans = Vec::with_capacity(n_el);
        let mut offsets = Vec::with_capacity(n_el);
        let knots;
        let n_functions;
        if !periodic
        {
            n_functions = p + 1 + sum;
            let mut k = vec![breakpoints[0]; p + 1];
            for (i, &m) in multiplicities.iter().enumerate()
            {
                k.extend(std::iter::repeat(breakpoints[i + 1]).take(m));
            }
            k.extend(std::iter::repeat(breakpoints[n_el]).take(p + 1));
            knots = k;
            let mut acc = 0;
            for e in 0..n_el
            {
                if e > 0
                {
                    acc += multiplicities[e - 1];
                }
                spans.push(p + acc);
                offsets.push(acc);
            }
        }
        else
        {
            n_functions = 1 + sum;
            if n_functions < p + 1
            {
                return Err(IgaError::InvalidArgument("periodic direction needs at least degree+1 functions"));
            }
            let mut period = vec![breakpoints[0]];
            for (i, &m) in multiplicities.iter().enumerate()
            {
                period.extend(std::iter::repeat(breakpoints[i + 1]).take(m));
            }
            let length = breakpoints[n_el] - breakpoints[0];
            let n = n_functions as i64;
            let extended = |i: i64| period[i.rem_euclid(n) as usize] + i.div_euclid(n) as f64 * length;
            knots = (0..=(n_functions + 2 * p) as i64).map(|k| extended(k - p as i64)).collect();
            let mut acc = 0;
            for e in 0..n_el
            {
                if e > 0
                {
                    acc += multiplicities[e - 1];
                }
                spans.push(acc + p);
                offsets.push((acc as i64 - p as i64).rem_euclid(n) as usize);
            }
        }
        Ok(Self
        {
            degree,
            periodic,
            breakpoints: breakpoints.to_vec(),
            multiplicities: multiplicities.to_vec(),
            knots,
            spans,
            offsets,
            n_functions,
        })
    }

    #[inline]
    pub fn n_elements(&self) -> usize
    {
        self.breakpoints.len() - 1
    }

    /// Function index of local function `local` on element `element`.
    #[inline]
    pub fn local_to_global(&self, element: usize, local: usize) -> usize
    {
        let i = self.offsets[element] + local;
        if self.periodic { i % self.n_functions } else { i }
    }

    /// The `2*degree+2` knots around element `element` defining its active functions.
    #[inline]
    pub fn element_knot_window(&self, element: usize) -> &[f64]
    {
        let j = self.spans[element];
        &self.knots[j - self.degree..=j + self.degree + 1]
    }
}

#[derive(Debug)]
struct SplineSpaceState<const D: usize>
{
    data: SplineSpaceData<D>,
    directions: Vec<[DirectionSpace; D]>,
    dofs: DofDistribution<D>,
    previous: Option<Rc<SplineSpace<D>>>,
}

///
/// Payload of the spline space refinement signal: the space before the refinement.
///
#[derive(Clone, Debug)]
pub struct SplineSpaceRefinement<const D: usize>
{
    pub previous: Rc<SplineSpace<D>>,
}

///
/// Piecewise polynomial space on a grid: per component a degree and an interior
/// multiplicity per direction. Number of components is `range^rank`.
///
/// A space created with `create` follows the refinements of its grid: new breakpoints get
/// multiplicity 1, old ones keep theirs, so the refined space contains the old one. Dof
/// properties and the global offset are carried over to the refined numbering. If the space
/// cannot follow a refinement, element queries fail with `RefinementFailed` from then on.
///
#[derive(Debug)]
pub struct SplineSpace<const D: usize>
{
    object_id: usize,
    grid: Rc<Grid<D>>,
    state: RefCell<SplineSpaceState<D>>,
    refinement_failed: Cell<bool>,
    refinement_signal: RefinementSignal<SplineSpaceRefinement<D>>,
}

impl<const D: usize> SplineSpace<D>
{
    ///
    /// Interior multiplicities for a regularity kind. Directions with a single element have
    /// no interior knots.
    ///
    pub fn get_multiplicity_from_regularity(kind: InteriorReg, degrees: &[usize; D], n_elements: &[usize; D]) -> [Vec<usize>; D]
    {
        std::array::from_fn(|d| {
            let m = match kind
            {
                InteriorReg::Maximum => 1,
                InteriorReg::Minimum => degrees[d].max(1),
            };
            vec![m; n_elements[d].saturating_sub(1)]
        })
    }

    fn validate(grid: &Grid<D>, data: &SplineSpaceData<D>) -> Result<(), IgaError>
    {
        let n_comp = data.range.pow(data.rank as u32);
        if n_comp == 0
        {
            return Err(IgaError::InvalidArgument("space needs at least one component"));
        }
        if data.degrees.len() != n_comp
        {
            return Err(IgaError::DimensionMismatch { expected: n_comp, found: data.degrees.len() });
        }
        if data.multiplicities.len() != n_comp
        {
            return Err(IgaError::DimensionMismatch { expected: n_comp, found: data.multiplicities.len() });
        }
        let n_el = grid.get_num_elements_dim();
        for c in 0..n_comp
        {
            for d in 0..D
            {
                let mult = &data.multiplicities[c][d];
                if mult.len() != n_el[d] - 1
                {
                    return Err(IgaError::DimensionMismatch { expected: n_el[d] - 1, found: mult.len() });
                }
                let degree = data.degrees[c][d];
                if let Some(&m) = mult.iter().find(|&&m| m > degree.max(1))
                {
                    return Err(IgaError::InvalidMultiplicity { component: c, direction: d, multiplicity: m, degree });
                }
            }
        }
        Ok(())
    }

    fn build_directions(grid: &Grid<D>, data: &SplineSpaceData<D>) -> Result<Vec<[DirectionSpace; D]>, IgaError>
    {
        let knots = grid.knots();
        let mut directions = Vec::with_capacity(data.degrees.len());
        for c in 0..data.degrees.len()
        {
            let mut dirs = Vec::with_capacity(D);
            for d in 0..D
            {
                let periodic = data.end_behaviour[d] == EndBehaviour::Periodic;
                dirs.push(DirectionSpace::new(data.degrees[c][d], periodic, &knots[d], &data.multiplicities[c][d])?);
            }
            directions.push(dirs.try_into().map_err(|_| IgaError::DimensionMismatch { expected: D, found: 0 })?);
        }
        Ok(directions)
    }

    fn build_state(grid: &Grid<D>, data: SplineSpaceData<D>) -> Result<SplineSpaceState<D>, IgaError>
    {
        Self::validate(grid, &data)?;
        let directions = Self::build_directions(grid, &data)?;
        let sizes: Vec<[usize; D]> = directions.iter().map(|dirs| std::array::from_fn(|d| dirs[d].n_functions)).collect();
        let periodic = std::array::from_fn(|d| data.end_behaviour[d] == EndBehaviour::Periodic);
        let dofs = DofDistribution::new(&sizes, periodic);
        Ok(SplineSpaceState { data, directions, dofs, previous: None })
    }

    fn from_data_detached(grid: Rc<Grid<D>>, data: SplineSpaceData<D>) -> Result<Rc<Self>, IgaError>
    {
        let state = Self::build_state(&grid, data)?;
        let space = Self { object_id: next_object_id(), grid, state: RefCell::new(state), refinement_failed: Cell::new(false), refinement_signal: RefinementSignal::default() };
        log::debug!("created spline space {} with {} basis functions", space.object_id, space.get_num_basis());
        Ok(Rc::new(space))
    }

    ///
    /// Space from explicit degrees and interior multiplicities (one entry per component).
    /// The space registers itself with the grid and is rebuilt when the grid is refined.
    ///
    pub fn create(grid: Rc<Grid<D>>, data: SplineSpaceData<D>) -> Result<Rc<Self>, IgaError>
    {
        let space = Self::from_data_detached(grid, data)?;
        let weak: Weak<Self> = Rc::downgrade(&space);
        space.grid.refinement_signal().connect(move |event| match weak.upgrade()
        {
            Some(space) =>
            {
                space.follow_grid_refinement(event);
                true
            }
            None => false,
        });
        Ok(space)
    }

    /// Same degree and regularity for all `range^rank` components.
    pub fn create_with_regularity(grid: Rc<Grid<D>>, degrees: [usize; D], regularity: InteriorReg, end_behaviour: [EndBehaviour; D], range: usize, rank: usize) -> Result<Rc<Self>, IgaError>
    {
        let n_comp = range.pow(rank as u32);
        let multiplicities = Self::get_multiplicity_from_regularity(regularity, &degrees, &grid.get_num_elements_dim());
        let data = SplineSpaceData
        {
            range,
            rank,
            degrees: vec![degrees; n_comp],
            multiplicities: vec![multiplicities; n_comp],
            end_behaviour,
        };
        Self::create(grid, data)
    }

    /// Scalar space with maximum regularity and interpolatory ends.
    pub fn create_scalar(grid: Rc<Grid<D>>, degree: usize) -> Result<Rc<Self>, IgaError>
    {
        Self::create_with_regularity(grid, [degree; D], InteriorReg::Maximum, [EndBehaviour::Interpolatory; D], 1, 1)
    }

    fn follow_grid_refinement(&self, event: &GridRefinement<D>)
    {
        if let Err(e) = self.refine(event)
        {
            log::error!("spline space {} could not follow the grid refinement: {}", self.object_id, e);
            self.refinement_failed.set(true);
        }
    }

    /// Fails once the space has missed a refinement of its grid.
    pub fn check_refinement(&self) -> Result<(), IgaError>
    {
        if self.refinement_failed.get()
        {
            return Err(IgaError::RefinementFailed { object_id: self.object_id });
        }
        Ok(())
    }

    fn refine(&self, event: &GridRefinement<D>) -> Result<(), IgaError>
    {
        let old_grid = self.grid.get_grid_previous_refinement().ok_or(IgaError::InvalidArgument("grid has no previous refinement"))?;
        let new_knots = self.grid.get_num_knots_dim();
        let n = event.subdivisions;
        let (old_data, new_data, old_dofs) = {
            let state = self.state.borrow();
            let mut data = state.data.clone();
            for mults in data.multiplicities.iter_mut()
            {
                for d in 0..D
                {
                    if !event.directions[d]
                    {
                        continue;
                    }
                    // interior knot i of the refined grid is old interior knot i/n when n divides i
                    let old = &mults[d];
                    mults[d] = (1..new_knots[d] - 1)
                        .map(|i| if i % n == 0 { old.get(i / n - 1).copied().ok_or(IgaError::DimensionMismatch { expected: i / n, found: old.len() }) } else { Ok(1) })
                        .collect::<Result<Vec<usize>, IgaError>>()?;
                }
            }
            (state.data.clone(), data, state.dofs.clone())
        };
        let previous = Self::from_data_detached(old_grid, old_data)?;
        previous.state.borrow_mut().dofs = old_dofs;
        let mut new_state = Self::build_state(&self.grid, new_data)?;
        refine_dof_properties(&previous.directions(), &new_state.directions, &previous.dof_distribution(), &mut new_state.dofs)?;
        new_state.previous = Some(previous.clone());
        *self.state.borrow_mut() = new_state;
        log::info!("refined spline space {} to {} basis functions", self.object_id, self.get_num_basis());
        self.refinement_signal.emit(&SplineSpaceRefinement { previous });
        Ok(())
    }

    #[inline]
    pub fn get_object_id(&self) -> usize
    {
        self.object_id
    }

    #[inline]
    pub fn get_grid(&self) -> &Rc<Grid<D>>
    {
        &self.grid
    }

    pub fn refinement_signal(&self) -> &RefinementSignal<SplineSpaceRefinement<D>>
    {
        &self.refinement_signal
    }

    pub fn get_data(&self) -> SplineSpaceData<D>
    {
        self.state.borrow().data.clone()
    }

    pub fn get_spline_space_previous_refinement(&self) -> Option<Rc<SplineSpace<D>>>
    {
        self.state.borrow().previous.clone()
    }

    pub fn get_num_components(&self) -> usize
    {
        self.state.borrow().directions.len()
    }

    pub fn get_range(&self) -> usize
    {
        self.state.borrow().data.range
    }

    pub fn get_rank(&self) -> usize
    {
        self.state.borrow().data.rank
    }

    pub fn get_degree(&self, comp: usize) -> Result<[usize; D], IgaError>
    {
        let state = self.state.borrow();
        state.data.degrees.get(comp).copied().ok_or(IgaError::IndexOutOfRange { index: comp, extent: state.data.degrees.len() })
    }

    pub fn get_interior_mult(&self, comp: usize) -> Result<[Vec<usize>; D], IgaError>
    {
        let state = self.state.borrow();
        state.data.multiplicities.get(comp).cloned().ok_or(IgaError::IndexOutOfRange { index: comp, extent: state.data.multiplicities.len() })
    }

    pub fn get_end_behaviour(&self) -> [EndBehaviour; D]
    {
        self.state.borrow().data.end_behaviour
    }

    pub fn get_periodicity(&self) -> [bool; D]
    {
        let e = self.get_end_behaviour();
        std::array::from_fn(|d| e[d] == EndBehaviour::Periodic)
    }

    pub fn get_num_basis(&self) -> usize
    {
        self.state.borrow().dofs.get_num_dofs()
    }

    pub fn get_num_basis_comp_dim(&self, comp: usize) -> Result<[usize; D], IgaError>
    {
        self.state.borrow().dofs.get_num_dofs_comp_dim(comp)
    }

    /// Number of basis functions supported on one element, over all components.
    pub fn get_element_num_basis(&self) -> usize
    {
        self.state.borrow().data.degrees.iter().map(|p| p.iter().map(|q| q + 1).product::<usize>()).sum()
    }

    pub fn directions(&self) -> Ref<'_, Vec<[DirectionSpace; D]>>
    {
        Ref::map(self.state.borrow(), |s| &s.directions)
    }

    pub fn dof_distribution(&self) -> Ref<'_, DofDistribution<D>>
    {
        Ref::map(self.state.borrow(), |s| &s.dofs)
    }

    /// Mutable access for dof properties and the global offset.
    pub fn with_dof_distribution_mut<R>(&self, f: impl FnOnce(&mut DofDistribution<D>) -> R) -> R
    {
        f(&mut self.state.borrow_mut().dofs)
    }

    ///
    /// Knot vectors with repetitions for the given end behaviour, per component and
    /// direction.
    ///
    pub fn compute_knots_with_repetition(&self, end_behaviour: &[EndBehaviour; D]) -> Result<Vec<[Vec<f64>; D]>, IgaError>
    {
        let mut data = self.get_data();
        data.end_behaviour = *end_behaviour;
        let directions = Self::build_directions(&self.grid, &data)?;
        Ok(directions.into_iter().map(|dirs| dirs.map(|d| d.knots)).collect())
    }

    /// First active basis function per element, per component and direction.
    pub fn compute_index_space_offset(&self) -> Vec<[Vec<usize>; D]>
    {
        self.directions().iter().map(|dirs| std::array::from_fn(|d| dirs[d].offsets.clone())).collect()
    }

    ///
    /// Patch dofs of the functions active on an element, components one after the other,
    /// local tensor index with direction 0 fastest.
    ///
    pub fn get_element_dofs(&self, element: usize) -> Result<Vec<usize>, IgaError>
    {
        let mut dofs = Vec::with_capacity(self.get_element_num_basis());
        self.get_element_dofs_into(element, &mut dofs)?;
        Ok(dofs)
    }

    /// `get_element_dofs` into a reused buffer.
    pub fn get_element_dofs_into(&self, element: usize, dofs: &mut Vec<usize>) -> Result<(), IgaError>
    {
        self.check_refinement()?;
        let element_tensor = self.grid.flat_to_tensor(element)?;
        let state = self.state.borrow();
        dofs.clear();
        for (c, dirs) in state.directions.iter().enumerate()
        {
            Self::push_component_dofs(&state.dofs, c, dirs, &element_tensor, dofs);
        }
        Ok(())
    }

    fn push_component_dofs(dofs: &DofDistribution<D>, comp: usize, dirs: &[DirectionSpace; D], element: &TensorIndex<D>, out: &mut Vec<usize>)
    {
        let local_sizes: [usize; D] = std::array::from_fn(|d| dirs[d].degree + 1);
        for local in crate::utilities::tensor_index::TensorIndexIterator::new(local_sizes)
        {
            let global: [usize; D] = std::array::from_fn(|d| dirs[d].local_to_global(element[d], local[d]));
            out.push(dofs.get_dof_unchecked(comp, &global));
        }
    }

    /// The element's dofs that carry `property`, in local, patch and global numbering.
    pub fn get_element_dofs_view(&self, element: usize, property: &str) -> Result<ElementDofs, IgaError>
    {
        let dofs = self.get_element_dofs(element)?;
        self.dof_distribution().filter_element_dofs(&dofs, property)
    }
}

#[test]
fn check_degree_one_knots_with_repetition()
{
    let grid = Grid::<1>::create_from_knots([vec![0.0, 1.0, 2.0, 3.0, 4.0]]).unwrap();
    let space = SplineSpace::create_scalar(grid, 1).unwrap();
    let knots = space.compute_knots_with_repetition(&[EndBehaviour::Interpolatory]).unwrap();
    assert_eq!(knots[0][0], vec![0.0, 0.0, 1.0, 2.0, 3.0, 4.0, 4.0]);
    assert_eq!(space.get_num_basis(), 5);
    assert_eq!(space.compute_index_space_offset()[0][0], vec![0, 1, 2, 3]);
}

#[test]
fn check_multiplicity_bound()
{
    let grid = Grid::<1>::create_uniform(4).unwrap();
    let data = SplineSpaceData { range: 1, rank: 1, degrees: vec![[2]], multiplicities: vec![[vec![1, 3]]], end_behaviour: [EndBehaviour::Interpolatory] };
    assert_eq!(SplineSpace::create(grid.clone(), data).unwrap_err(), IgaError::InvalidMultiplicity { component: 0, direction: 0, multiplicity: 3, degree: 2 });
    let data = SplineSpaceData { range: 1, rank: 1, degrees: vec![[2]], multiplicities: vec![[vec![2, 1]]], end_behaviour: [EndBehaviour::Interpolatory] };
    let space = SplineSpace::create(grid, data).unwrap();
    assert_eq!(space.get_num_basis(), 6);
    assert_eq!(space.compute_index_space_offset()[0][0], vec![0, 2, 3]);
}

#[test]
fn check_regularity_multiplicities()
{
    let max = SplineSpace::<2>::get_multiplicity_from_regularity(InteriorReg::Maximum, &[3, 2], &[4, 1]);
    assert_eq!(max, [vec![1, 1, 1], vec![]]);
    let min = SplineSpace::<2>::get_multiplicity_from_regularity(InteriorReg::Minimum, &[3, 0], &[2, 3]);
    assert_eq!(min, [vec![3], vec![1, 1]]);
}

#[test]
fn check_periodic_direction()
{
    let grid = Grid::<1>::create_uniform(5).unwrap();
    let space = SplineSpace::create_with_regularity(grid, [2], InteriorReg::Maximum, [EndBehaviour::Periodic], 1, 1).unwrap();
    // four elements of a closed curve, one function per breakpoint
    assert_eq!(space.get_num_basis(), 4);
    let dirs = space.directions();
    let dir = &dirs[0][0];
    assert_eq!(dir.knots.len(), 4 + 2 * 2 + 1);
    approx::assert_abs_diff_eq!(dir.knots[0], -0.5, epsilon = 1e-15);
    approx::assert_abs_diff_eq!(dir.knots[8], 1.5, epsilon = 1e-15);
    assert_eq!(dir.offsets, vec![2, 3, 0, 1]);
    assert_eq!(dir.local_to_global(3, 2), 3);
    assert_eq!(dir.local_to_global(0, 2), 0);
    drop(dirs);
    // no boundary in a periodic direction
    assert_eq!(space.dof_distribution().get_interior_dofs().len(), 4);
}

#[test]
fn check_vector_space_element_dofs()
{
    let grid = Grid::<2>::create_uniform(3).unwrap();
    let space = SplineSpace::create_with_regularity(grid, [1, 1], InteriorReg::Maximum, [EndBehaviour::Interpolatory; 2], 2, 1).unwrap();
    assert_eq!(space.get_num_components(), 2);
    assert_eq!(space.get_num_basis(), 18);
    assert_eq!(space.get_element_num_basis(), 8);
    assert_eq!(space.get_element_dofs(3).unwrap(), vec![4, 5, 7, 8, 13, 14, 16, 17]);
    let view = space.get_element_dofs_view(0, crate::grids::grid::ACTIVE).unwrap();
    assert_eq!(view.local, (0..8).collect::<Vec<_>>());
}

#[test]
fn check_space_follows_grid_refinement()
{
    let grid = Grid::<1>::create_from_knots([vec![0.0, 1.0, 2.0]]).unwrap();
    let data = SplineSpaceData { range: 1, rank: 1, degrees: vec![[2]], multiplicities: vec![[vec![2]]], end_behaviour: [EndBehaviour::Interpolatory] };
    let space = SplineSpace::create(grid.clone(), data).unwrap();
    assert_eq!(space.get_num_basis(), 5);
    grid.refine(2).unwrap();
    assert_eq!(space.get_interior_mult(0).unwrap(), [vec![1, 2, 1]]);
    assert_eq!(space.get_num_basis(), 7);
    let previous = space.get_spline_space_previous_refinement().unwrap();
    assert_eq!(previous.get_num_basis(), 5);
    assert_eq!(previous.get_grid().get_knot_coordinates(0), vec![0.0, 1.0, 2.0]);
}

#[test]
fn check_dof_properties_survive_refinement()
{
    let grid = Grid::<1>::create_uniform(3).unwrap();
    let space = SplineSpace::create_scalar(grid.clone(), 2).unwrap();
    space.with_dof_distribution_mut(|dofs| {
        dofs.set_global_dof_offset(10);
        dofs.add_dofs_property("dirichlet");
        dofs.set_dof_property("dirichlet", 0, true).unwrap();
        dofs.set_dof_property("dirichlet", 3, true).unwrap();
    });
    grid.refine(2).unwrap();
    assert_eq!(space.get_num_basis(), 6);
    let dofs = space.dof_distribution();
    assert_eq!(dofs.get_global_dof_offset(), 10);
    // end functions of an open knot vector refine to the end functions only
    assert_eq!(dofs.get_dofs_with_property("dirichlet").unwrap(), vec![0, 5]);
    assert_eq!(dofs.get_dofs_with_property(crate::grids::grid::ACTIVE).unwrap().len(), 6);
    drop(dofs);
    let previous = space.get_spline_space_previous_refinement().unwrap();
    assert!(previous.dof_distribution().dof_has_property(3, "dirichlet"));
    assert_eq!(space.get_element_dofs_view(3, "dirichlet").unwrap().global, vec![15]);
}

#[test]
fn check_missed_refinement_is_reported()
{
    let grid = Grid::<1>::create_uniform(3).unwrap();
    let space = SplineSpace::create_scalar(grid.clone(), 1).unwrap();
    assert!(space.check_refinement().is_ok());
    // the grid was never refined, so there is no coarse grid to refine from
    space.follow_grid_refinement(&GridRefinement { directions: [true], subdivisions: 2, old_knots: [vec![0.0, 0.5, 1.0]] });
    let expected = IgaError::RefinementFailed { object_id: space.get_object_id() };
    assert_eq!(space.get_element_dofs(0).unwrap_err(), expected);
    assert_eq!(space.get_element_dofs_view(0, crate::grids::grid::ACTIVE).unwrap_err(), expected);
}
