use std::cell::{Ref, RefCell};
use std::rc::Rc;

use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};
use serde_with::serde_as;

use crate::errors::IgaError;
use crate::utilities::next_object_id;
use crate::utilities::tensor_index::{TensorIndex, TensorIndexer};

use super::bounding_box::BoundingBox;
use super::grid_element::GridElement;
use super::refinement_signal::RefinementSignal;
use super::unit_element::UnitElement;

/// Name of the element (and dof) property every object starts with.
pub const ACTIVE: &str = "active";

/// Minimum relative gap between two consecutive knots.
pub const KNOT_TOLERANCE: f64 = 1e-10;

///
/// Payload of the grid refinement signal.
///
#[derive(Clone, Debug, PartialEq)]
pub struct GridRefinement<const D: usize>
{
    pub directions: [bool; D],
    pub subdivisions: usize,
    pub old_knots: [Vec<f64>; D],
}

///
/// Serializable snapshot of a grid. Rebuild with `Grid::create_from_data`.
///
#[serde_as]
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GridData<const D: usize>
{
    #[serde_as(as = "[_; D]")]
    pub knots: [Vec<f64>; D],
    pub boundary_ids: Vec<i32>,
    pub element_properties: IndexMap<String, IndexSet<usize>>,
}

#[derive(Debug)]
struct GridState<const D: usize>
{
    knots: [Vec<f64>; D],
    elements: TensorIndexer<D>,
    boundary_ids: Vec<i32>,
    element_properties: IndexMap<String, IndexSet<usize>>,
    previous: Option<Rc<Grid<D>>>,
}

///
/// Tensor-product grid of `D`-dimensional box elements, given by strictly increasing
/// knot coordinates per direction.
///
/// The grid is shared through `Rc`. Refinement mutates it in place and notifies the
/// objects built on top of it (spline spaces, grid functions) through `refinement_signal`.
///
#[derive(Debug)]
pub struct Grid<const D: usize>
{
    object_id: usize,
    state: RefCell<GridState<D>>,
    refinement_signal: RefinementSignal<GridRefinement<D>>,
}

fn validate_knots(knots: &[f64]) -> Result<(), IgaError>
{
    if knots.len() < 2 || knots.iter().any(|k| !k.is_finite())
    {
        return Err(IgaError::InvalidKnotSequence);
    }
    let span = (knots[knots.len() - 1] - knots[0]).abs().max(1.0);
    if knots.windows(2).any(|w| w[1] - w[0] <= KNOT_TOLERANCE * span)
    {
        return Err(IgaError::InvalidKnotSequence);
    }
    Ok(())
}

fn subdivide(knots: &[f64], n: usize) -> Vec<f64>
{
    let mut refined = Vec::with_capacity((knots.len() - 1) * n + 1);
    for w in knots.windows(2)
    {
        let h = (w[1] - w[0]) / n as f64;
        for i in 0..n
        {
            refined.push(w[0] + i as f64 * h);
        }
    }
    if let Some(&last) = knots.last()
    {
        refined.push(last);
    }
    refined
}

/// Element index in one direction; ties on an interior knot go to the lower element.
fn locate(knots: &[f64], x: f64) -> Option<usize>
{
    let n = knots.len();
    if x < knots[0] || x > knots[n - 1]
    {
        return None;
    }
    Some(knots.partition_point(|&k| k < x).saturating_sub(1).min(n - 2))
}

impl<const D: usize> Grid<D>
{
    fn from_state(knots: [Vec<f64>; D], boundary_ids: Vec<i32>, element_properties: Option<IndexMap<String, IndexSet<usize>>>) -> Rc<Self>
    {
        let elements = TensorIndexer::new(std::array::from_fn(|d| knots[d].len() - 1));
        let element_properties = element_properties.unwrap_or_else(|| {
            let mut p = IndexMap::new();
            p.insert(ACTIVE.to_string(), (0..elements.flat_size()).collect());
            p
        });
        let grid = Self
        {
            object_id: next_object_id(),
            state: RefCell::new(GridState { knots, elements, boundary_ids, element_properties, previous: None }),
            refinement_signal: RefinementSignal::default(),
        };
        log::debug!("created grid {} with {:?} elements", grid.object_id, elements.extents());
        Rc::new(grid)
    }

    ///
    /// Grid from explicit knot coordinates. Each direction needs at least two strictly
    /// increasing, finite values.
    ///
    pub fn create_from_knots(knots: [Vec<f64>; D]) -> Result<Rc<Self>, IgaError>
    {
        for k in knots.iter()
        {
            validate_knots(k)?;
        }
        Ok(Self::from_state(knots, vec![0; 2 * D], None))
    }

    /// Uniform grid on `[0,1]^D` with `n_knots` knots per direction.
    pub fn create_uniform(n_knots: usize) -> Result<Rc<Self>, IgaError>
    {
        Self::create_from_bbox(&BoundingBox::default(), [n_knots; D])
    }

    pub fn create_from_bbox(bbox: &BoundingBox<D>, n_knots: [usize; D]) -> Result<Rc<Self>, IgaError>
    {
        let mut knots: [Vec<f64>; D] = std::array::from_fn(|_| Vec::new());
        for d in 0..D
        {
            if n_knots[d] < 2
            {
                return Err(IgaError::InvalidKnotSequence);
            }
            let h = bbox.width(d) / (n_knots[d] - 1) as f64;
            knots[d] = (0..n_knots[d]).map(|i| bbox.lower[d] + i as f64 * h).collect();
            knots[d][n_knots[d] - 1] = bbox.upper[d];
        }
        Self::create_from_knots(knots)
    }

    pub fn create_from_data(data: &GridData<D>) -> Result<Rc<Self>, IgaError>
    {
        for k in data.knots.iter()
        {
            validate_knots(k)?;
        }
        if data.boundary_ids.len() != 2 * D
        {
            return Err(IgaError::DimensionMismatch { expected: 2 * D, found: data.boundary_ids.len() });
        }
        Ok(Self::from_state(data.knots.clone(), data.boundary_ids.clone(), Some(data.element_properties.clone())))
    }

    pub fn get_data(&self) -> GridData<D>
    {
        let state = self.state.borrow();
        GridData
        {
            knots: state.knots.clone(),
            boundary_ids: state.boundary_ids.clone(),
            element_properties: state.element_properties.clone(),
        }
    }

    #[inline]
    pub fn get_object_id(&self) -> usize
    {
        self.object_id
    }

    pub fn refinement_signal(&self) -> &RefinementSignal<GridRefinement<D>>
    {
        &self.refinement_signal
    }

    pub fn knots(&self) -> Ref<'_, [Vec<f64>; D]>
    {
        Ref::map(self.state.borrow(), |s| &s.knots)
    }

    pub fn get_knot_coordinates(&self, dir: usize) -> Vec<f64>
    {
        self.state.borrow().knots[dir].clone()
    }

    pub fn get_num_knots_dim(&self) -> [usize; D]
    {
        let state = self.state.borrow();
        std::array::from_fn(|d| state.knots[d].len())
    }

    pub fn get_num_elements(&self) -> usize
    {
        self.state.borrow().elements.flat_size()
    }

    pub fn get_num_elements_dim(&self) -> [usize; D]
    {
        *self.state.borrow().elements.extents()
    }

    pub fn element_indexer(&self) -> TensorIndexer<D>
    {
        self.state.borrow().elements
    }

    pub fn flat_to_tensor(&self, flat: usize) -> Result<TensorIndex<D>, IgaError>
    {
        self.state.borrow().elements.flat_to_tensor(flat)
    }

    pub fn tensor_to_flat(&self, tensor: &TensorIndex<D>) -> Result<usize, IgaError>
    {
        self.state.borrow().elements.tensor_to_flat(tensor)
    }

    pub fn get_bounding_box(&self) -> BoundingBox<D>
    {
        let state = self.state.borrow();
        BoundingBox::new(
            std::array::from_fn(|d| state.knots[d][0]),
            std::array::from_fn(|d| state.knots[d][state.knots[d].len() - 1]),
        )
    }

    pub fn get_element_bounding_box(&self, flat: usize) -> Result<BoundingBox<D>, IgaError>
    {
        let state = self.state.borrow();
        let t = state.elements.flat_to_tensor(flat)?;
        Ok(BoundingBox::new(
            std::array::from_fn(|d| state.knots[d][t[d]]),
            std::array::from_fn(|d| state.knots[d][t[d] + 1]),
        ))
    }

    pub fn get_element_lengths(&self, flat: usize) -> Result<[f64; D], IgaError>
    {
        Ok(self.get_element_bounding_box(flat)?.widths())
    }

    ///
    /// Element containing `point`, searched per direction by bisection. A point on an
    /// interior knot belongs to the element on its lower side.
    ///
    pub fn get_element_flat_id_from_point(&self, point: &[f64; D]) -> Result<usize, IgaError>
    {
        let state = self.state.borrow();
        let mut tensor = [0; D];
        for d in 0..D
        {
            tensor[d] = locate(&state.knots[d], point[d]).ok_or(IgaError::OutOfDomain)?;
        }
        Ok(state.elements.tensor_to_flat_unchecked(&tensor))
    }

    pub fn is_boundary_element(&self, flat: usize) -> Result<bool, IgaError>
    {
        let state = self.state.borrow();
        let t = state.elements.flat_to_tensor(flat)?;
        let n = state.elements.extents();
        Ok((0..D).any(|d| t[d] == 0 || t[d] + 1 == n[d]))
    }

    /// Whether face `face` of element `flat` lies on the boundary of the grid.
    pub fn is_element_face_on_boundary(&self, flat: usize, face: usize) -> Result<bool, IgaError>
    {
        let (dir, side) = UnitElement::<D>::face_direction_and_side(face)?;
        let state = self.state.borrow();
        let t = state.elements.flat_to_tensor(flat)?;
        Ok(if side == 0 { t[dir] == 0 } else { t[dir] + 1 == state.elements.extents()[dir] })
    }

    pub fn get_boundary_id(&self, face: usize) -> Result<i32, IgaError>
    {
        UnitElement::<D>::face_direction_and_side(face)?;
        Ok(self.state.borrow().boundary_ids[face])
    }

    pub fn set_boundary_id(&self, face: usize, id: i32) -> Result<(), IgaError>
    {
        UnitElement::<D>::face_direction_and_side(face)?;
        self.state.borrow_mut().boundary_ids[face] = id;
        Ok(())
    }

    pub fn get_faces_with_boundary_id(&self, id: i32) -> Vec<usize>
    {
        self.state.borrow().boundary_ids.iter().enumerate().filter(|(_, &b)| b == id).map(|(f, _)| f).collect()
    }

    #[inline]
    pub fn get_face_normal(&self, face: usize) -> Result<[f64; D], IgaError>
    {
        UnitElement::<D>::face_normal(face)
    }

    pub fn add_element_property(&self, name: &str)
    {
        self.state.borrow_mut().element_properties.entry(name.to_string()).or_default();
    }

    pub fn set_element_property(&self, name: &str, flat: usize, status: bool) -> Result<(), IgaError>
    {
        let mut state = self.state.borrow_mut();
        let n = state.elements.flat_size();
        if flat >= n
        {
            return Err(IgaError::IndexOutOfRange { index: flat, extent: n });
        }
        let set = state.element_properties.get_mut(name).ok_or(IgaError::InvalidArgument("unknown element property"))?;
        if status
        {
            set.insert(flat);
        }
        else
        {
            set.shift_remove(&flat);
        }
        Ok(())
    }

    pub fn element_has_property(&self, flat: usize, name: &str) -> bool
    {
        self.state.borrow().element_properties.get(name).is_some_and(|s| s.contains(&flat))
    }

    pub fn elements_with_property(&self, name: &str) -> Result<Vec<usize>, IgaError>
    {
        let state = self.state.borrow();
        let set = state.element_properties.get(name).ok_or(IgaError::InvalidArgument("unknown element property"))?;
        let mut elements: Vec<usize> = set.iter().copied().collect();
        elements.sort_unstable();
        Ok(elements)
    }

    /// Element cursor positioned on the first element.
    pub fn begin(&self) -> GridElement<'_, D>
    {
        GridElement::new(self, 0)
    }

    pub fn element(&self, flat: usize) -> Result<GridElement<'_, D>, IgaError>
    {
        let mut elem = self.begin();
        elem.move_to(flat)?;
        Ok(elem)
    }

    ///
    /// The grid on face `face` of the boundary (`K == D - 1`) and, for every face element,
    /// the flat id of the volume element it bounds.
    ///
    pub fn get_face_grid<const K: usize>(&self, face: usize) -> Result<(Rc<Grid<K>>, Vec<usize>), IgaError>
    {
        if K + 1 != D
        {
            return Err(IgaError::DimensionMismatch { expected: D.saturating_sub(1), found: K });
        }
        let (dir, side) = UnitElement::<D>::face_direction_and_side(face)?;
        let state = self.state.borrow();
        let active: Vec<usize> = (0..D).filter(|&d| d != dir).collect();
        let knots: [Vec<f64>; K] = std::array::from_fn(|k| state.knots[active[k]].clone());
        let face_grid = Grid::<K>::create_from_knots(knots)?;
        let n = state.elements.extents();
        let element_map = face_grid.element_indexer().iter().map(|face_tensor| {
            let mut t = [0; D];
            for (k, &d) in active.iter().enumerate()
            {
                t[d] = face_tensor[k];
            }
            t[dir] = if side == 0 { 0 } else { n[dir] - 1 };
            state.elements.tensor_to_flat_unchecked(&t)
        }).collect();
        Ok((face_grid, element_map))
    }

    /// Grid as it was before the last refinement, if any.
    pub fn get_grid_previous_refinement(&self) -> Option<Rc<Grid<D>>>
    {
        self.state.borrow().previous.clone()
    }

    pub fn refine(&self, subdivisions: usize) -> Result<(), IgaError>
    {
        self.refine_directions([true; D], subdivisions)
    }

    pub fn refine_direction(&self, dir: usize, subdivisions: usize) -> Result<(), IgaError>
    {
        if dir >= D
        {
            return Err(IgaError::IndexOutOfRange { index: dir, extent: D });
        }
        let mut directions = [false; D];
        directions[dir] = true;
        self.refine_directions(directions, subdivisions)
    }

    ///
    /// Subdivides every interval of the selected directions into `subdivisions` equal
    /// parts. Observers are notified after the grid has been updated. Element cursors
    /// living across a refinement are invalidated.
    ///
    pub fn refine_directions(&self, directions: [bool; D], subdivisions: usize) -> Result<(), IgaError>
    {
        if subdivisions < 2
        {
            return Err(IgaError::InvalidArgument("refinement needs at least 2 subdivisions"));
        }
        let event = {
            let mut state = self.state.borrow_mut();
            let old_knots = state.knots.clone();
            let previous = Self::from_state(old_knots.clone(), state.boundary_ids.clone(), Some(state.element_properties.clone()));
            for d in 0..D
            {
                if directions[d]
                {
                    state.knots[d] = subdivide(&old_knots[d], subdivisions);
                }
            }
            let extents = std::array::from_fn(|d| state.knots[d].len() - 1);
            state.elements.set_extents(extents);

            // children inherit the properties of their parent element
            let coarse = previous.state.borrow();
            let mut properties: IndexMap<String, IndexSet<usize>> = coarse.element_properties.keys().map(|k| (k.clone(), IndexSet::new())).collect();
            for fine in 0..state.elements.flat_size()
            {
                let t = state.elements.flat_to_tensor_unchecked(fine);
                let parent: [usize; D] = std::array::from_fn(|d| if directions[d] { t[d] / subdivisions } else { t[d] });
                let parent = coarse.elements.tensor_to_flat_unchecked(&parent);
                for (name, set) in coarse.element_properties.iter()
                {
                    if set.contains(&parent)
                    {
                        if let Some(fine_set) = properties.get_mut(name)
                        {
                            fine_set.insert(fine);
                        }
                    }
                }
            }
            drop(coarse);
            state.element_properties = properties;
            state.previous = Some(previous);
            log::info!("refined grid {} to {:?} elements", self.object_id, state.elements.extents());
            GridRefinement { directions, subdivisions, old_knots }
        };
        self.refinement_signal.emit(&event);
        Ok(())
    }
}

impl<const D: usize> PartialEq for Grid<D>
{
    fn eq(&self, other: &Self) -> bool
    {
        *self.knots() == *other.knots()
    }
}

///
/// For every element of `fine`, the element of `coarse` containing it. Both grids must
/// cover the same box and every coarse knot must be a fine knot.
///
pub fn build_map_elements_between_grids<const D: usize>(fine: &Grid<D>, coarse: &Grid<D>) -> Result<Vec<usize>, IgaError>
{
    let mut map = Vec::with_capacity(fine.get_num_elements());
    for flat in 0..fine.get_num_elements()
    {
        let center = fine.get_element_bounding_box(flat)?.center();
        map.push(coarse.get_element_flat_id_from_point(&center)?);
    }
    Ok(map)
}

#[test]
fn check_rejects_bad_knots()
{
    assert_eq!(Grid::<1>::create_from_knots([vec![0.0, 1.0, 1.0]]).unwrap_err(), IgaError::InvalidKnotSequence);
    assert_eq!(Grid::<1>::create_from_knots([vec![0.0]]).unwrap_err(), IgaError::InvalidKnotSequence);
    assert_eq!(Grid::<2>::create_from_knots([vec![0.0, 1.0], vec![1.0, 0.0]]).unwrap_err(), IgaError::InvalidKnotSequence);
    assert!(Grid::<1>::create_uniform(1).is_err());
}

#[test]
fn check_element_counts_and_lookup()
{
    let grid = Grid::<2>::create_from_knots([vec![0.0, 1.0, 2.0, 3.0], vec![0.0, 0.5, 1.0]]).unwrap();
    assert_eq!(grid.get_num_elements(), 6);
    assert_eq!(grid.get_num_elements_dim(), [3, 2]);
    assert_eq!(grid.get_element_flat_id_from_point(&[0.0, 0.0]).unwrap(), 0);
    // ties on an interior knot go to the lower element
    assert_eq!(grid.get_element_flat_id_from_point(&[1.0, 0.5]).unwrap(), 0);
    assert_eq!(grid.get_element_flat_id_from_point(&[2.5, 0.75]).unwrap(), 5);
    assert_eq!(grid.get_element_flat_id_from_point(&[3.0, 1.0]).unwrap(), 5);
    assert_eq!(grid.get_element_flat_id_from_point(&[3.1, 1.0]), Err(IgaError::OutOfDomain));
    assert_eq!(grid.get_element_lengths(4).unwrap(), [1.0, 0.5]);
}

#[test]
fn check_refinement_keeps_previous_grid()
{
    let grid = Grid::<1>::create_uniform(3).unwrap();
    let original = grid.get_knot_coordinates(0);
    grid.refine_direction(0, 2).unwrap();
    assert_eq!(grid.get_knot_coordinates(0).len(), 5);
    assert_eq!(grid.get_knot_coordinates(0), vec![0.0, 0.25, 0.5, 0.75, 1.0]);
    let previous = grid.get_grid_previous_refinement().unwrap();
    assert_eq!(previous.get_knot_coordinates(0), original);
    assert_eq!(grid.refine(1), Err(IgaError::InvalidArgument("refinement needs at least 2 subdivisions")));
}

#[test]
fn check_refinement_notifies_observers()
{
    let grid = Grid::<2>::create_uniform(2).unwrap();
    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::downgrade(&seen);
    grid.refinement_signal().connect(move |e: &GridRefinement<2>| match sink.upgrade()
    {
        Some(s) =>
        {
            s.borrow_mut().push(e.directions);
            true
        }
        None => false,
    });
    grid.refine_direction(1, 3).unwrap();
    assert_eq!(*seen.borrow(), vec![[false, true]]);
    assert_eq!(grid.get_num_elements_dim(), [1, 3]);
}

#[test]
fn check_face_grid_and_element_map()
{
    let grid = Grid::<2>::create_from_knots([vec![0.0, 1.0, 2.0], vec![0.0, 1.0, 2.0, 3.0]]).unwrap();
    let (face_grid, map) = grid.get_face_grid::<1>(3).unwrap();
    assert_eq!(face_grid.get_knot_coordinates(0), vec![0.0, 1.0, 2.0]);
    assert_eq!(map, vec![4, 5]);
    let (_, map) = grid.get_face_grid::<1>(0).unwrap();
    assert_eq!(map, vec![0, 2, 4]);
    assert!(grid.get_face_grid::<2>(0).is_err());
}

#[test]
fn check_element_map_between_grids()
{
    let grid = Grid::<2>::create_uniform(3).unwrap();
    grid.refine(2).unwrap();
    let coarse = grid.get_grid_previous_refinement().unwrap();
    let map = build_map_elements_between_grids(&grid, &coarse).unwrap();
    assert_eq!(map.len(), 16);
    assert_eq!(map[0], 0);
    assert_eq!(map[3], 1);
    assert_eq!(map[15], 3);
}

#[test]
fn check_properties_follow_refinement()
{
    let grid = Grid::<1>::create_uniform(3).unwrap();
    grid.add_element_property("marked");
    grid.set_element_property("marked", 1, true).unwrap();
    grid.refine(2).unwrap();
    assert_eq!(grid.elements_with_property("marked").unwrap(), vec![2, 3]);
    assert_eq!(grid.elements_with_property(ACTIVE).unwrap(), vec![0, 1, 2, 3]);
}
