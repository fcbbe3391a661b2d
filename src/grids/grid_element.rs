use crate::errors::IgaError;
use crate::quadrature::Quadrature;
use crate::utilities::tensor_index::TensorIndex;

use super::bounding_box::BoundingBox;
use super::grid::Grid;

///
/// Cursor over the elements of a grid in increasing flat order.
///
/// The cursor borrows the grid; refining the grid while a cursor is alive leaves the
/// cursor pointing at an index of the refined grid.
///
#[derive(Clone, Debug)]
pub struct GridElement<'a, const D: usize>
{
    grid: &'a Grid<D>,
    flat: usize,
    tensor: TensorIndex<D>,
}

impl<'a, const D: usize> GridElement<'a, D>
{
    pub(crate) fn new(grid: &'a Grid<D>, flat: usize) -> Self
    {
        let tensor = grid.element_indexer().flat_to_tensor_unchecked(flat);
        Self { grid, flat, tensor }
    }

    #[inline]
    pub fn get_grid(&self) -> &'a Grid<D>
    {
        self.grid
    }

    #[inline]
    pub fn get_index(&self) -> usize
    {
        self.flat
    }

    #[inline]
    pub fn get_tensor_index(&self) -> &TensorIndex<D>
    {
        &self.tensor
    }

    pub fn move_to(&mut self, flat: usize) -> Result<(), IgaError>
    {
        self.tensor = self.grid.flat_to_tensor(flat)?;
        self.flat = flat;
        Ok(())
    }

    ///
    /// Advances to the next element. Returns `false` (and stays on the last element) when
    /// the cursor already is on the last element.
    ///
    pub fn next_element(&mut self) -> bool
    {
        if self.flat + 1 >= self.grid.get_num_elements()
        {
            return false;
        }
        self.flat += 1;
        self.tensor = self.grid.element_indexer().flat_to_tensor_unchecked(self.flat);
        true
    }

    pub fn get_bounding_box(&self) -> Result<BoundingBox<D>, IgaError>
    {
        self.grid.get_element_bounding_box(self.flat)
    }

    pub fn get_lengths(&self) -> Result<[f64; D], IgaError>
    {
        self.grid.get_element_lengths(self.flat)
    }

    pub fn get_measure(&self) -> Result<f64, IgaError>
    {
        Ok(self.get_bounding_box()?.volume())
    }

    pub fn is_boundary(&self) -> Result<bool, IgaError>
    {
        self.grid.is_boundary_element(self.flat)
    }

    pub fn is_boundary_face(&self, face: usize) -> Result<bool, IgaError>
    {
        self.grid.is_element_face_on_boundary(self.flat, face)
    }

    pub fn has_property(&self, name: &str) -> bool
    {
        self.grid.element_has_property(self.flat, name)
    }

    /// Quadrature points mapped from the unit cube onto this element.
    pub fn get_points(&self, quad: &Quadrature<D>) -> Result<Vec<[f64; D]>, IgaError>
    {
        let bbox = self.get_bounding_box()?;
        Ok(quad.get_points().iter().map(|p| bbox.to_real_coordinate(p)).collect())
    }

    ///
    /// Quadrature weights scaled by the measure of the (sub-)element the rule lives on.
    ///
    pub fn get_w_measures(&self, quad: &Quadrature<D>) -> Result<Vec<f64>, IgaError>
    {
        quad.dilated_weights(&self.get_bounding_box()?)
    }
}

#[test]
fn check_cursor_walks_all_elements()
{
    let grid = Grid::<2>::create_uniform(4).unwrap();
    let mut elem = grid.begin();
    let mut visited = vec![elem.get_index()];
    while elem.next_element()
    {
        visited.push(elem.get_index());
    }
    assert_eq!(visited, (0..9).collect::<Vec<_>>());
    assert_eq!(elem.get_tensor_index(), &[2, 2]);
    assert!(elem.move_to(9).is_err());
    elem.move_to(4).unwrap();
    assert!(!elem.is_boundary().unwrap());
    assert!(elem.is_boundary_face(0).is_ok_and(|b| !b));
}

#[test]
fn check_element_weights_sum_to_volume()
{
    let grid = Grid::<2>::create_from_knots([vec![0.0, 2.0], vec![0.0, 0.5, 3.0]]).unwrap();
    let quad = crate::quadrature::Quadrature::<2>::gauss([3, 2]).unwrap();
    let elem = grid.element(1).unwrap();
    let total: f64 = elem.get_w_measures(&quad).unwrap().iter().sum();
    approx::assert_relative_eq!(total, 5.0, epsilon = 1e-13);
    let points = elem.get_points(&quad).unwrap();
    assert!(points.iter().all(|p| p[1] > 0.5 && p[1] < 3.0));
}
