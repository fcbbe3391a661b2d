use std::cell::RefCell;
use std::rc::Rc;

use crate::errors::IgaError;
use crate::grids::grid::Grid;
use crate::grids::unit_element::{SubElement, UnitElement};

use super::{GridFunction, GridFunctionValues};

///
/// Restriction of a grid function on a `D`-dimensional grid to one of its faces
/// (`K == D - 1`). Face points are lifted onto the bounding volume element; derivatives are
/// taken along the face directions only.
///
/// The face grid is a snapshot: it does not follow later refinements of the volume grid.
///
pub struct FaceGridFunction<const K: usize, const D: usize, const S: usize>
{
    parent: Rc<dyn GridFunction<D, S>>,
    face: usize,
    sub_element: SubElement,
    grid: Rc<Grid<K>>,
    element_map: Vec<usize>,
    lifted: RefCell<Vec<[f64; D]>>,
    parent_values: RefCell<GridFunctionValues<D, S>>,
}

impl<const K: usize, const D: usize, const S: usize> std::fmt::Debug for FaceGridFunction<K, D, S>
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result
    {
        f.debug_struct("FaceGridFunction").field("face", &self.face).field("element_map", &self.element_map).finish()
    }
}

impl<const K: usize, const D: usize, const S: usize> FaceGridFunction<K, D, S>
{
    pub fn create(parent: Rc<dyn GridFunction<D, S>>, face: usize) -> Result<Rc<Self>, IgaError>
    {
        let (grid, element_map) = parent.get_grid().get_face_grid::<K>(face)?;
        let sub_element = UnitElement::<D>::sub_element(K, face)?;
        Ok(Rc::new(Self { parent, face, sub_element, grid, element_map, lifted: RefCell::new(Vec::new()), parent_values: RefCell::new(GridFunctionValues::default()) }))
    }

    #[inline]
    pub fn get_face(&self) -> usize
    {
        self.face
    }

    /// Volume element bounded by each face element.
    #[inline]
    pub fn get_element_map(&self) -> &[usize]
    {
        &self.element_map
    }

    pub fn get_parent(&self) -> &Rc<dyn GridFunction<D, S>>
    {
        &self.parent
    }
}

impl<const K: usize, const D: usize, const S: usize> GridFunction<K, S> for FaceGridFunction<K, D, S>
{
    fn get_grid(&self) -> &Rc<Grid<K>>
    {
        &self.grid
    }

    fn evaluate_into(&self, element: usize, points: &[[f64; K]], max_order: usize, out: &mut GridFunctionValues<K, S>) -> Result<(), IgaError>
    {
        let volume_element = *self.element_map.get(element).ok_or(IgaError::IndexOutOfRange { index: element, extent: self.element_map.len() })?;
        let mut lifted = self.lifted.borrow_mut();
        lifted.clear();
        lifted.extend(points.iter().map(|p| self.sub_element.lift_point(p)));
        let mut parent = self.parent_values.borrow_mut();
        self.parent.evaluate_into(volume_element, &lifted, max_order, &mut parent)?;
        let active = &self.sub_element.active_directions;
        out.clear();
        out.values.extend_from_slice(&parent.values);
        out.jacobians.extend(parent.jacobians.iter().map(|jac| -> [[f64; K]; S] { std::array::from_fn(|i| std::array::from_fn(|k| jac[i][active[k]])) }));
        out.hessians.extend(parent.hessians.iter().map(|hess| -> [[[f64; K]; K]; S] {
            std::array::from_fn(|i| std::array::from_fn(|k| std::array::from_fn(|l| hess[i][active[k]][active[l]])))
        }));
        Ok(())
    }
}

#[test]
fn check_face_of_identity()
{
    use super::identity::IdentityGridFunction;
    let grid = Grid::<2>::create_from_knots([vec![0.0, 1.0, 2.0], vec![0.0, 3.0]]).unwrap();
    let parent: Rc<dyn GridFunction<2, 2>> = IdentityGridFunction::create(grid);
    // face 1 is x = 2, running along y
    let face = FaceGridFunction::<1, 2, 2>::create(parent, 1).unwrap();
    assert_eq!(face.get_element_map(), &[1]);
    let v = face.evaluate(0, &[[0.5]], 1).unwrap();
    assert_eq!(v.values, vec![[2.0, 1.5]]);
    assert_eq!(v.jacobians, vec![[[0.0], [1.0]]]);
}
