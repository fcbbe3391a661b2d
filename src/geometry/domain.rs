use std::rc::Rc;

use crate::errors::IgaError;
use crate::functions::face::FaceGridFunction;
use crate::functions::GridFunction;
use crate::grids::grid::Grid;
use crate::utilities::next_object_id;

use super::domain_element::{DomainElement, DomainHandler};

///
/// Geometry of a patch: the parametric grid mapped to `S`-dimensional space by one grid
/// function.
///
pub struct Domain<const D: usize, const S: usize>
{
    object_id: usize,
    function: Rc<dyn GridFunction<D, S>>,
}

impl<const D: usize, const S: usize> std::fmt::Debug for Domain<D, S>
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result
    {
        f.debug_struct("Domain").field("object_id", &self.object_id).field("grid", &self.get_grid().get_object_id()).finish()
    }
}

impl<const D: usize, const S: usize> Domain<D, S>
{
    pub fn create(function: Rc<dyn GridFunction<D, S>>) -> Rc<Self>
    {
        let domain = Self { object_id: next_object_id(), function };
        log::debug!("created domain {} on grid {}", domain.object_id, domain.get_grid().get_object_id());
        Rc::new(domain)
    }

    #[inline]
    pub fn get_object_id(&self) -> usize
    {
        self.object_id
    }

    #[inline]
    pub fn get_grid_function(&self) -> &Rc<dyn GridFunction<D, S>>
    {
        &self.function
    }

    #[inline]
    pub fn get_grid(&self) -> &Rc<Grid<D>>
    {
        self.function.get_grid()
    }

    pub fn create_cache_handler(&self) -> DomainHandler<'_, D, S>
    {
        DomainHandler::new(self)
    }

    pub fn begin(&self) -> DomainElement<'_, D, S>
    {
        DomainElement::new(self, self.get_grid().begin())
    }

    pub fn element(&self, flat: usize) -> Result<DomainElement<'_, D, S>, IgaError>
    {
        let mut elem = self.begin();
        elem.move_to(flat)?;
        Ok(elem)
    }

    ///
    /// The domain restricted to face `face` (`K == D - 1`), with its own face grid.
    ///
    pub fn get_face_domain<const K: usize>(&self, face: usize) -> Result<Rc<Domain<K, S>>, IgaError>
    {
        let function = FaceGridFunction::<K, D, S>::create(self.function.clone(), face)?;
        Ok(Domain::create(function))
    }

    /// Physical points of `element` for points of its unit cube, e.g. for plotting.
    pub fn evaluate_at_points(&self, element: usize, points: &[[f64; D]]) -> Result<Vec<[f64; S]>, IgaError>
    {
        Ok(self.function.evaluate(element, points, 0)?.values)
    }
}

