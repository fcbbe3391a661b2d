use std::rc::Rc;

use rustc_hash::FxHashMap;

use crate::errors::IgaError;
use crate::flags::{BasisFlags, ValueKind};
use crate::grids::grid_element::GridElement;
use crate::grids::unit_element::UnitElement;
use crate::quadrature::Quadrature;
use crate::utilities::value_table::ValueTable;

use super::dof_distribution::ElementDofs;
use super::element_cache::ElementCache;
use super::integration::{integrate_entry_function, integrate_entry_products};
use super::reference_basis::{BasisCapabilities, BernsteinTables, LocalBasisValues, ReferenceBasis};

///
/// Cursor over the elements of a reference basis with a private value cache.
///
/// The element borrows the basis. Refining the basis while the element is alive invalidates
/// the cached values.
///
#[derive(Clone, Debug)]
pub struct ReferenceBasisElement<'a, const D: usize>
{
    basis: &'a ReferenceBasis<D>,
    grid_element: GridElement<'a, D>,
    cache: ElementCache<D>,
    /// Scalar local values of the last fill.
    local: LocalBasisValues<D>,
}

impl<'a, const D: usize> ReferenceBasisElement<'a, D>
{
    #[inline]
    pub fn get_basis(&self) -> &'a ReferenceBasis<D>
    {
        self.basis
    }

    #[inline]
    pub fn get_grid_element(&self) -> &GridElement<'a, D>
    {
        &self.grid_element
    }

    #[inline]
    pub fn get_index(&self) -> usize
    {
        self.grid_element.get_index()
    }

    #[inline]
    pub fn get_cache(&self) -> &ElementCache<D>
    {
        &self.cache
    }

    #[inline]
    pub(crate) fn get_cache_mut(&mut self) -> &mut ElementCache<D>
    {
        &mut self.cache
    }

    #[inline]
    pub(crate) fn get_local_values(&self) -> &LocalBasisValues<D>
    {
        &self.local
    }

    pub fn move_to(&mut self, flat: usize) -> Result<(), IgaError>
    {
        self.grid_element.move_to(flat)?;
        self.cache.reset_filled();
        Ok(())
    }

    /// Advances to the next element; the cache keeps its layout but must be filled again.
    pub fn next_element(&mut self) -> bool
    {
        let moved = self.grid_element.next_element();
        if moved
        {
            self.cache.reset_filled();
        }
        moved
    }

    #[inline]
    pub fn get_num_basis(&self) -> usize
    {
        self.basis.get_element_num_basis()
    }

    /// The element's dofs carrying `property`, in local, patch and global numbering.
    pub fn get_element_dofs(&self, property: &str) -> Result<ElementDofs, IgaError>
    {
        self.basis.get_spline_space().get_element_dofs_view(self.get_index(), property)
    }

    pub fn get_local_to_global(&self, property: &str) -> Result<Vec<usize>, IgaError>
    {
        Ok(self.get_element_dofs(property)?.global)
    }

    pub fn get_local_to_patch(&self, property: &str) -> Result<Vec<usize>, IgaError>
    {
        Ok(self.get_element_dofs(property)?.patch)
    }

    pub fn get_local_dofs(&self, property: &str) -> Result<Vec<usize>, IgaError>
    {
        Ok(self.get_element_dofs(property)?.local)
    }

    pub fn get_values(&self, sdim: usize, sid: usize) -> Result<&ValueTable, IgaError>
    {
        self.cache.get(ValueKind::Value, sdim, sid)
    }

    pub fn get_gradients(&self, sdim: usize, sid: usize) -> Result<&ValueTable, IgaError>
    {
        self.cache.get(ValueKind::Gradient, sdim, sid)
    }

    pub fn get_hessians(&self, sdim: usize, sid: usize) -> Result<&ValueTable, IgaError>
    {
        self.cache.get(ValueKind::Hessian, sdim, sid)
    }

    pub fn get_divergences(&self, sdim: usize, sid: usize) -> Result<&ValueTable, IgaError>
    {
        self.cache.get(ValueKind::Divergence, sdim, sid)
    }

    pub fn get_element_values(&self) -> Result<&ValueTable, IgaError>
    {
        self.get_values(D, 0)
    }

    pub fn get_element_gradients(&self) -> Result<&ValueTable, IgaError>
    {
        self.get_gradients(D, 0)
    }

    pub fn get_element_hessians(&self) -> Result<&ValueTable, IgaError>
    {
        self.get_hessians(D, 0)
    }

    pub fn get_element_divergences(&self) -> Result<&ValueTable, IgaError>
    {
        self.get_divergences(D, 0)
    }

    /// Quadrature weights times the parametric measure of the sub-element.
    pub fn get_w_measures(&self, sdim: usize, sid: usize) -> Result<Vec<f64>, IgaError>
    {
        self.grid_element.get_w_measures(self.cache.get_quadrature(sdim, sid)?)
    }

    /// Quadrature points of the sub-element in parametric coordinates.
    pub fn get_points(&self, sdim: usize, sid: usize) -> Result<Vec<[f64; D]>, IgaError>
    {
        self.grid_element.get_points(self.cache.get_quadrature(sdim, sid)?)
    }

    /// Local mass matrix of the dofs carrying `property`.
    pub fn integrate_u_v(&self, property: &str) -> Result<Vec<f64>, IgaError>
    {
        let local = self.get_local_dofs(property)?;
        integrate_entry_products(self.get_element_values()?, &local, &self.get_w_measures(D, 0)?)
    }

    /// Local stiffness matrix (parametric gradients) of the dofs carrying `property`.
    pub fn integrate_gradu_gradv(&self, property: &str) -> Result<Vec<f64>, IgaError>
    {
        let local = self.get_local_dofs(property)?;
        integrate_entry_products(self.get_element_gradients()?, &local, &self.get_w_measures(D, 0)?)
    }

    ///
    /// Local load vector against `func`, which holds one value per component at each
    /// quadrature point.
    ///
    pub fn integrate_u_func(&self, func: &[f64], property: &str) -> Result<Vec<f64>, IgaError>
    {
        let local = self.get_local_dofs(property)?;
        integrate_entry_function(self.get_element_values()?, &local, func, &self.get_w_measures(D, 0)?)
    }
}

impl<const D: usize> ReferenceBasis<D>
{
    /// Element cursor on the first element.
    pub fn begin(&self) -> ReferenceBasisElement<'_, D>
    {
        ReferenceBasisElement { basis: self, grid_element: self.get_spline_space().get_grid().begin(), cache: ElementCache::new(), local: LocalBasisValues::default() }
    }

    pub fn element(&self, flat: usize) -> Result<ReferenceBasisElement<'_, D>, IgaError>
    {
        let mut elem = self.begin();
        elem.move_to(flat)?;
        Ok(elem)
    }

    pub fn create_cache_handler(&self) -> ReferenceBasisHandler<'_, D>
    {
        ReferenceBasisHandler { basis: self, flags: FxHashMap::default(), entries: FxHashMap::default() }
    }
}

#[derive(Clone, Debug)]
struct HandlerEntry<const D: usize>
{
    source_quad_id: usize,
    flags: BasisFlags,
    quad: Rc<Quadrature<D>>,
    bernstein: BernsteinTables<D>,
}

///
/// Evaluates the basis into element caches. Flags are declared per sub-element dimension,
/// Bernstein polynomials are evaluated once per quadrature and shared by all elements.
///
#[derive(Clone, Debug)]
pub struct ReferenceBasisHandler<'a, const D: usize>
{
    basis: &'a ReferenceBasis<D>,
    flags: FxHashMap<usize, BasisFlags>,
    entries: FxHashMap<(usize, usize), HandlerEntry<D>>,
}

impl<'a, const D: usize> ReferenceBasisHandler<'a, D>
{
    #[inline]
    pub fn get_basis(&self) -> &'a ReferenceBasis<D>
    {
        self.basis
    }

    pub fn set_flags(&mut self, sdim: usize, flags: BasisFlags) -> Result<(), IgaError>
    {
        if sdim > D
        {
            return Err(IgaError::InvalidArgument("sub-element dimension exceeds the element dimension"));
        }
        self.flags.insert(sdim, flags);
        Ok(())
    }

    pub fn set_element_flags(&mut self, flags: BasisFlags) -> Result<(), IgaError>
    {
        self.set_flags(D, flags)
    }

    pub fn get_flags(&self, sdim: usize) -> BasisFlags
    {
        self.flags.get(&sdim).copied().unwrap_or_default()
    }

    ///
    /// Prepares the caches of all `K`-dimensional sub-elements of `elem` for `quad`.
    ///
    pub fn init_cache<const K: usize>(&mut self, elem: &mut ReferenceBasisElement<'_, D>, quad: &Quadrature<K>) -> Result<(), IgaError>
    {
        let flags = self.get_flags(K);
        let space = self.basis.get_spline_space();
        let degrees: Vec<[usize; D]> = (0..space.get_num_components()).map(|c| space.get_degree(c)).collect::<Result<_, _>>()?;
        let n_functions = space.get_element_num_basis();
        let n_components = space.get_num_components();
        let max_order = flags.max_derivative_order();
        for sub in UnitElement::<D>::sub_elements(K)?
        {
            let key = (K, sub.id);
            let reusable = self.entries.get(&key).is_some_and(|e| e.source_quad_id == quad.get_id() && e.flags == flags);
            if !reusable
            {
                let lifted = Rc::new(quad.collapse_to_sub_element::<D>(&sub)?);
                let bernstein = BernsteinTables::new(&degrees, lifted.get_points(), max_order);
                self.entries.insert(key, HandlerEntry { source_quad_id: quad.get_id(), flags, quad: lifted, bernstein });
            }
            let entry = &self.entries[&key];
            elem.get_cache_mut().init_sub_element(K, sub.id, flags, entry.quad.clone(), entry.source_quad_id, n_functions, n_components, D);
        }
        Ok(())
    }

    pub fn init_element_cache(&mut self, elem: &mut ReferenceBasisElement<'_, D>, quad: &Quadrature<D>) -> Result<(), IgaError>
    {
        self.init_cache::<D>(elem, quad)
    }

    ///
    /// Evaluates the requested kinds on sub-element `(sdim, sid)` of the current element.
    /// The scalar values are evaluated into the element's buffer and scattered into the cache,
    /// so a steady fill loop does not allocate.
    ///
    pub fn fill_cache(&self, elem: &mut ReferenceBasisElement<'_, D>, sdim: usize, sid: usize) -> Result<(), IgaError>
    {
        let entry = self.entries.get(&(sdim, sid)).ok_or(IgaError::InvalidArgument("cache handler not initialized for this sub-element"))?;
        let index = elem.get_index();
        let ReferenceBasisElement { cache, local, .. } = elem;
        let sub_cache = cache.get_sub_element_mut(sdim, sid).ok_or(IgaError::InvalidArgument("element cache not initialized for this sub-element"))?;
        if sub_cache.get_source_quadrature_id() != entry.source_quad_id
        {
            return Err(IgaError::InvalidArgument("element cache was initialized with another quadrature"));
        }
        self.basis.evaluate_local_into(index, &entry.bernstein, entry.flags.max_derivative_order(), local)?;
        sub_cache.fill_from_scalar(&local.components, &local.values, &local.gradients, &local.hessians)
    }

    pub fn fill_element_cache(&self, elem: &mut ReferenceBasisElement<'_, D>) -> Result<(), IgaError>
    {
        self.fill_cache(elem, D, 0)
    }
}

#[cfg(test)]
mod tests
{
    use super::*;
    use crate::basis::bspline::BSpline;
    use crate::basis::spline_space::SplineSpace;
    use crate::grids::grid::{Grid, ACTIVE};
    use approx::assert_abs_diff_eq;

    fn quadratic_basis(n_knots: usize) -> ReferenceBasis<2>
    {
        let grid = Grid::<2>::create_uniform(n_knots).unwrap();
        BSpline::create(SplineSpace::create_scalar(grid, 2).unwrap()).into()
    }

    #[test]
    fn reading_undeclared_kind_fails()
    {
        let basis = quadratic_basis(3);
        let mut handler = basis.create_cache_handler();
        handler.set_element_flags(BasisFlags::new().with_value(true)).unwrap();
        let mut elem = basis.begin();
        let quad = Quadrature::<2>::gauss_isotropic(3).unwrap();
        handler.init_element_cache(&mut elem, &quad).unwrap();
        assert_eq!(elem.get_element_values().unwrap_err(), IgaError::CacheNotFilled);
        handler.fill_element_cache(&mut elem).unwrap();
        assert_eq!(elem.get_element_values().unwrap().n_points(), 9);
        assert_eq!(elem.get_element_gradients().unwrap_err(), IgaError::ValueKindNotRequested);
        assert!(elem.next_element());
        assert_eq!(elem.get_element_values().unwrap_err(), IgaError::CacheNotFilled);
    }

    #[test]
    fn mass_matrix_sums_to_domain_measure()
    {
        let basis = quadratic_basis(4);
        let mut handler = basis.create_cache_handler();
        handler.set_element_flags(BasisFlags::new().with_value(true).with_gradient(true)).unwrap();
        let quad = Quadrature::<2>::gauss_isotropic(3).unwrap();
        let mut elem = basis.begin();
        handler.init_element_cache(&mut elem, &quad).unwrap();
        let mut total = 0.0;
        let mut stiffness_row_sum = 0.0_f64;
        loop
        {
            handler.fill_element_cache(&mut elem).unwrap();
            total += elem.integrate_u_v(ACTIVE).unwrap().iter().sum::<f64>();
            let k = elem.integrate_gradu_gradv(ACTIVE).unwrap();
            stiffness_row_sum = stiffness_row_sum.max(k[..9].iter().sum::<f64>().abs());
            if !elem.next_element()
            {
                break;
            }
        }
        assert_abs_diff_eq!(total, 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(stiffness_row_sum, 0.0, epsilon = 1e-12);
    }

    #[test]
    fn face_caches_use_face_measures()
    {
        let basis = quadratic_basis(3);
        let mut handler = basis.create_cache_handler();
        handler.set_flags(1, BasisFlags::new().with_value(true)).unwrap();
        let quad = Quadrature::<1>::gauss_isotropic(2).unwrap();
        let mut elem = basis.begin();
        handler.init_cache(&mut elem, &quad).unwrap();
        for face in 0..4
        {
            handler.fill_cache(&mut elem, 1, face).unwrap();
            let values = elem.get_values(1, face).unwrap();
            let w = elem.get_w_measures(1, face).unwrap();
            let integral: f64 = (0..9).map(|f| (0..2).map(|q| w[q] * values.entry(f, q)[0]).sum::<f64>()).sum();
            assert_abs_diff_eq!(integral, 0.5, epsilon = 1e-13);
        }
        // face 0 is x = 0: only functions with local x index 0 are nonzero
        let values = elem.get_values(1, 0).unwrap();
        assert_abs_diff_eq!(values.entry(1, 0)[0], 0.0, epsilon = 1e-14);
    }

    #[test]
    fn dof_views()
    {
        let basis = quadratic_basis(3);
        let elem = basis.element(3).unwrap();
        assert_eq!(elem.get_local_to_global(ACTIVE).unwrap(), vec![5, 6, 7, 9, 10, 11, 13, 14, 15]);
        assert_eq!(elem.get_num_basis(), 9);
        assert!(basis.element(4).is_err());
    }
}
