use rustc_hash::FxHashMap;

use crate::errors::IgaError;
use crate::flags::{BasisFlags, DomainFlags, ValueKind};
use crate::geometry::domain_element::{DomainElement, DomainHandler};
use crate::grids::unit_element::UnitElement;
use crate::quadrature::Quadrature;
use crate::utilities::value_table::ValueTable;

use super::dof_distribution::ElementDofs;
use super::element_cache::ElementCache;
use super::integration::{integrate_entry_function, integrate_entry_products};
use super::physical_basis::PhysicalBasis;
use super::reference_basis::{BasisCapabilities, LocalBasisValues};
use super::reference_element::{ReferenceBasisElement, ReferenceBasisHandler};

///
/// Cursor over the elements of a physical basis. It drives a reference element and a
/// domain element in lock step and keeps the pushed-forward values in its own cache.
///
#[derive(Clone, Debug)]
pub struct PhysicalBasisElement<'a, const D: usize, const S: usize>
{
    basis: &'a PhysicalBasis<D, S>,
    reference: ReferenceBasisElement<'a, D>,
    domain: DomainElement<'a, D, S>,
    cache: ElementCache<D>,
    /// Scalar physical derivatives of the last fill, before the scatter into components.
    gradients: ValueTable,
    hessians: ValueTable,
}

impl<'a, const D: usize, const S: usize> PhysicalBasisElement<'a, D, S>
{
    #[inline]
    pub fn get_basis(&self) -> &'a PhysicalBasis<D, S>
    {
        self.basis
    }

    #[inline]
    pub fn get_reference_element(&self) -> &ReferenceBasisElement<'a, D>
    {
        &self.reference
    }

    #[inline]
    pub fn get_domain_element(&self) -> &DomainElement<'a, D, S>
    {
        &self.domain
    }

    #[inline]
    pub fn get_index(&self) -> usize
    {
        self.reference.get_index()
    }

    pub fn move_to(&mut self, flat: usize) -> Result<(), IgaError>
    {
        self.reference.move_to(flat)?;
        self.domain.move_to(flat)?;
        self.cache.reset_filled();
        Ok(())
    }

    pub fn next_element(&mut self) -> bool
    {
        let moved = self.reference.next_element();
        if moved
        {
            self.domain.next_element();
            self.cache.reset_filled();
        }
        moved
    }

    #[inline]
    pub fn get_num_basis(&self) -> usize
    {
        self.reference.get_num_basis()
    }

    pub fn get_element_dofs(&self, property: &str) -> Result<ElementDofs, IgaError>
    {
        self.reference.get_element_dofs(property)
    }

    pub fn get_local_to_global(&self, property: &str) -> Result<Vec<usize>, IgaError>
    {
        self.reference.get_local_to_global(property)
    }

    pub fn get_local_to_patch(&self, property: &str) -> Result<Vec<usize>, IgaError>
    {
        self.reference.get_local_to_patch(property)
    }

    pub fn get_local_dofs(&self, property: &str) -> Result<Vec<usize>, IgaError>
    {
        self.reference.get_local_dofs(property)
    }

    pub fn get_values(&self, sdim: usize, sid: usize) -> Result<&ValueTable, IgaError>
    {
        self.cache.get(ValueKind::Value, sdim, sid)
    }

    /// Gradients with respect to the physical coordinates, entry length `components * S`.
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

    /// Physical measures times quadrature weights.
    pub fn get_w_measures(&self, sdim: usize, sid: usize) -> Result<&[f64], IgaError>
    {
        self.domain.get_w_measures(sdim, sid)
    }

    /// Quadrature points mapped to the physical domain.
    pub fn get_points(&self, sdim: usize, sid: usize) -> Result<&[[f64; S]], IgaError>
    {
        self.domain.get_points(sdim, sid)
    }

    pub fn get_element_w_measures(&self) -> Result<&[f64], IgaError>
    {
        self.get_w_measures(D, 0)
    }

    pub fn get_element_points(&self) -> Result<&[[f64; S]], IgaError>
    {
        self.get_points(D, 0)
    }

    pub fn integrate_u_v(&self, property: &str) -> Result<Vec<f64>, IgaError>
    {
        let local = self.get_local_dofs(property)?;
        integrate_entry_products(self.get_element_values()?, &local, self.get_element_w_measures()?)
    }

    pub fn integrate_gradu_gradv(&self, property: &str) -> Result<Vec<f64>, IgaError>
    {
        let local = self.get_local_dofs(property)?;
        integrate_entry_products(self.get_element_gradients()?, &local, self.get_element_w_measures()?)
    }

    pub fn integrate_u_func(&self, func: &[f64], property: &str) -> Result<Vec<f64>, IgaError>
    {
        let local = self.get_local_dofs(property)?;
        integrate_entry_function(self.get_element_values()?, &local, func, self.get_element_w_measures()?)
    }
}

impl<const D: usize, const S: usize> PhysicalBasis<D, S>
{
    pub fn begin(&self) -> PhysicalBasisElement<'_, D, S>
    {
        PhysicalBasisElement
        {
            basis: self,
            reference: self.get_reference_basis().begin(),
            domain: self.get_domain().begin(),
            cache: ElementCache::new(),
            gradients: ValueTable::default(),
            hessians: ValueTable::default(),
        }
    }

    pub fn element(&self, flat: usize) -> Result<PhysicalBasisElement<'_, D, S>, IgaError>
    {
        let mut elem = self.begin();
        elem.move_to(flat)?;
        Ok(elem)
    }

    pub fn create_cache_handler(&self) -> PhysicalBasisHandler<'_, D, S>
    {
        PhysicalBasisHandler
        {
            basis: self,
            reference: self.get_reference_basis().create_cache_handler(),
            domain: self.get_domain().create_cache_handler(),
            flags: FxHashMap::default(),
        }
    }
}

///
/// Fills physical element caches from a reference handler and a domain handler.
///
#[derive(Clone, Debug)]
pub struct PhysicalBasisHandler<'a, const D: usize, const S: usize>
{
    basis: &'a PhysicalBasis<D, S>,
    reference: ReferenceBasisHandler<'a, D>,
    domain: DomainHandler<'a, D, S>,
    flags: FxHashMap<usize, BasisFlags>,
}

impl<'a, const D: usize, const S: usize> PhysicalBasisHandler<'a, D, S>
{
    #[inline]
    pub fn get_basis(&self) -> &'a PhysicalBasis<D, S>
    {
        self.basis
    }

    ///
    /// Declares the physical kinds wanted on `sdim`-dimensional sub-elements. The reference
    /// and geometric quantities they are pushed forward from are requested as well; the
    /// weighted measure and the physical points are always available.
    ///
    pub fn set_flags(&mut self, sdim: usize, flags: BasisFlags) -> Result<(), IgaError>
    {
        let mut reference = BasisFlags::new().with_value(flags.value());
        let mut domain = DomainFlags::new().with_point(true).with_w_measure(true);
        if flags.gradient() || flags.divergence() || flags.hessian()
        {
            reference.set_gradient(true);
            domain.set_inv_jacobian(true);
        }
        if flags.hessian()
        {
            reference.set_hessian(true);
            domain.set_hessian(true);
        }
        self.reference.set_flags(sdim, reference)?;
        self.domain.set_flags(sdim, domain)?;
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

    pub fn init_cache<const K: usize>(&mut self, elem: &mut PhysicalBasisElement<'_, D, S>, quad: &Quadrature<K>) -> Result<(), IgaError>
    {
        self.reference.init_cache::<K>(&mut elem.reference, quad)?;
        self.domain.init_cache::<K>(&mut elem.domain, quad)?;
        let flags = self.get_flags(K);
        let space = self.basis.get_spline_space();
        for sub in UnitElement::<D>::sub_elements(K)?
        {
            let lifted = elem.reference.get_cache().get_quadrature(K, sub.id)?.clone();
            elem.cache.init_sub_element(K, sub.id, flags, lifted, quad.get_id(), space.get_element_num_basis(), space.get_num_components(), S);
        }
        Ok(())
    }

    pub fn init_element_cache(&mut self, elem: &mut PhysicalBasisElement<'_, D, S>, quad: &Quadrature<D>) -> Result<(), IgaError>
    {
        self.init_cache::<D>(elem, quad)
    }

    pub fn fill_cache(&self, elem: &mut PhysicalBasisElement<'_, D, S>, sdim: usize, sid: usize) -> Result<(), IgaError>
    {
        let flags = self.get_flags(sdim);
        let PhysicalBasisElement { reference, domain, cache, gradients, hessians, .. } = elem;
        self.reference.fill_cache(reference, sdim, sid)?;
        self.domain.fill_cache(domain, sdim, sid)?;
        let local = reference.get_local_values();
        let n_functions = local.n_functions();
        let n_points = local.n_points();
        gradients.resize(0, 0, S);
        hessians.resize(0, 0, S * S);
        if flags.gradient() || flags.divergence() || flags.hessian()
        {
            let inv_jacobians = domain.get_inv_jacobians(sdim, sid)?;
            gradients.resize(n_functions, n_points, S);
            push_forward_gradients(local, inv_jacobians, gradients);
            if flags.hessian()
            {
                let map_hessians = domain.get_hessians(sdim, sid)?;
                hessians.resize(n_functions, n_points, S * S);
                push_forward_hessians(local, gradients, inv_jacobians, map_hessians, hessians);
            }
        }
        let sub_cache = cache.get_sub_element_mut(sdim, sid).ok_or(IgaError::InvalidArgument("element cache not initialized for this sub-element"))?;
        sub_cache.fill_from_scalar(&local.components, &local.values, gradients, hessians)
    }

    pub fn fill_element_cache(&self, elem: &mut PhysicalBasisElement<'_, D, S>) -> Result<(), IgaError>
    {
        self.fill_cache(elem, D, 0)
    }
}

/// `g_i = sum_a Jinv[a][i] g_ref[a]`.
fn push_forward_gradients<const D: usize, const S: usize>(local: &LocalBasisValues<D>, inv_jacobians: &[[[f64; S]; D]], out: &mut ValueTable)
{
    for f in 0..local.n_functions()
    {
        for (q, inv) in inv_jacobians.iter().enumerate()
        {
            let reference = local.gradients.entry(f, q);
            let entry = out.entry_mut(f, q);
            for i in 0..S
            {
                entry[i] = (0..D).map(|a| inv[a][i] * reference[a]).sum();
            }
        }
    }
}

///
/// `H = Jinv^T (H_ref - sum_k g_k H_F^k) Jinv`, where `H_F^k` is the parametric Hessian of
/// the `k`-th map component and `g` the physical gradient.
///
fn push_forward_hessians<const D: usize, const S: usize>(
    local: &LocalBasisValues<D>,
    gradients: &ValueTable,
    inv_jacobians: &[[[f64; S]; D]],
    map_hessians: &[[[[f64; D]; D]; S]],
    out: &mut ValueTable,
)
{
    for f in 0..local.n_functions()
    {
        for (q, inv) in inv_jacobians.iter().enumerate()
        {
            let reference = local.hessians.entry(f, q);
            let g = gradients.entry(f, q);
            let mut corrected = [[0.0; D]; D];
            for a in 0..D
            {
                for b in 0..D
                {
                    corrected[a][b] = reference[a * D + b] - (0..S).map(|k| g[k] * map_hessians[q][k][a][b]).sum::<f64>();
                }
            }
            let entry = out.entry_mut(f, q);
            for i in 0..S
            {
                for j in 0..S
                {
                    let mut v = 0.0;
                    for a in 0..D
                    {
                        for b in 0..D
                        {
                            v += inv[a][i] * corrected[a][b] * inv[b][j];
                        }
                    }
                    entry[i * S + j] = v;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests
{
    use super::*;
    use crate::basis::bspline::BSpline;
    use crate::basis::reference_basis::ReferenceBasis;
    use crate::basis::spline_space::SplineSpace;
    use crate::functions::ball::BallGridFunction;
    use crate::functions::custom::CustomGridFunction;
    use crate::functions::linear::LinearGridFunction;
    use crate::geometry::domain::Domain;
    use crate::grids::bounding_box::BoundingBox;
    use crate::grids::grid::{Grid, ACTIVE};
    use approx::assert_abs_diff_eq;
    use std::f64::consts::PI;
    use std::rc::Rc;

    const A: [[f64; 2]; 2] = [[2.0, 1.0], [0.0, 3.0]];
    const B: [f64; 2] = [1.0, 0.0];

    fn linear_basis() -> Rc<PhysicalBasis<2, 2>>
    {
        let grid = Grid::<2>::create_uniform(3).unwrap();
        let reference: ReferenceBasis<2> = BSpline::create(SplineSpace::create_scalar(grid.clone(), 2).unwrap()).into();
        let domain = Domain::create(LinearGridFunction::create(grid, A, B));
        PhysicalBasis::create(reference, domain).unwrap()
    }

    #[test]
    fn linear_fields_are_reproduced_with_exact_gradients()
    {
        // quadratic open knots {0,0,0,.5,1,1,1}: Greville abscissae 0, .25, .75, 1
        let greville = [0.0, 0.25, 0.75, 1.0];
        let field = |x: [f64; 2]| 0.5 * x[0] - 2.0 * x[1];
        let coefficients: Vec<f64> = (0..16).map(|g| {
            let xi = [greville[g % 4], greville[g / 4]];
            field([A[0][0] * xi[0] + A[0][1] * xi[1] + B[0], A[1][0] * xi[0] + A[1][1] * xi[1] + B[1]])
        }).collect();
        let basis = linear_basis();
        let mut handler = basis.create_cache_handler();
        handler.set_element_flags(BasisFlags::new().with_value(true).with_gradient(true).with_hessian(true)).unwrap();
        let quad = Quadrature::<2>::gauss_isotropic(3).unwrap();
        let mut elem = basis.begin();
        handler.init_element_cache(&mut elem, &quad).unwrap();
        loop
        {
            handler.fill_element_cache(&mut elem).unwrap();
            let dofs = elem.get_local_to_global(ACTIVE).unwrap();
            let values = elem.get_element_values().unwrap();
            let gradients = elem.get_element_gradients().unwrap();
            let hessians = elem.get_element_hessians().unwrap();
            for (q, x) in elem.get_element_points().unwrap().iter().enumerate()
            {
                let u: f64 = dofs.iter().enumerate().map(|(f, &g)| coefficients[g] * values.entry(f, q)[0]).sum();
                assert_abs_diff_eq!(u, field(*x), epsilon = 1e-12);
                for i in 0..2
                {
                    let du: f64 = dofs.iter().enumerate().map(|(f, &g)| coefficients[g] * gradients.entry(f, q)[i]).sum();
                    assert_abs_diff_eq!(du, [0.5, -2.0][i], epsilon = 1e-12);
                }
                for k in 0..4
                {
                    let ddu: f64 = dofs.iter().enumerate().map(|(f, &g)| coefficients[g] * hessians.entry(f, q)[k]).sum();
                    assert_abs_diff_eq!(ddu, 0.0, epsilon = 1e-10);
                }
            }
            if !elem.next_element()
            {
                break;
            }
        }
    }

    #[test]
    fn mass_matrix_sums_to_physical_area()
    {
        let grid = Grid::<2>::create_from_bbox(&BoundingBox::new([1.0, 0.0], [2.0, 0.5 * PI]), [3, 4]).unwrap();
        let reference: ReferenceBasis<2> = BSpline::create(SplineSpace::create_scalar(grid.clone(), 2).unwrap()).into();
        let domain = Domain::create(BallGridFunction::create(grid));
        let basis = PhysicalBasis::create(reference, domain).unwrap();
        let mut handler = basis.create_cache_handler();
        handler.set_element_flags(BasisFlags::new().with_value(true).with_gradient(true)).unwrap();
        let quad = Quadrature::<2>::gauss_isotropic(4).unwrap();
        let mut elem = basis.begin();
        handler.init_element_cache(&mut elem, &quad).unwrap();
        let mut area = 0.0;
        let mut row_sum = 0.0_f64;
        loop
        {
            handler.fill_element_cache(&mut elem).unwrap();
            area += elem.integrate_u_v(ACTIVE).unwrap().iter().sum::<f64>();
            let k = elem.integrate_gradu_gradv(ACTIVE).unwrap();
            row_sum = row_sum.max(k[..9].iter().sum::<f64>().abs());
            if !elem.next_element()
            {
                break;
            }
        }
        assert_abs_diff_eq!(area, 0.75 * PI, epsilon = 1e-6);
        assert_abs_diff_eq!(row_sum, 0.0, epsilon = 1e-12);
    }

    #[test]
    fn face_values_use_physical_face_measures()
    {
        let basis = linear_basis();
        let mut handler = basis.create_cache_handler();
        handler.set_flags(1, BasisFlags::new().with_value(true)).unwrap();
        let mut elem = basis.begin();
        handler.init_cache(&mut elem, &Quadrature::<1>::gauss_isotropic(3).unwrap()).unwrap();
        // face 2 is y = 0, mapped to the segment from (1, 0) in direction (2, 0)
        handler.fill_cache(&mut elem, 1, 2).unwrap();
        let values = elem.get_values(1, 2).unwrap();
        let w = elem.get_w_measures(1, 2).unwrap();
        let integral: f64 = (0..9).map(|f| (0..3).map(|q| w[q] * values.entry(f, q)[0]).sum::<f64>()).sum();
        assert_abs_diff_eq!(integral, 1.0, epsilon = 1e-13);
        assert_eq!(elem.get_gradients(1, 2).unwrap_err(), IgaError::ValueKindNotRequested);
    }

    #[test]
    fn hessians_include_the_curvature_of_the_map()
    {
        // x = xi_0 + xi_0^2, y = xi_1; the field u = xi_0 is linear in the parameter, so its
        // physical Hessian comes from the second derivatives of the map alone
        let grid = Grid::<2>::create_uniform(3).unwrap();
        let reference: ReferenceBasis<2> = BSpline::create(SplineSpace::create_scalar(grid.clone(), 2).unwrap()).into();
        let map = CustomGridFunction::<2, 2>::create_with_hessian(
            grid,
            |x| [x[0] + x[0] * x[0], x[1]],
            |x| [[1.0 + 2.0 * x[0], 0.0], [0.0, 1.0]],
            |_| [[[2.0, 0.0], [0.0, 0.0]], [[0.0; 2]; 2]],
        );
        let basis = PhysicalBasis::create(reference, Domain::create(map)).unwrap();
        let greville = [0.0, 0.25, 0.75, 1.0];
        let coefficients: Vec<f64> = (0..16).map(|g| greville[g % 4]).collect();
        let mut handler = basis.create_cache_handler();
        handler.set_element_flags(BasisFlags::new().with_value(true).with_gradient(true).with_hessian(true)).unwrap();
        let quad = Quadrature::<2>::gauss_isotropic(3).unwrap();
        let mut elem = basis.begin();
        handler.init_element_cache(&mut elem, &quad).unwrap();
        loop
        {
            handler.fill_element_cache(&mut elem).unwrap();
            let dofs = elem.get_local_to_global(ACTIVE).unwrap();
            let gradients = elem.get_element_gradients().unwrap();
            let hessians = elem.get_element_hessians().unwrap();
            for (q, x) in elem.get_element_points().unwrap().iter().enumerate()
            {
                let xi = 0.5 * ((1.0 + 4.0 * x[0]).sqrt() - 1.0);
                let stretch = 1.0 + 2.0 * xi;
                let du: f64 = dofs.iter().enumerate().map(|(f, &g)| coefficients[g] * gradients.entry(f, q)[0]).sum();
                assert_abs_diff_eq!(du, 1.0 / stretch, epsilon = 1e-12);
                let ddu: Vec<f64> = (0..4).map(|k| dofs.iter().enumerate().map(|(f, &g)| coefficients[g] * hessians.entry(f, q)[k]).sum()).collect();
                assert_abs_diff_eq!(ddu[0], -2.0 / stretch.powi(3), epsilon = 1e-11);
                assert_abs_diff_eq!(ddu[1], 0.0, epsilon = 1e-11);
                assert_abs_diff_eq!(ddu[2], 0.0, epsilon = 1e-11);
                assert_abs_diff_eq!(ddu[3], 0.0, epsilon = 1e-11);
            }
            if !elem.next_element()
            {
                break;
            }
        }
    }
}
