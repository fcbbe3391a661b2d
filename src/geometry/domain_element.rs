use std::rc::Rc;

use rustc_hash::FxHashMap;

use crate::errors::IgaError;
use crate::flags::DomainFlags;
use crate::functions::{GridFunctionValues, Hessian, Jacobian};
use crate::grids::grid_element::GridElement;
use crate::grids::unit_element::UnitElement;
use crate::quadrature::Quadrature;
use crate::utilities::linalg::{gram_measure, pseudo_inverse, DEGENERACY_TOLERANCE};

use super::domain::Domain;

///
/// Geometric quantities of one sub-element at the points of its quadrature.
///
#[derive(Clone, Debug)]
pub struct DomainSubElementCache<const D: usize, const S: usize>
{
    flags: DomainFlags,
    filled: bool,
    quad: Rc<Quadrature<D>>,
    source_quad_id: usize,
    values: GridFunctionValues<D, S>,
    measures: Vec<f64>,
    w_measures: Vec<f64>,
    inv_jacobians: Vec<[[f64; S]; D]>,
    ext_normals: Vec<[f64; S]>,
}

impl<const D: usize, const S: usize> DomainSubElementCache<D, S>
{
    fn new(flags: DomainFlags, quad: Rc<Quadrature<D>>, source_quad_id: usize) -> Self
    {
        Self
        {
            flags,
            filled: false,
            quad,
            source_quad_id,
            values: GridFunctionValues::default(),
            measures: Vec::new(),
            w_measures: Vec::new(),
            inv_jacobians: Vec::new(),
            ext_normals: Vec::new(),
        }
    }

    fn clear(&mut self)
    {
        self.filled = false;
        self.values.clear();
        self.measures.clear();
        self.w_measures.clear();
        self.inv_jacobians.clear();
        self.ext_normals.clear();
    }

    #[inline]
    pub fn get_quadrature(&self) -> &Rc<Quadrature<D>>
    {
        &self.quad
    }

    #[inline]
    pub fn get_flags(&self) -> DomainFlags
    {
        self.flags
    }

    fn check(&self, requested: bool) -> Result<(), IgaError>
    {
        if !requested
        {
            return Err(IgaError::ValueKindNotRequested);
        }
        if !self.filled
        {
            return Err(IgaError::CacheNotFilled);
        }
        Ok(())
    }
}

///
/// Cursor over the elements of a domain with a private cache of geometric quantities.
///
#[derive(Clone, Debug)]
pub struct DomainElement<'a, const D: usize, const S: usize>
{
    domain: &'a Domain<D, S>,
    grid_element: GridElement<'a, D>,
    cache: FxHashMap<(usize, usize), DomainSubElementCache<D, S>>,
}

impl<'a, const D: usize, const S: usize> DomainElement<'a, D, S>
{
    pub(crate) fn new(domain: &'a Domain<D, S>, grid_element: GridElement<'a, D>) -> Self
    {
        Self { domain, grid_element, cache: FxHashMap::default() }
    }

    #[inline]
    pub fn get_domain(&self) -> &'a Domain<D, S>
    {
        self.domain
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

    fn reset_filled(&mut self)
    {
        for entry in self.cache.values_mut()
        {
            entry.filled = false;
        }
    }

    pub fn move_to(&mut self, flat: usize) -> Result<(), IgaError>
    {
        self.grid_element.move_to(flat)?;
        self.reset_filled();
        Ok(())
    }

    pub fn next_element(&mut self) -> bool
    {
        let moved = self.grid_element.next_element();
        if moved
        {
            self.reset_filled();
        }
        moved
    }

    fn sub_element(&self, sdim: usize, sid: usize) -> Result<&DomainSubElementCache<D, S>, IgaError>
    {
        self.cache.get(&(sdim, sid)).ok_or(IgaError::ValueKindNotRequested)
    }

    pub fn get_points(&self, sdim: usize, sid: usize) -> Result<&[[f64; S]], IgaError>
    {
        let c = self.sub_element(sdim, sid)?;
        c.check(c.flags.point())?;
        Ok(&c.values.values)
    }

    pub fn get_jacobians(&self, sdim: usize, sid: usize) -> Result<&[Jacobian<D, S>], IgaError>
    {
        let c = self.sub_element(sdim, sid)?;
        c.check(c.flags.jacobian())?;
        Ok(&c.values.jacobians)
    }

    pub fn get_hessians(&self, sdim: usize, sid: usize) -> Result<&[Hessian<D, S>], IgaError>
    {
        let c = self.sub_element(sdim, sid)?;
        c.check(c.flags.hessian())?;
        Ok(&c.values.hessians)
    }

    /// `|det J|` for the element itself, the Gram determinant root on sub-elements.
    pub fn get_measures(&self, sdim: usize, sid: usize) -> Result<&[f64], IgaError>
    {
        let c = self.sub_element(sdim, sid)?;
        c.check(c.flags.measure())?;
        Ok(&c.measures)
    }

    /// Measures times the quadrature weights scaled to the parametric sub-element.
    pub fn get_w_measures(&self, sdim: usize, sid: usize) -> Result<&[f64], IgaError>
    {
        let c = self.sub_element(sdim, sid)?;
        c.check(c.flags.w_measure())?;
        Ok(&c.w_measures)
    }

    /// (Pseudo-)inverses of the Jacobians, `D x S`.
    pub fn get_inv_jacobians(&self, sdim: usize, sid: usize) -> Result<&[[[f64; S]; D]], IgaError>
    {
        let c = self.sub_element(sdim, sid)?;
        c.check(c.flags.inv_jacobian())?;
        Ok(&c.inv_jacobians)
    }

    /// Outer unit normals on face `face`.
    pub fn get_boundary_normals(&self, face: usize) -> Result<&[[f64; S]], IgaError>
    {
        let c = self.sub_element(D.saturating_sub(1), face)?;
        c.check(c.flags.ext_normal())?;
        Ok(&c.ext_normals)
    }

    pub fn get_element_points(&self) -> Result<&[[f64; S]], IgaError>
    {
        self.get_points(D, 0)
    }

    pub fn get_element_jacobians(&self) -> Result<&[Jacobian<D, S>], IgaError>
    {
        self.get_jacobians(D, 0)
    }

    pub fn get_element_measures(&self) -> Result<&[f64], IgaError>
    {
        self.get_measures(D, 0)
    }

    pub fn get_element_w_measures(&self) -> Result<&[f64], IgaError>
    {
        self.get_w_measures(D, 0)
    }

    pub fn get_element_inv_jacobians(&self) -> Result<&[[[f64; S]; D]], IgaError>
    {
        self.get_inv_jacobians(D, 0)
    }
}

///
/// Fills domain element caches. Flags are set per sub-element dimension and completed
/// with the quantities they depend on.
///
#[derive(Clone, Debug)]
pub struct DomainHandler<'a, const D: usize, const S: usize>
{
    domain: &'a Domain<D, S>,
    flags: FxHashMap<usize, DomainFlags>,
    lifted: FxHashMap<(usize, usize), (usize, Rc<Quadrature<D>>)>,
}

impl<'a, const D: usize, const S: usize> DomainHandler<'a, D, S>
{
    pub(crate) fn new(domain: &'a Domain<D, S>) -> Self
    {
        Self { domain, flags: FxHashMap::default(), lifted: FxHashMap::default() }
    }

    #[inline]
    pub fn get_domain(&self) -> &'a Domain<D, S>
    {
        self.domain
    }

    pub fn set_flags(&mut self, sdim: usize, flags: DomainFlags) -> Result<(), IgaError>
    {
        if sdim > D
        {
            return Err(IgaError::InvalidArgument("sub-element dimension exceeds the element dimension"));
        }
        if flags.ext_normal() && sdim + 1 != D
        {
            return Err(IgaError::InvalidArgument("outer normals are only defined on faces"));
        }
        let merged = self.get_flags(sdim).union(flags).with_dependencies();
        self.flags.insert(sdim, merged);
        Ok(())
    }

    pub fn set_element_flags(&mut self, flags: DomainFlags) -> Result<(), IgaError>
    {
        self.set_flags(D, flags)
    }

    pub fn get_flags(&self, sdim: usize) -> DomainFlags
    {
        self.flags.get(&sdim).copied().unwrap_or_default()
    }

    /// Prepares the caches of all `K`-dimensional sub-elements of `elem` for `quad`.
    pub fn init_cache<const K: usize>(&mut self, elem: &mut DomainElement<'_, D, S>, quad: &Quadrature<K>) -> Result<(), IgaError>
    {
        let flags = self.get_flags(K);
        for sub in UnitElement::<D>::sub_elements(K)?
        {
            let key = (K, sub.id);
            let reusable = self.lifted.get(&key).is_some_and(|(id, _)| *id == quad.get_id());
            if !reusable
            {
                self.lifted.insert(key, (quad.get_id(), Rc::new(quad.collapse_to_sub_element::<D>(&sub)?)));
            }
            let lifted = self.lifted[&key].1.clone();
            let entry = elem.cache.entry(key).or_insert_with(|| DomainSubElementCache::new(flags, lifted.clone(), quad.get_id()));
            entry.clear();
            entry.flags = flags;
            entry.quad = lifted;
            entry.source_quad_id = quad.get_id();
        }
        log::trace!("initialized domain cache of {}-dimensional sub-elements", K);
        Ok(())
    }

    pub fn init_element_cache(&mut self, elem: &mut DomainElement<'_, D, S>, quad: &Quadrature<D>) -> Result<(), IgaError>
    {
        self.init_cache::<D>(elem, quad)
    }

    /// Computes the requested quantities on sub-element `(sdim, sid)` of the current element.
    pub fn fill_cache(&self, elem: &mut DomainElement<'_, D, S>, sdim: usize, sid: usize) -> Result<(), IgaError>
    {
        let (source_id, _) = self.lifted.get(&(sdim, sid)).ok_or(IgaError::InvalidArgument("cache handler not initialized for this sub-element"))?;
        let index = elem.get_index();
        let bbox = elem.grid_element.get_bounding_box()?;
        let entry = elem.cache.get_mut(&(sdim, sid)).ok_or(IgaError::InvalidArgument("element cache not initialized for this sub-element"))?;
        if entry.source_quad_id != *source_id
        {
            return Err(IgaError::InvalidArgument("element cache was initialized with another quadrature"));
        }
        let flags = entry.flags;
        entry.clear();
        let order = if flags.hessian() { 2 } else if flags.jacobian() { 1 } else { 0 };
        let DomainSubElementCache { quad, values, measures, w_measures, inv_jacobians, ext_normals, .. } = entry;
        self.domain.get_grid_function().evaluate_into(index, quad.get_points(), order, values)?;
        if flags.measure() || flags.inv_jacobian()
        {
            let sub = UnitElement::<D>::sub_element(sdim, sid)?;
            let active = &sub.active_directions;
            for jac in &values.jacobians
            {
                if sdim == D || flags.inv_jacobian()
                {
                    let (inv, measure) = pseudo_inverse(jac)?;
                    if flags.inv_jacobian()
                    {
                        inv_jacobians.push(inv);
                    }
                    if sdim == D && flags.measure()
                    {
                        measures.push(measure);
                    }
                }
                if sdim < D && flags.measure()
                {
                    let columns: [[f64; S]; D] = std::array::from_fn(|k| match active.get(k)
                    {
                        Some(&a) => std::array::from_fn(|i| jac[i][a]),
                        None => [0.0; S],
                    });
                    let refs: [&[f64]; D] = std::array::from_fn(|k| columns[k].as_slice());
                    let measure = gram_measure(&refs[..sdim]);
                    let scale = columns[..sdim].iter().flatten().fold(0.0_f64, |acc, v| acc.max(v.abs()));
                    if sdim > 0 && (scale == 0.0 || measure <= DEGENERACY_TOLERANCE * scale.powi(sdim as i32))
                    {
                        return Err(IgaError::DegenerateMapping { determinant: measure });
                    }
                    measures.push(measure);
                }
            }
        }
        if flags.w_measure()
        {
            let scale = quad.dilation_scale(&bbox);
            w_measures.extend(quad.get_weights()?.iter().zip(measures.iter()).map(|(w, m)| w * scale * m));
        }
        if flags.ext_normal()
        {
            let reference = UnitElement::<D>::face_normal(sid)?;
            for inv in inv_jacobians.iter()
            {
                let mut n: [f64; S] = std::array::from_fn(|i| (0..D).map(|a| inv[a][i] * reference[a]).sum());
                let norm = n.iter().map(|v| v * v).sum::<f64>().sqrt();
                n.iter_mut().for_each(|v| *v /= norm);
                ext_normals.push(n);
            }
        }
        entry.filled = true;
        Ok(())
    }

    pub fn fill_element_cache(&self, elem: &mut DomainElement<'_, D, S>) -> Result<(), IgaError>
    {
        self.fill_cache(elem, D, 0)
    }
}

#[cfg(test)]
mod tests
{
    use super::*;
    use crate::functions::ball::BallGridFunction;
    use crate::functions::identity::IdentityGridFunction;
    use crate::functions::linear::LinearGridFunction;
    use crate::grids::bounding_box::BoundingBox;
    use crate::grids::grid::Grid;
    use approx::assert_abs_diff_eq;
    use std::f64::consts::PI;

    #[test]
    fn identity_measures_add_up_to_the_grid_volume()
    {
        let grid = Grid::<2>::create_from_knots([vec![0.0, 0.5, 2.0], vec![1.0, 1.5, 2.0, 4.0]]).unwrap();
        let domain = Domain::create(IdentityGridFunction::create(grid));
        let mut handler = domain.create_cache_handler();
        handler.set_element_flags(DomainFlags::new().with_w_measure(true).with_point(true)).unwrap();
        let quad = Quadrature::<2>::gauss_isotropic(2).unwrap();
        let mut elem = domain.begin();
        handler.init_element_cache(&mut elem, &quad).unwrap();
        let mut volume = 0.0;
        loop
        {
            handler.fill_element_cache(&mut elem).unwrap();
            volume += elem.get_element_w_measures().unwrap().iter().sum::<f64>();
            for m in elem.get_element_measures().unwrap()
            {
                assert_abs_diff_eq!(*m, 1.0, epsilon = 1e-14);
            }
            if !elem.next_element()
            {
                break;
            }
        }
        assert_abs_diff_eq!(volume, 6.0, epsilon = 1e-13);
        assert_eq!(elem.get_element_inv_jacobians().unwrap_err(), IgaError::ValueKindNotRequested);
    }

    #[test]
    fn refilling_keeps_the_cache_storage()
    {
        let grid = Grid::<2>::create_uniform(4).unwrap();
        let domain = Domain::create(LinearGridFunction::create(grid, [[2.0, 1.0], [0.0, 3.0]], [1.0, 0.0]));
        let mut handler = domain.create_cache_handler();
        handler.set_element_flags(DomainFlags::new().with_w_measure(true).with_point(true).with_inv_jacobian(true)).unwrap();
        let quad = Quadrature::<2>::gauss_isotropic(3).unwrap();
        let mut elem = domain.begin();
        handler.init_element_cache(&mut elem, &quad).unwrap();
        handler.fill_element_cache(&mut elem).unwrap();
        let storage = (elem.get_element_points().unwrap().as_ptr(), elem.get_element_w_measures().unwrap().as_ptr(), elem.get_element_inv_jacobians().unwrap().as_ptr());
        while elem.next_element()
        {
            handler.fill_element_cache(&mut elem).unwrap();
            assert_eq!(storage, (elem.get_element_points().unwrap().as_ptr(), elem.get_element_w_measures().unwrap().as_ptr(), elem.get_element_inv_jacobians().unwrap().as_ptr()));
            assert_eq!(elem.get_element_points().unwrap().len(), 9);
            // det A times the element area
            assert_abs_diff_eq!(elem.get_element_w_measures().unwrap().iter().sum::<f64>(), 6.0 / 9.0, epsilon = 1e-13);
        }
    }

    #[test]
    fn annulus_area_and_outer_normals()
    {
        let bbox = BoundingBox::new([1.0, 0.0], [2.0, 0.5 * PI]);
        let grid = Grid::<2>::create_from_bbox(&bbox, [3, 5]).unwrap();
        let domain = Domain::create(BallGridFunction::create(grid));
        let mut handler = domain.create_cache_handler();
        handler.set_element_flags(DomainFlags::new().with_w_measure(true)).unwrap();
        handler.set_flags(1, DomainFlags::new().with_ext_normal(true).with_point(true).with_w_measure(true)).unwrap();
        let quad = Quadrature::<2>::gauss_isotropic(4).unwrap();
        let face_quad = Quadrature::<1>::gauss_isotropic(4).unwrap();
        let mut elem = domain.begin();
        handler.init_element_cache(&mut elem, &quad).unwrap();
        handler.init_cache(&mut elem, &face_quad).unwrap();
        let mut area = 0.0;
        let mut outer_arc = 0.0;
        loop
        {
            handler.fill_element_cache(&mut elem).unwrap();
            area += elem.get_element_w_measures().unwrap().iter().sum::<f64>();
            // face 1 is r = upper end of the element
            if elem.get_grid_element().is_boundary_face(1).unwrap()
            {
                handler.fill_cache(&mut elem, 1, 1).unwrap();
                outer_arc += elem.get_w_measures(1, 1).unwrap().iter().sum::<f64>();
                let points = elem.get_points(1, 1).unwrap();
                for (p, n) in points.iter().zip(elem.get_boundary_normals(1).unwrap())
                {
                    assert_abs_diff_eq!(n[0], p[0] / 2.0, epsilon = 1e-12);
                    assert_abs_diff_eq!(n[1], p[1] / 2.0, epsilon = 1e-12);
                }
            }
            if !elem.next_element()
            {
                break;
            }
        }
        // quarter annulus between radii 1 and 2, outer arc of radius 2
        assert_abs_diff_eq!(area, 0.75 * PI, epsilon = 1e-6);
        assert_abs_diff_eq!(outer_arc, PI, epsilon = 1e-6);
    }

    #[test]
    fn degenerate_map_is_reported()
    {
        let grid = Grid::<2>::create_uniform(2).unwrap();
        let domain = Domain::create(LinearGridFunction::create(grid, [[1.0, 2.0], [2.0, 4.0]], [0.0, 0.0]));
        let mut handler = domain.create_cache_handler();
        handler.set_element_flags(DomainFlags::new().with_measure(true)).unwrap();
        let mut elem = domain.begin();
        handler.init_element_cache(&mut elem, &Quadrature::<2>::gauss_isotropic(1).unwrap()).unwrap();
        assert!(matches!(handler.fill_element_cache(&mut elem), Err(IgaError::DegenerateMapping { .. })));
    }

    #[test]
    fn face_domain_measures_surface()
    {
        // the plane z = x + y over [0,1]^2, face 0 (x = 0) is the line (0, t, t)
        let grid = Grid::<2>::create_uniform(3).unwrap();
        let domain = Domain::create(LinearGridFunction::create(grid, [[1.0, 0.0], [0.0, 1.0], [1.0, 1.0]], [0.0; 3]));
        let face = domain.get_face_domain::<1>(0).unwrap();
        let mut handler = face.create_cache_handler();
        handler.set_element_flags(DomainFlags::new().with_w_measure(true)).unwrap();
        let mut elem = face.begin();
        handler.init_element_cache(&mut elem, &Quadrature::<1>::gauss_isotropic(2).unwrap()).unwrap();
        let mut length = 0.0;
        loop
        {
            handler.fill_element_cache(&mut elem).unwrap();
            length += elem.get_element_w_measures().unwrap().iter().sum::<f64>();
            if !elem.next_element()
            {
                break;
            }
        }
        assert_abs_diff_eq!(length, 2.0_f64.sqrt(), epsilon = 1e-14);
        let p = face.evaluate_at_points(1, &[[0.0]]).unwrap();
        assert_eq!(p, vec![[0.0, 0.5, 0.5]]);
    }
}
