use std::rc::Rc;

use rustc_hash::FxHashMap;

use crate::errors::IgaError;
use crate::flags::{BasisFlags, ValueKind};
use crate::quadrature::Quadrature;
use crate::utilities::value_table::ValueTable;

///
/// Basis values of one sub-element: per value kind a (function x point) table, the kinds
/// that were requested, the kinds filled for the current element and the quadrature the
/// tables are laid out for (lifted onto the element).
///
#[derive(Clone, Debug)]
pub struct SubElementCache<const D: usize>
{
    requested: BasisFlags,
    filled: BasisFlags,
    quad: Rc<Quadrature<D>>,
    source_quad_id: usize,
    n_components: usize,
    deriv_dim: usize,
    tables: [ValueTable; 4],
}

impl<const D: usize> SubElementCache<D>
{
    fn entry_len(kind: ValueKind, n_components: usize, deriv_dim: usize) -> usize
    {
        match kind
        {
            ValueKind::Value => n_components,
            ValueKind::Gradient => n_components * deriv_dim,
            ValueKind::Hessian => n_components * deriv_dim * deriv_dim,
            ValueKind::Divergence => 1,
        }
    }

    #[inline]
    pub fn get_quadrature(&self) -> &Rc<Quadrature<D>>
    {
        &self.quad
    }

    /// Id of the rule the cache was initialized with, before lifting.
    #[inline]
    pub fn get_source_quadrature_id(&self) -> usize
    {
        self.source_quad_id
    }

    #[inline]
    pub fn requested(&self) -> BasisFlags
    {
        self.requested
    }

    #[inline]
    pub fn filled(&self) -> BasisFlags
    {
        self.filled
    }

    #[inline]
    pub fn n_points(&self) -> usize
    {
        self.quad.get_num_points()
    }

    #[inline]
    pub fn n_components(&self) -> usize
    {
        self.n_components
    }

    /// Dimension derivatives are taken in (`D` for reference, the space dimension for physical values).
    #[inline]
    pub fn deriv_dim(&self) -> usize
    {
        self.deriv_dim
    }

    ///
    /// Table of a requested kind for writing; zeroed and marked filled.
    ///
    pub fn table_for_fill(&mut self, kind: ValueKind) -> Result<&mut ValueTable, IgaError>
    {
        if !self.requested.contains_kind(kind)
        {
            return Err(IgaError::ValueKindNotRequested);
        }
        self.filled = self.filled.with_kind(kind);
        let table = &mut self.tables[kind as usize];
        table.reset();
        Ok(table)
    }

    ///
    /// Fills every requested kind from scalar per-function data: `values` with entry length 1,
    /// `gradients` with entry length `deriv_dim`, `hessians` with `deriv_dim^2`. Function `f`
    /// belongs to component `components[f]` and is zero in all other components.
    ///
    pub fn fill_from_scalar(&mut self, components: &[usize], values: &ValueTable, gradients: &ValueTable, hessians: &ValueTable) -> Result<(), IgaError>
    {
        let k = self.deriv_dim;
        let nc = self.n_components;
        let n_points = self.n_points();
        if self.requested.divergence() && nc != k
        {
            return Err(IgaError::InvalidArgument("divergence needs as many components as derivative directions"));
        }
        if self.requested.value()
        {
            let table = self.table_for_fill(ValueKind::Value)?;
            for (f, &c) in components.iter().enumerate()
            {
                for q in 0..n_points
                {
                    table.entry_mut(f, q)[c] = values.entry(f, q)[0];
                }
            }
        }
        if self.requested.gradient()
        {
            let table = self.table_for_fill(ValueKind::Gradient)?;
            for (f, &c) in components.iter().enumerate()
            {
                for q in 0..n_points
                {
                    table.entry_mut(f, q)[c * k..(c + 1) * k].copy_from_slice(gradients.entry(f, q));
                }
            }
        }
        if self.requested.hessian()
        {
            let table = self.table_for_fill(ValueKind::Hessian)?;
            for (f, &c) in components.iter().enumerate()
            {
                for q in 0..n_points
                {
                    table.entry_mut(f, q)[c * k * k..(c + 1) * k * k].copy_from_slice(hessians.entry(f, q));
                }
            }
        }
        if self.requested.divergence()
        {
            let table = self.table_for_fill(ValueKind::Divergence)?;
            for (f, &c) in components.iter().enumerate()
            {
                for q in 0..n_points
                {
                    table.entry_mut(f, q)[0] = gradients.entry(f, q)[c];
                }
            }
        }
        Ok(())
    }

    pub fn get(&self, kind: ValueKind) -> Result<&ValueTable, IgaError>
    {
        if !self.requested.contains_kind(kind)
        {
            return Err(IgaError::ValueKindNotRequested);
        }
        if !self.filled.contains_kind(kind)
        {
            return Err(IgaError::CacheNotFilled);
        }
        Ok(&self.tables[kind as usize])
    }
}

///
/// Per element cursor storage keyed by `(sub-element dimension, sub-element id)`.
/// Moving the cursor clears the filled state but keeps the tables allocated.
///
#[derive(Clone, Debug, Default)]
pub struct ElementCache<const D: usize>
{
    entries: FxHashMap<(usize, usize), SubElementCache<D>>,
}

impl<const D: usize> ElementCache<D>
{
    pub fn new() -> Self
    {
        Self { entries: FxHashMap::default() }
    }

    ///
    /// Prepare the entry of a sub-element. Storage is reused when the layout is unchanged;
    /// a different quadrature always invalidates the filled state.
    ///
    #[allow(clippy::too_many_arguments)]
    pub fn init_sub_element(&mut self, sdim: usize, sid: usize, flags: BasisFlags, quad: Rc<Quadrature<D>>, source_quad_id: usize, n_functions: usize, n_components: usize, deriv_dim: usize)
    {
        let n_points = quad.get_num_points();
        let entry = self.entries.entry((sdim, sid)).or_insert_with(|| SubElementCache
        {
            requested: BasisFlags::new(),
            filled: BasisFlags::new(),
            quad: quad.clone(),
            source_quad_id,
            n_components,
            deriv_dim,
            tables: Default::default(),
        });
        entry.requested = flags;
        entry.filled = BasisFlags::new();
        entry.quad = quad;
        entry.source_quad_id = source_quad_id;
        entry.n_components = n_components;
        entry.deriv_dim = deriv_dim;
        for kind in ValueKind::ALL
        {
            let table = &mut entry.tables[kind as usize];
            if flags.contains_kind(kind)
            {
                table.resize(n_functions, n_points, SubElementCache::<D>::entry_len(kind, n_components, deriv_dim));
            }
            else
            {
                table.resize(0, 0, 0);
            }
        }
        log::trace!("initialized cache of sub-element ({}, {}) with {} points", sdim, sid, n_points);
    }

    #[inline]
    pub fn get_sub_element(&self, sdim: usize, sid: usize) -> Option<&SubElementCache<D>>
    {
        self.entries.get(&(sdim, sid))
    }

    #[inline]
    pub fn get_sub_element_mut(&mut self, sdim: usize, sid: usize) -> Option<&mut SubElementCache<D>>
    {
        self.entries.get_mut(&(sdim, sid))
    }

    pub fn get(&self, kind: ValueKind, sdim: usize, sid: usize) -> Result<&ValueTable, IgaError>
    {
        self.entries.get(&(sdim, sid)).ok_or(IgaError::ValueKindNotRequested)?.get(kind)
    }

    /// Quadrature of an initialized sub-element.
    pub fn get_quadrature(&self, sdim: usize, sid: usize) -> Result<&Rc<Quadrature<D>>, IgaError>
    {
        self.entries.get(&(sdim, sid)).map(|e| &e.quad).ok_or(IgaError::CacheNotFilled)
    }

    /// Mark every entry unfilled, e.g. after moving to another element.
    pub fn reset_filled(&mut self)
    {
        for entry in self.entries.values_mut()
        {
            entry.filled = BasisFlags::new();
        }
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn read_before_fill_and_unrequested_kinds_fail()
    {
        let mut cache = ElementCache::<2>::new();
        let quad = Rc::new(Quadrature::<2>::gauss_isotropic(2).unwrap());
        let id = quad.get_id();
        cache.init_sub_element(2, 0, BasisFlags::new().with_value(true), quad, id, 9, 1, 2);
        assert_eq!(cache.get(ValueKind::Gradient, 2, 0).unwrap_err(), IgaError::ValueKindNotRequested);
        assert_eq!(cache.get(ValueKind::Value, 2, 0).unwrap_err(), IgaError::CacheNotFilled);
        assert_eq!(cache.get(ValueKind::Value, 1, 0).unwrap_err(), IgaError::ValueKindNotRequested);
        {
            let entry = cache.get_sub_element_mut(2, 0).unwrap();
            let table = entry.table_for_fill(ValueKind::Value).unwrap();
            assert_eq!((table.n_functions(), table.n_points(), table.entry_len()), (9, 4, 1));
            table.entry_mut(3, 1)[0] = 2.5;
            assert!(entry.table_for_fill(ValueKind::Hessian).is_err());
        }
        assert_eq!(cache.get(ValueKind::Value, 2, 0).unwrap().entry(3, 1), &[2.5]);
        cache.reset_filled();
        assert_eq!(cache.get(ValueKind::Value, 2, 0).unwrap_err(), IgaError::CacheNotFilled);
    }

    #[test]
    fn layouts_follow_components_and_derivative_dimension()
    {
        let mut cache = ElementCache::<2>::new();
        let quad = Rc::new(Quadrature::<2>::gauss_isotropic(1).unwrap());
        let id = quad.get_id();
        let flags = BasisFlags::new().with_gradient(true).with_hessian(true).with_divergence(true);
        cache.init_sub_element(2, 0, flags, quad, id, 8, 2, 3);
        let entry = cache.get_sub_element_mut(2, 0).unwrap();
        assert_eq!(entry.table_for_fill(ValueKind::Gradient).unwrap().entry_len(), 6);
        assert_eq!(entry.table_for_fill(ValueKind::Hessian).unwrap().entry_len(), 18);
        assert_eq!(entry.table_for_fill(ValueKind::Divergence).unwrap().entry_len(), 1);
    }

    #[test]
    fn scalar_data_is_scattered_into_its_component()
    {
        let mut cache = ElementCache::<2>::new();
        let quad = Rc::new(Quadrature::<2>::from_points(vec![[0.5, 0.5]]).unwrap());
        let id = quad.get_id();
        let flags = BasisFlags::new().with_value(true).with_gradient(true).with_divergence(true);
        cache.init_sub_element(2, 0, flags, quad, id, 2, 2, 2);
        let mut values = ValueTable::new(2, 1, 1);
        values.entry_mut(0, 0)[0] = 3.0;
        values.entry_mut(1, 0)[0] = 4.0;
        let mut gradients = ValueTable::new(2, 1, 2);
        gradients.entry_mut(0, 0).copy_from_slice(&[1.0, 2.0]);
        gradients.entry_mut(1, 0).copy_from_slice(&[5.0, 6.0]);
        let hessians = ValueTable::new(0, 0, 4);
        cache.get_sub_element_mut(2, 0).unwrap().fill_from_scalar(&[0, 1], &values, &gradients, &hessians).unwrap();
        assert_eq!(cache.get(ValueKind::Value, 2, 0).unwrap().entry(1, 0), &[0.0, 4.0]);
        assert_eq!(cache.get(ValueKind::Gradient, 2, 0).unwrap().entry(1, 0), &[0.0, 0.0, 5.0, 6.0]);
        assert_eq!(cache.get(ValueKind::Divergence, 2, 0).unwrap().entry(0, 0), &[1.0]);
        assert_eq!(cache.get(ValueKind::Divergence, 2, 0).unwrap().entry(1, 0), &[6.0]);
    }
}
