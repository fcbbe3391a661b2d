use indexmap::{IndexMap, IndexSet};

use crate::errors::IgaError;
use crate::grids::grid::ACTIVE;
use crate::grids::unit_element::UnitElement;
use crate::utilities::tensor_index::{TensorIndex, TensorIndexer};

///
/// Numbering of the basis functions (degrees of freedom) of a spline space.
///
/// Components are numbered one after the other; inside a component the numbering follows
/// the tensor index with direction 0 varying fastest. Global ids are the patch ids shifted
/// by `global_offset`, which lets several patches share one global numbering.
///
#[derive(Clone, Debug, PartialEq)]
pub struct DofDistribution<const D: usize>
{
    components: Vec<TensorIndexer<D>>,
    offsets: Vec<usize>,
    periodic: [bool; D],
    n_dofs: usize,
    global_offset: usize,
    properties: IndexMap<String, IndexSet<usize>>,
}

///
/// Dof ids of the basis functions of one element that carry a given property.
///
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ElementDofs
{
    /// Position among the element's local functions.
    pub local: Vec<usize>,
    /// Id inside the space.
    pub patch: Vec<usize>,
    /// Patch id plus the global offset.
    pub global: Vec<usize>,
}

impl<const D: usize> DofDistribution<D>
{
    pub fn new(component_sizes: &[[usize; D]], periodic: [bool; D]) -> Self
    {
        let components: Vec<TensorIndexer<D>> = component_sizes.iter().map(|s| TensorIndexer::new(*s)).collect();
        let mut offsets = Vec::with_capacity(components.len());
        let mut n_dofs = 0;
        for c in components.iter()
        {
            offsets.push(n_dofs);
            n_dofs += c.flat_size();
        }
        let mut properties = IndexMap::new();
        properties.insert(ACTIVE.to_string(), (0..n_dofs).collect());
        Self { components, offsets, periodic, n_dofs, global_offset: 0, properties }
    }

    #[inline]
    pub fn get_num_dofs(&self) -> usize
    {
        self.n_dofs
    }

    #[inline]
    pub fn get_num_components(&self) -> usize
    {
        self.components.len()
    }

    pub fn get_num_dofs_comp(&self, comp: usize) -> Result<usize, IgaError>
    {
        Ok(self.component(comp)?.flat_size())
    }

    pub fn get_num_dofs_comp_dim(&self, comp: usize) -> Result<[usize; D], IgaError>
    {
        Ok(*self.component(comp)?.extents())
    }

    pub fn get_component_offset(&self, comp: usize) -> Result<usize, IgaError>
    {
        self.offsets.get(comp).copied().ok_or(IgaError::IndexOutOfRange { index: comp, extent: self.offsets.len() })
    }

    fn component(&self, comp: usize) -> Result<&TensorIndexer<D>, IgaError>
    {
        self.components.get(comp).ok_or(IgaError::IndexOutOfRange { index: comp, extent: self.components.len() })
    }

    #[inline]
    pub fn get_global_dof_offset(&self) -> usize
    {
        self.global_offset
    }

    pub fn set_global_dof_offset(&mut self, offset: usize)
    {
        self.global_offset = offset;
    }

    /// Patch dof id of a tensor index in a component.
    pub fn get_dof(&self, comp: usize, tensor: &TensorIndex<D>) -> Result<usize, IgaError>
    {
        let indexer = self.component(comp)?;
        Ok(self.offsets[comp] + indexer.tensor_to_flat(tensor)?)
    }

    #[inline]
    pub(crate) fn get_dof_unchecked(&self, comp: usize, tensor: &TensorIndex<D>) -> usize
    {
        self.offsets[comp] + self.components[comp].tensor_to_flat_unchecked(tensor)
    }

    /// Component and tensor index of a patch dof id.
    pub fn get_component_and_tensor(&self, dof: usize) -> Result<(usize, TensorIndex<D>), IgaError>
    {
        if dof >= self.n_dofs
        {
            return Err(IgaError::IndexOutOfRange { index: dof, extent: self.n_dofs });
        }
        let comp = self.offsets.partition_point(|&o| o <= dof) - 1;
        Ok((comp, self.components[comp].flat_to_tensor_unchecked(dof - self.offsets[comp])))
    }

    pub fn add_dofs_property(&mut self, name: &str)
    {
        self.properties.entry(name.to_string()).or_default();
    }

    pub fn set_dof_property(&mut self, name: &str, dof: usize, status: bool) -> Result<(), IgaError>
    {
        if dof >= self.n_dofs
        {
            return Err(IgaError::IndexOutOfRange { index: dof, extent: self.n_dofs });
        }
        let set = self.properties.get_mut(name).ok_or(IgaError::InvalidArgument("unknown dof property"))?;
        if status
        {
            set.insert(dof);
        }
        else
        {
            set.shift_remove(&dof);
        }
        Ok(())
    }

    pub fn dof_has_property(&self, dof: usize, name: &str) -> bool
    {
        self.properties.get(name).is_some_and(|s| s.contains(&dof))
    }

    pub(crate) fn properties(&self) -> impl Iterator<Item = (&str, &IndexSet<usize>)>
    {
        self.properties.iter().map(|(name, set)| (name.as_str(), set))
    }

    pub(crate) fn set_property_dofs(&mut self, name: &str, dofs: IndexSet<usize>)
    {
        self.properties.insert(name.to_string(), dofs);
    }

    pub fn get_dofs_with_property(&self, name: &str) -> Result<Vec<usize>, IgaError>
    {
        let set = self.properties.get(name).ok_or(IgaError::InvalidArgument("unknown dof property"))?;
        let mut dofs: Vec<usize> = set.iter().copied().collect();
        dofs.sort_unstable();
        Ok(dofs)
    }

    ///
    /// Dofs whose function does not vanish on face `face`. Periodic directions have no
    /// boundary and give an empty list.
    ///
    pub fn get_boundary_dofs(&self, face: usize) -> Result<Vec<usize>, IgaError>
    {
        let (dir, side) = UnitElement::<D>::face_direction_and_side(face)?;
        let mut dofs = Vec::new();
        if self.periodic[dir]
        {
            return Ok(dofs);
        }
        for (comp, indexer) in self.components.iter().enumerate()
        {
            let fixed = if side == 0 { 0 } else { indexer.extents()[dir] - 1 };
            dofs.extend(indexer.iter().filter(|t| t[dir] == fixed).map(|t| self.offsets[comp] + indexer.tensor_to_flat_unchecked(&t)));
        }
        Ok(dofs)
    }

    /// Dofs not supported on any (non periodic) boundary face.
    pub fn get_interior_dofs(&self) -> Vec<usize>
    {
        let mut dofs = Vec::new();
        for (comp, indexer) in self.components.iter().enumerate()
        {
            let n = indexer.extents();
            dofs.extend(indexer.iter()
                .filter(|t| (0..D).all(|d| self.periodic[d] || (t[d] > 0 && t[d] + 1 < n[d])))
                .map(|t| self.offsets[comp] + indexer.tensor_to_flat_unchecked(&t)));
        }
        dofs
    }

    ///
    /// Filters the patch dofs of an element (in local order) by a property and returns the
    /// three numbering views.
    ///
    pub fn filter_element_dofs(&self, element_dofs: &[usize], property: &str) -> Result<ElementDofs, IgaError>
    {
        let set = self.properties.get(property).ok_or(IgaError::InvalidArgument("unknown dof property"))?;
        let mut view = ElementDofs::default();
        for (local, &patch) in element_dofs.iter().enumerate()
        {
            if set.contains(&patch)
            {
                view.local.push(local);
                view.patch.push(patch);
                view.global.push(patch + self.global_offset);
            }
        }
        Ok(view)
    }
}

#[test]
fn check_component_major_numbering()
{
    let dofs = DofDistribution::<2>::new(&[[3, 2], [2, 2]], [false, false]);
    assert_eq!(dofs.get_num_dofs(), 10);
    assert_eq!(dofs.get_component_offset(1).unwrap(), 6);
    assert_eq!(dofs.get_dof(0, &[1, 1]).unwrap(), 4);
    assert_eq!(dofs.get_dof(1, &[1, 0]).unwrap(), 7);
    assert_eq!(dofs.get_component_and_tensor(7).unwrap(), (1, [1, 0]));
    assert!(dofs.get_dof(0, &[3, 0]).is_err());
    assert!(dofs.get_component_and_tensor(10).is_err());
}

#[test]
fn check_boundary_and_interior_dofs()
{
    let dofs = DofDistribution::<2>::new(&[[4, 3]], [false, false]);
    assert_eq!(dofs.get_boundary_dofs(0).unwrap(), vec![0, 4, 8]);
    assert_eq!(dofs.get_boundary_dofs(3).unwrap(), vec![8, 9, 10, 11]);
    assert_eq!(dofs.get_interior_dofs(), vec![5, 6]);
    let periodic = DofDistribution::<2>::new(&[[4, 3]], [true, false]);
    assert!(periodic.get_boundary_dofs(1).unwrap().is_empty());
    assert_eq!(periodic.get_interior_dofs(), vec![4, 5, 6, 7]);
}

#[test]
fn check_element_dof_views()
{
    let mut dofs = DofDistribution::<1>::new(&[[5]], [false]);
    dofs.set_global_dof_offset(100);
    dofs.add_dofs_property("dirichlet");
    dofs.set_dof_property("dirichlet", 0, true).unwrap();
    let view = dofs.filter_element_dofs(&[0, 1, 2], ACTIVE).unwrap();
    assert_eq!(view.local, vec![0, 1, 2]);
    assert_eq!(view.global, vec![100, 101, 102]);
    let view = dofs.filter_element_dofs(&[0, 1, 2], "dirichlet").unwrap();
    assert_eq!(view.patch, vec![0]);
    assert!(dofs.filter_element_dofs(&[0], "unknown").is_err());
}
