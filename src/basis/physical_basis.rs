use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::errors::IgaError;
use crate::geometry::domain::Domain;
use crate::utilities::next_object_id;

use super::reference_basis::{BasisCapabilities, ReferenceBasis};
use super::spline_space::SplineSpace;

///
/// How reference quantities are mapped to the physical domain.
///
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Transformation
{
    /// Scalar and vector fields whose gradients transform covariantly.
    #[default]
    HGrad,
    HDiv,
    HCurl,
    L2,
}

///
/// A reference basis pushed forward through the map of a domain defined on the same grid.
///
#[derive(Debug)]
pub struct PhysicalBasis<const D: usize, const S: usize>
{
    object_id: usize,
    reference: ReferenceBasis<D>,
    domain: Rc<Domain<D, S>>,
    transformation: Transformation,
}

impl<const D: usize, const S: usize> PhysicalBasis<D, S>
{
    pub fn create(reference: ReferenceBasis<D>, domain: Rc<Domain<D, S>>) -> Result<Rc<Self>, IgaError>
    {
        Self::create_with_transformation(reference, domain, Transformation::HGrad)
    }

    pub fn create_with_transformation(reference: ReferenceBasis<D>, domain: Rc<Domain<D, S>>, transformation: Transformation) -> Result<Rc<Self>, IgaError>
    {
        match transformation
        {
            Transformation::HGrad => {}
            Transformation::HDiv => return Err(IgaError::NotImplemented("h_div transformation")),
            Transformation::HCurl => return Err(IgaError::NotImplemented("h_curl transformation")),
            Transformation::L2 => return Err(IgaError::NotImplemented("l_2 transformation")),
        }
        if !Rc::ptr_eq(reference.get_spline_space().get_grid(), domain.get_grid())
        {
            return Err(IgaError::InvalidArgument("basis and domain must be defined on the same grid"));
        }
        let basis = Self { object_id: next_object_id(), reference, domain, transformation };
        log::debug!("created physical basis {} on domain {}", basis.object_id, basis.domain.get_object_id());
        Ok(Rc::new(basis))
    }

    #[inline]
    pub fn get_object_id(&self) -> usize
    {
        self.object_id
    }

    #[inline]
    pub fn get_reference_basis(&self) -> &ReferenceBasis<D>
    {
        &self.reference
    }

    #[inline]
    pub fn get_domain(&self) -> &Rc<Domain<D, S>>
    {
        &self.domain
    }

    #[inline]
    pub fn get_transformation(&self) -> Transformation
    {
        self.transformation
    }

    #[inline]
    pub fn get_spline_space(&self) -> &Rc<SplineSpace<D>>
    {
        self.reference.get_spline_space()
    }

    #[inline]
    pub fn get_num_basis(&self) -> usize
    {
        self.reference.get_num_basis()
    }
}

#[cfg(test)]
mod tests
{
    use super::*;
    use crate::basis::bspline::BSpline;
    use crate::functions::identity::IdentityGridFunction;
    use crate::grids::grid::Grid;

    #[test]
    fn only_h_grad_is_available()
    {
        let grid = Grid::<2>::create_uniform(3).unwrap();
        let basis: ReferenceBasis<2> = BSpline::create(SplineSpace::create_scalar(grid.clone(), 1).unwrap()).into();
        let domain = Domain::create(IdentityGridFunction::create(grid));
        let err = PhysicalBasis::create_with_transformation(basis.clone(), domain.clone(), Transformation::HDiv).unwrap_err();
        assert_eq!(err, IgaError::NotImplemented("h_div transformation"));
        let physical = PhysicalBasis::create(basis, domain).unwrap();
        assert_eq!(physical.get_transformation(), Transformation::HGrad);
        assert_eq!(physical.get_num_basis(), 9);
    }

    #[test]
    fn grids_must_match()
    {
        let basis: ReferenceBasis<1> = BSpline::create(SplineSpace::create_scalar(Grid::<1>::create_uniform(3).unwrap(), 2).unwrap()).into();
        let domain = Domain::create(IdentityGridFunction::create(Grid::<1>::create_uniform(3).unwrap()));
        assert!(matches!(PhysicalBasis::create(basis, domain), Err(IgaError::InvalidArgument(_))));
    }
}
