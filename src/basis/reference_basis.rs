use std::rc::Rc;

use crate::errors::IgaError;
use crate::utilities::value_table::ValueTable;

use super::bernstein::BernsteinTable;
use super::bspline::BSpline;
use super::nurbs::Nurbs;
use super::spline_space::SplineSpace;

///
/// Bernstein polynomials of every component and direction, evaluated at the coordinates of
/// a point set on the unit cube. Shared by all elements.
///
#[derive(Clone, Debug, PartialEq)]
pub struct BernsteinTables<const D: usize>
{
    tables: Vec<[BernsteinTable; D]>,
    n_points: usize,
    max_order: usize,
}

impl<const D: usize> BernsteinTables<D>
{
    pub fn new(degrees: &[[usize; D]], points: &[[f64; D]], max_order: usize) -> Self
    {
        let tables = degrees.iter().map(|p| {
            std::array::from_fn(|d| {
                let coordinates: Vec<f64> = points.iter().map(|x| x[d]).collect();
                BernsteinTable::new(p[d], &coordinates, max_order)
            })
        }).collect();
        Self { tables, n_points: points.len(), max_order }
    }

    #[inline]
    pub fn n_points(&self) -> usize
    {
        self.n_points
    }

    #[inline]
    pub fn max_order(&self) -> usize
    {
        self.max_order
    }

    #[inline]
    pub fn get(&self, comp: usize, dir: usize) -> &BernsteinTable
    {
        &self.tables[comp][dir]
    }
}

///
/// Buffers an evaluation works in, kept between elements.
///
#[derive(Clone, Debug, Default)]
pub(crate) struct EvaluationScratch
{
    /// Univariate B-splines per direction, point and derivative order.
    pub univariate: Vec<f64>,
    pub dofs: Vec<usize>,
    pub weights: Vec<f64>,
}

///
/// Scalar values and parametric derivatives of the functions active on one element.
/// Local functions are ordered component after component, local tensor index with
/// direction 0 fastest; `components[f]` is the component function `f` belongs to.
///
/// Evaluating into an existing value reuses its storage.
///
#[derive(Clone, Debug, Default)]
pub struct LocalBasisValues<const D: usize>
{
    pub components: Vec<usize>,
    pub max_order: usize,
    /// Entry length 1.
    pub values: ValueTable,
    /// Entry length `D`, empty when `max_order < 1`.
    pub gradients: ValueTable,
    /// Entry length `D*D` (row-major), empty when `max_order < 2`.
    pub hessians: ValueTable,
    pub(crate) scratch: EvaluationScratch,
}

impl<const D: usize> LocalBasisValues<D>
{
    /// Shapes the zeroed tables for the current `components`.
    pub(crate) fn set_layout(&mut self, n_points: usize, max_order: usize)
    {
        let n = self.components.len();
        self.max_order = max_order;
        self.values.resize(n, n_points, 1);
        self.gradients.resize(if max_order >= 1 { n } else { 0 }, n_points, D);
        self.hessians.resize(if max_order >= 2 { n } else { 0 }, n_points, D * D);
    }

    #[inline]
    pub fn n_functions(&self) -> usize
    {
        self.components.len()
    }

    #[inline]
    pub fn n_points(&self) -> usize
    {
        self.values.n_points()
    }
}

///
/// What a reference (parametric) basis provides to elements, handlers and grid functions.
///
pub trait BasisCapabilities<const D: usize>
{
    fn get_spline_space(&self) -> &Rc<SplineSpace<D>>;

    fn get_num_basis(&self) -> usize
    {
        self.get_spline_space().get_num_basis()
    }

    fn get_element_num_basis(&self) -> usize
    {
        self.get_spline_space().get_element_num_basis()
    }

    fn get_num_components(&self) -> usize
    {
        self.get_spline_space().get_num_components()
    }

    ///
    /// Values and derivatives up to `max_order` of the element's functions at the points
    /// the tables were built for. Derivatives are taken with respect to the parametric
    /// coordinates.
    ///
    fn evaluate_local_into(&self, element: usize, tables: &BernsteinTables<D>, max_order: usize, out: &mut LocalBasisValues<D>) -> Result<(), IgaError>;

    fn evaluate_local(&self, element: usize, tables: &BernsteinTables<D>, max_order: usize) -> Result<LocalBasisValues<D>, IgaError>
    {
        let mut out = LocalBasisValues::default();
        self.evaluate_local_into(element, tables, max_order, &mut out)?;
        Ok(out)
    }

    ///
    /// Evaluation at arbitrary points of the unit element, outside the cache protocol.
    ///
    fn evaluate_basis_at_points(&self, element: usize, points: &[[f64; D]], max_order: usize) -> Result<LocalBasisValues<D>, IgaError>
    {
        let space = self.get_spline_space();
        let degrees: Vec<[usize; D]> = (0..space.get_num_components()).map(|c| space.get_degree(c)).collect::<Result<_, _>>()?;
        let tables = BernsteinTables::new(&degrees, points, max_order);
        self.evaluate_local(element, &tables, max_order)
    }
}

///
/// The reference bases available for elements and physical spaces.
///
#[derive(Clone, Debug)]
pub enum ReferenceBasis<const D: usize>
{
    BSpline(Rc<BSpline<D>>),
    Nurbs(Rc<Nurbs<D>>),
}

impl<const D: usize> ReferenceBasis<D>
{
    pub fn is_nurbs(&self) -> bool
    {
        matches!(self, ReferenceBasis::Nurbs(_))
    }

    /// The underlying B-spline basis (itself, or the one a NURBS basis is built on).
    pub fn get_bspline(&self) -> &Rc<BSpline<D>>
    {
        match self
        {
            ReferenceBasis::BSpline(b) => b,
            ReferenceBasis::Nurbs(n) => n.get_bspline(),
        }
    }
}

impl<const D: usize> BasisCapabilities<D> for ReferenceBasis<D>
{
    fn get_spline_space(&self) -> &Rc<SplineSpace<D>>
    {
        match self
        {
            ReferenceBasis::BSpline(b) => b.get_spline_space(),
            ReferenceBasis::Nurbs(n) => n.get_spline_space(),
        }
    }

    fn evaluate_local_into(&self, element: usize, tables: &BernsteinTables<D>, max_order: usize, out: &mut LocalBasisValues<D>) -> Result<(), IgaError>
    {
        match self
        {
            ReferenceBasis::BSpline(b) => b.evaluate_local_into(element, tables, max_order, out),
            ReferenceBasis::Nurbs(n) => n.evaluate_local_into(element, tables, max_order, out),
        }
    }
}

impl<const D: usize> From<Rc<BSpline<D>>> for ReferenceBasis<D>
{
    fn from(value: Rc<BSpline<D>>) -> Self
    {
        ReferenceBasis::BSpline(value)
    }
}

impl<const D: usize> From<Rc<Nurbs<D>>> for ReferenceBasis<D>
{
    fn from(value: Rc<Nurbs<D>>) -> Self
    {
        ReferenceBasis::Nurbs(value)
    }
}
