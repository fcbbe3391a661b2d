//! Isogeometric analysis: B-spline and NURBS bases on tensor-product grids, mapped to
//! physical domains and evaluated at quadrature points element by element.

pub mod basis;
pub mod errors;
pub mod flags;
pub mod functions;
pub mod geometry;
pub mod grids;
pub mod quadrature;
pub mod serialization;
pub mod utilities;
