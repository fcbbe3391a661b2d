pub mod bernstein;
pub mod bernstein_extraction;
pub mod bspline;
pub mod coefficient_refinement;
pub mod dof_distribution;
pub mod element_cache;
pub mod integration;
pub mod nurbs;
pub mod physical_basis;
pub mod physical_element;
pub mod reference_basis;
pub mod reference_element;
pub mod spline_space;
