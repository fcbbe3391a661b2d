pub mod bounding_box;
pub mod grid;
pub mod grid_element;
pub mod refinement_signal;
pub mod unit_element;
