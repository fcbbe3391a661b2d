pub mod domain;
pub mod domain_element;
