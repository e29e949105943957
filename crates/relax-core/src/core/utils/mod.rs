pub mod bounds;
pub mod geometry;
pub mod identifiers;
