pub mod probe;
pub mod registry;
