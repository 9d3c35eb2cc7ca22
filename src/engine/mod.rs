pub mod coordinator;
pub mod flight;
pub mod interpolation;
