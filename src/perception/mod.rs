pub mod scaling;
pub mod screenshot;
pub mod types;
