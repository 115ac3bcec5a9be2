pub mod dataset;
pub mod system;
