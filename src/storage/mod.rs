pub mod paths;
pub mod tables;

pub use paths::*;
pub use tables::*;
