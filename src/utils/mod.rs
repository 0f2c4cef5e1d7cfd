pub mod evaluation;
pub mod stats;
pub mod synthetic;
