pub mod config;
pub mod task;
pub mod types;

pub use types::*;
