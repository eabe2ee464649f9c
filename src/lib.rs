pub mod checkpoint;
pub mod common;
pub mod config;
pub mod dataset;
pub mod langevin;
pub mod metrics;
pub mod model;
pub mod objective;
pub mod synthesis;
pub mod trainer;
pub mod visualize;
