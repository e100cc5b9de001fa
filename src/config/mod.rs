// src/config/mod.rs
pub mod oracle;
pub mod run;

pub use oracle::OracleConfig;
pub use run::{PipelineConfig, RunSize};
