// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod candidate;
pub mod config;
pub mod fetch;
pub mod history;
pub mod ingest;
pub mod metrics;
pub mod oracle;
pub mod pipeline;
pub mod readiness;
pub mod scoring;
pub mod select;
pub mod store;

// ---- Re-exports for stable public API ----
pub use crate::candidate::{Bucket, Candidate, RawCandidate};
pub use crate::config::{OracleConfig, PipelineConfig, RunSize};
pub use crate::pipeline::{Pipeline, RunReport};
pub use crate::scoring::{Judgment, ScorePass, ScoringAdapter, SubScores};
pub use crate::select::{Disposition, RejectStage, SelectionEngine, SelectionOutcome};
pub use crate::store::{SelectionRecord, SelectionRole, SelectionSink, SinkError};
