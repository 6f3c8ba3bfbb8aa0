//! Offline batch job: load the grid, build queen contiguity once, compute
//! local G statistics for every attribute and write them back in one
//! transaction.

pub mod pipeline;
pub mod traits;

pub use pipeline::{compute_results, Computation, Pipeline, PipelineReport, PipelineSettings};
pub use traits::{HexStore, PgHexStore};
