//! Spatial statistics for the hex population grid.
//!
//! Pure computation only: nothing here touches the database. The pipeline
//! loads geometries and values, builds one [`ContiguityGraph`] per run and
//! feeds it to [`local_g`] once per attribute.

pub mod contiguity;
pub mod gistar;

pub use contiguity::ContiguityGraph;
pub use gistar::{local_g, GiConfig, LocalStatistic};
