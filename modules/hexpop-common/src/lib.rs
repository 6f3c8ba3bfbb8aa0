pub mod config;
pub mod error;
pub mod types;

pub use config::{Config, ContiguityMode, NullAgePolicy};
pub use error::HexPopError;
pub use types::*;
