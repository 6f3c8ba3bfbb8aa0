use thiserror::Error;

#[derive(Error, Debug)]
pub enum HexPopError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Graph construction error: {0}")]
    GraphConstruction(String),

    #[error("Degenerate input: {0}")]
    DegenerateInput(String),

    #[error("{count} rows have no age data at all")]
    MissingAgeData { count: usize },

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Query error: {0}")]
    Query(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

pub type Result<T, E = HexPopError> = std::result::Result<T, E>;
