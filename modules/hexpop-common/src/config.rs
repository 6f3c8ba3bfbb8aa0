use std::env;
use std::fmt;
use std::str::FromStr;

use crate::error::{HexPopError, Result};

const DEFAULT_ALLOWED_ORIGINS: &[&str] = &[
    "http://localhost:3000",
    "https://mini-project-web-map-umber.vercel.app",
];

/// Permutation count used when `GISTAR_PERMUTATIONS` is not set.
pub const DEFAULT_PERMUTATIONS: usize = 999;

/// How two cells are decided to be queen neighbours.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ContiguityMode {
    /// Cells sharing at least one exact vertex coordinate.
    #[default]
    Vertex,
    /// Cells whose geometries touch anywhere, including T-junctions.
    Geometric,
}

impl FromStr for ContiguityMode {
    type Err = HexPopError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "vertex" => Ok(Self::Vertex),
            "geometric" => Ok(Self::Geometric),
            other => Err(HexPopError::Config(format!(
                "CONTIGUITY_MODE must be 'vertex' or 'geometric', got '{other}'"
            ))),
        }
    }
}

impl fmt::Display for ContiguityMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Vertex => write!(f, "vertex"),
            Self::Geometric => write!(f, "geometric"),
        }
    }
}

/// What the pipeline does with rows whose four age bands are all null.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NullAgePolicy {
    /// Count them as zero population and log a warning.
    #[default]
    Zero,
    /// Leave them out of the statistical frame; their results are written as NULL.
    Exclude,
    /// Abort the run before anything is written.
    Error,
}

impl FromStr for NullAgePolicy {
    type Err = HexPopError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "zero" => Ok(Self::Zero),
            "exclude" => Ok(Self::Exclude),
            "error" => Ok(Self::Error),
            other => Err(HexPopError::Config(format!(
                "NULL_AGE_POLICY must be 'zero', 'exclude' or 'error', got '{other}'"
            ))),
        }
    }
}

impl fmt::Display for NullAgePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Zero => write!(f, "zero"),
            Self::Exclude => write!(f, "exclude"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    // Postgres
    pub pg_user: String,
    pub pg_password: String,
    pub pg_host: String,
    pub pg_port: u16,
    pub pg_db: String,

    // Web server
    pub api_host: String,
    pub api_port: u16,
    pub cors_allowed_origins: Vec<String>,

    // Statistics
    pub permutations: usize,
    pub seed: Option<u64>,
    pub star: bool,
    pub contiguity_mode: ContiguityMode,
    pub null_age_policy: NullAgePolicy,
}

impl Config {
    /// Load configuration from the process environment (and `.env`, if present).
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| -> Result<String> {
            lookup(key)
                .filter(|v| !v.is_empty())
                .ok_or_else(|| HexPopError::Config(format!("{key} environment variable is required")))
        };

        let cors_allowed_origins = match lookup("CORS_ALLOWED_ORIGINS") {
            Some(raw) => raw
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            None => DEFAULT_ALLOWED_ORIGINS.iter().map(|s| s.to_string()).collect(),
        };

        let permutations = parse_or(&lookup, "GISTAR_PERMUTATIONS", DEFAULT_PERMUTATIONS)?;
        if permutations == 0 {
            return Err(HexPopError::Config(
                "GISTAR_PERMUTATIONS must be at least 1".to_string(),
            ));
        }

        Ok(Self {
            pg_user: required("PG_USER")?,
            pg_password: required("PG_PASSWORD")?,
            pg_host: required("PG_HOST")?,
            pg_port: parse_required(&lookup, "PG_PORT")?,
            pg_db: required("PG_DB")?,
            api_host: lookup("API_HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            api_port: parse_or(&lookup, "API_PORT", 8000)?,
            cors_allowed_origins,
            permutations,
            seed: lookup("GISTAR_SEED")
                .map(|v| parse_value::<u64>("GISTAR_SEED", &v))
                .transpose()?,
            star: parse_or(&lookup, "GISTAR_STAR", true)?,
            contiguity_mode: lookup("CONTIGUITY_MODE")
                .map(|v| v.parse::<ContiguityMode>())
                .transpose()?
                .unwrap_or_default(),
            null_age_policy: lookup("NULL_AGE_POLICY")
                .map(|v| v.parse::<NullAgePolicy>())
                .transpose()?
                .unwrap_or_default(),
        })
    }

    /// Log the loaded configuration without exposing the database password.
    pub fn log_redacted(&self) {
        tracing::info!(
            pg_user = self.pg_user.as_str(),
            pg_host = self.pg_host.as_str(),
            pg_port = self.pg_port,
            pg_db = self.pg_db.as_str(),
            pg_password = %redact(&self.pg_password),
            "Config loaded"
        );
        tracing::info!(
            permutations = self.permutations,
            seed = ?self.seed,
            star = self.star,
            contiguity_mode = %self.contiguity_mode,
            null_age_policy = %self.null_age_policy,
            "Statistics settings"
        );
    }
}

fn redact(secret: &str) -> String {
    format!("<redacted>({} chars)", secret.len())
}

fn parse_value<T: FromStr>(key: &str, raw: &str) -> Result<T> {
    raw.trim()
        .parse()
        .map_err(|_| HexPopError::Config(format!("{key} has an invalid value: '{raw}'")))
}

fn parse_required<T, F>(lookup: &F, key: &str) -> Result<T>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    let raw = lookup(key)
        .ok_or_else(|| HexPopError::Config(format!("{key} environment variable is required")))?;
    parse_value(key, &raw)
}

fn parse_or<T, F>(lookup: &F, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => parse_value(key, &raw),
        None => Ok(default),
    }
}
