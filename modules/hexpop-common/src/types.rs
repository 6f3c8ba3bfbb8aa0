use std::fmt;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Attributes
// ---------------------------------------------------------------------------

/// A numeric column the hot-spot statistic is computed for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Attribute {
    Age0To14,
    Age15To24,
    Age25To59,
    Age60Up,
    TotalPopulation,
}

impl Attribute {
    /// The four raw age bands, in column order.
    pub const AGE_BANDS: [Attribute; 4] = [
        Attribute::Age0To14,
        Attribute::Age15To24,
        Attribute::Age25To59,
        Attribute::Age60Up,
    ];

    /// Every attribute the pipeline computes, in write order.
    pub const ALL: [Attribute; 5] = [
        Attribute::Age0To14,
        Attribute::Age15To24,
        Attribute::Age25To59,
        Attribute::Age60Up,
        Attribute::TotalPopulation,
    ];

    pub fn column(&self) -> &'static str {
        match self {
            Attribute::Age0To14 => "age_0_14",
            Attribute::Age15To24 => "age_15_24",
            Attribute::Age25To59 => "age_25_59",
            Attribute::Age60Up => "age_60_up",
            Attribute::TotalPopulation => "total_population",
        }
    }

    pub fn z_column(&self) -> &'static str {
        match self {
            Attribute::Age0To14 => "z_score_age_0_14",
            Attribute::Age15To24 => "z_score_age_15_24",
            Attribute::Age25To59 => "z_score_age_25_59",
            Attribute::Age60Up => "z_score_age_60_up",
            Attribute::TotalPopulation => "z_score_total_population",
        }
    }

    pub fn p_column(&self) -> &'static str {
        match self {
            Attribute::Age0To14 => "p_value_age_0_14",
            Attribute::Age15To24 => "p_value_age_15_24",
            Attribute::Age25To59 => "p_value_age_25_59",
            Attribute::Age60Up => "p_value_age_60_up",
            Attribute::TotalPopulation => "p_value_total_population",
        }
    }

    /// Position of this attribute in [`Attribute::ALL`].
    pub fn index(&self) -> usize {
        match self {
            Attribute::Age0To14 => 0,
            Attribute::Age15To24 => 1,
            Attribute::Age25To59 => 2,
            Attribute::Age60Up => 3,
            Attribute::TotalPopulation => 4,
        }
    }
}

impl fmt::Display for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.column())
    }
}

// ---------------------------------------------------------------------------
// Population counts
// ---------------------------------------------------------------------------

/// Population by age band for one cell. Any band may be missing in storage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AgeBands {
    pub age_0_14: Option<f64>,
    pub age_15_24: Option<f64>,
    pub age_25_59: Option<f64>,
    pub age_60_up: Option<f64>,
}

impl AgeBands {
    pub fn new(age_0_14: f64, age_15_24: f64, age_25_59: f64, age_60_up: f64) -> Self {
        Self {
            age_0_14: Some(age_0_14),
            age_15_24: Some(age_15_24),
            age_25_59: Some(age_25_59),
            age_60_up: Some(age_60_up),
        }
    }

    /// Raw value of one band; `TotalPopulation` yields the derived total.
    pub fn get(&self, attribute: Attribute) -> Option<f64> {
        match attribute {
            Attribute::Age0To14 => self.age_0_14,
            Attribute::Age15To24 => self.age_15_24,
            Attribute::Age25To59 => self.age_25_59,
            Attribute::Age60Up => self.age_60_up,
            Attribute::TotalPopulation => Some(self.total()),
        }
    }

    /// Value used by the statistic: missing bands count as zero.
    pub fn value(&self, attribute: Attribute) -> f64 {
        self.get(attribute).unwrap_or(0.0)
    }

    /// Sum of the four bands, nulls counted as zero.
    pub fn total(&self) -> f64 {
        [self.age_0_14, self.age_15_24, self.age_25_59, self.age_60_up]
            .iter()
            .map(|v| v.unwrap_or(0.0))
            .sum()
    }

    /// True when no band carries a value at all.
    pub fn is_all_null(&self) -> bool {
        self.age_0_14.is_none()
            && self.age_15_24.is_none()
            && self.age_25_59.is_none()
            && self.age_60_up.is_none()
    }
}

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// z-score and p-value for one attribute of one cell. `None` is written as NULL.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct StatPair {
    pub z_score: Option<f64>,
    pub p_value: Option<f64>,
}

impl StatPair {
    /// Build from raw engine output, mapping NaN and infinities to `None`.
    pub fn from_raw(z_score: f64, p_value: f64) -> Self {
        Self {
            z_score: z_score.is_finite().then_some(z_score),
            p_value: p_value.is_finite().then_some(p_value),
        }
    }
}

/// Everything the pipeline writes back for one cell.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HexResult {
    pub hex_id: i64,
    pub stats: [StatPair; 5],
}

impl HexResult {
    pub fn empty(hex_id: i64) -> Self {
        Self {
            hex_id,
            stats: [StatPair::default(); 5],
        }
    }

    pub fn get(&self, attribute: Attribute) -> StatPair {
        self.stats[attribute.index()]
    }

    pub fn set(&mut self, attribute: Attribute, pair: StatPair) {
        self.stats[attribute.index()] = pair;
    }
}

/// One bar of the district population chart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistrictPopulation {
    pub district: String,
    pub population: Option<f64>,
}
