//! Local Getis-Ord G / G* with conditional permutation inference.
//!
//! For node `i` with row-standardised weights `w_ij` and `S = Σ y`:
//!
//! * star (G*): the node joins its own neighbourhood, so k neighbours give
//!   weight `1/(k+1)` to each of them and to itself.
//!   `G_i = Σ_j w_ij y_j / S`, moments over all `n` values.
//! * plain (G): `G_i = Σ_{j≠i} w_ij y_j / (S − y_i)`, moments over the
//!   `n − 1` values other than `y_i`.
//!
//! Moments are the classical randomisation ones with `c = 1` (row sums of
//! row-standardised weights): `E[G_i] = c/N` and
//! `Var[G_i] = c(N − c)/(N − 1) · s² / (N² ȳ²)`.
//!
//! Pseudo p-values fold the one-sided count: with `larger` permutations at
//! least as large as the observed value, `p = (min(larger, P − larger) + 1) / (P + 1)`.

use rand::rngs::StdRng;
use rand::seq::index;
use rand::SeedableRng;
use rayon::prelude::*;

use hexpop_common::{config::DEFAULT_PERMUTATIONS, HexPopError};

use crate::contiguity::ContiguityGraph;

/// Engine settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GiConfig {
    pub permutations: usize,
    pub seed: u64,
    pub star: bool,
}

impl Default for GiConfig {
    fn default() -> Self {
        Self {
            permutations: DEFAULT_PERMUTATIONS,
            seed: 0,
            star: true,
        }
    }
}

/// Result for one node. NaN fields mean "no statistic available".
#[derive(Debug, Clone, Copy)]
pub struct LocalStatistic {
    pub g: f64,
    pub expected: f64,
    pub variance: f64,
    pub z_score: f64,
    pub p_value: f64,
}

impl LocalStatistic {
    fn unavailable() -> Self {
        Self {
            g: f64::NAN,
            expected: f64::NAN,
            variance: f64::NAN,
            z_score: f64::NAN,
            p_value: f64::NAN,
        }
    }

    pub fn is_available(&self) -> bool {
        self.z_score.is_finite()
    }
}

/// Compute local G (or G*) for every node of `graph`.
///
/// Islands get NaN for every field. Fails with `DegenerateInput` when the
/// values do not line up with the graph, contain non-finite numbers, sum to
/// zero or have zero variance.
pub fn local_g(
    values: &[f64],
    graph: &ContiguityGraph,
    config: &GiConfig,
) -> Result<Vec<LocalStatistic>, HexPopError> {
    let n = values.len();
    if n != graph.len() {
        return Err(HexPopError::DegenerateInput(format!(
            "{n} values for a graph of {} nodes",
            graph.len()
        )));
    }
    if n < 2 {
        return Err(HexPopError::DegenerateInput(format!("need at least 2 values, got {n}")));
    }
    if values.iter().any(|v| !v.is_finite()) {
        return Err(HexPopError::DegenerateInput("values contain NaN or infinity".to_string()));
    }
    if values.iter().all(|v| *v == values[0]) {
        return Err(HexPopError::DegenerateInput("attribute has zero variance".to_string()));
    }

    let sum: f64 = values.iter().sum();
    if sum == 0.0 {
        return Err(HexPopError::DegenerateInput("attribute sums to zero".to_string()));
    }
    let sum_sq: f64 = values.iter().map(|v| v * v).sum();

    let moments = Moments { n, sum, sum_sq };
    let stats = (0..n)
        .into_par_iter()
        .map(|i| node_statistic(i, values, graph, config, &moments))
        .collect();
    Ok(stats)
}

struct Moments {
    n: usize,
    sum: f64,
    sum_sq: f64,
}

/// Neighbour weights and self weight of node `i` for the chosen variant.
fn node_weights(graph: &ContiguityGraph, i: usize, star: bool) -> (Vec<f64>, f64) {
    let k = graph.cardinality(i) as f64;
    if star {
        let self_weight = 1.0 / (k + 1.0);
        let scale = k * self_weight;
        (graph.weights(i).iter().map(|w| w * scale).collect(), self_weight)
    } else {
        (graph.weights(i).to_vec(), 0.0)
    }
}

fn node_statistic(
    i: usize,
    values: &[f64],
    graph: &ContiguityGraph,
    config: &GiConfig,
    m: &Moments,
) -> LocalStatistic {
    let k = graph.cardinality(i);
    if k == 0 {
        return LocalStatistic::unavailable();
    }

    let y_i = values[i];
    let (weights, self_weight) = node_weights(graph, i, config.star);
    let neighbor_sum: f64 = graph
        .neighbors(i)
        .iter()
        .zip(&weights)
        .map(|(&j, w)| w * values[j])
        .sum();

    let (g, big_n, mean, var) = if config.star {
        let big_n = m.n as f64;
        let mean = m.sum / big_n;
        let var = m.sum_sq / big_n - mean * mean;
        ((neighbor_sum + self_weight * y_i) / m.sum, big_n, mean, var)
    } else {
        let big_n = (m.n - 1) as f64;
        let rest = m.sum - y_i;
        let mean = rest / big_n;
        let var = (m.sum_sq - y_i * y_i) / big_n - mean * mean;
        (neighbor_sum / rest, big_n, mean, var)
    };

    // Row standardisation makes every non-island row sum to one.
    let cardinality = 1.0;
    let expected = cardinality / big_n;
    let variance = cardinality * (big_n - cardinality) / (big_n - 1.0) * (1.0 / (big_n * big_n))
        * (var / (mean * mean));
    let z = (g - expected) / variance.sqrt();

    LocalStatistic {
        g,
        expected,
        variance,
        z_score: if z.is_finite() { z } else { f64::NAN },
        p_value: if g.is_finite() {
            permutation_p_value(i, g, &weights, self_weight, values, config, m.sum)
        } else {
            f64::NAN
        },
    }
}

/// Conditional randomisation: the focal value stays put, the `k` neighbour
/// slots are filled with distinct values drawn from the other `n − 1` nodes.
fn permutation_p_value(
    i: usize,
    observed: f64,
    weights: &[f64],
    self_weight: f64,
    values: &[f64],
    config: &GiConfig,
    sum: f64,
) -> f64 {
    let k = weights.len();
    let pool = values.len() - 1;
    let y_i = values[i];
    let mut rng = StdRng::seed_from_u64(node_seed(config.seed, i));

    let mut larger = 0usize;
    for _ in 0..config.permutations {
        let draw = index::sample(&mut rng, pool, k);
        let acc: f64 = draw
            .iter()
            .zip(weights)
            .map(|(slot, w)| {
                let j = if slot >= i { slot + 1 } else { slot };
                w * values[j]
            })
            .sum();
        let simulated = if config.star {
            (acc + self_weight * y_i) / sum
        } else {
            acc / (sum - y_i)
        };
        if simulated >= observed {
            larger += 1;
        }
    }

    let folded = larger.min(config.permutations - larger);
    (folded as f64 + 1.0) / (config.permutations as f64 + 1.0)
}

/// Per-node RNG seed (splitmix64 finaliser) so results do not depend on
/// which rayon worker handles the node.
fn node_seed(seed: u64, i: usize) -> u64 {
    let mut x = seed ^ (i as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15);
    x = (x ^ (x >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    x = (x ^ (x >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    x ^ (x >> 31)
}
