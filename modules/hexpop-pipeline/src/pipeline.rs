use std::collections::HashSet;
use std::time::Instant;

use chrono::{DateTime, Utc};
use geo::MultiPolygon;
use rand::Rng;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

use hexpop_common::{Attribute, Config, ContiguityMode, HexPopError, HexResult, NullAgePolicy, StatPair};
use hexpop_spatial::{local_g, ContiguityGraph, GiConfig};
use hexpop_store::HexCell;

use crate::traits::HexStore;

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

/// Everything a run needs besides the store. The seed is always resolved.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PipelineSettings {
    pub permutations: usize,
    pub seed: u64,
    pub star: bool,
    pub contiguity_mode: ContiguityMode,
    pub null_age_policy: NullAgePolicy,
}

impl PipelineSettings {
    /// Take the statistic settings from config, drawing a fresh seed when none
    /// is configured. The drawn seed is logged so the run can be replayed.
    pub fn from_config(config: &Config) -> Self {
        let seed = match config.seed {
            Some(seed) => seed,
            None => {
                let seed: u64 = rand::rng().random();
                info!(seed, "No GISTAR_SEED configured, drew a random seed");
                seed
            }
        };
        Self {
            permutations: config.permutations,
            seed,
            star: config.star,
            contiguity_mode: config.contiguity_mode,
            null_age_policy: config.null_age_policy,
        }
    }

    fn gi_config(&self) -> GiConfig {
        GiConfig {
            permutations: self.permutations,
            seed: self.seed,
            star: self.star,
        }
    }
}

// ---------------------------------------------------------------------------
// Pure computation
// ---------------------------------------------------------------------------

/// Output of [`compute_results`]: rows to write plus bookkeeping for the report.
#[derive(Debug, Clone, Default)]
pub struct Computation {
    pub results: Vec<HexResult>,
    pub rows_without_hex_id: usize,
    pub null_age_rows: usize,
    pub excluded_rows: usize,
    pub islands: usize,
    pub mean_neighbors: f64,
    pub skipped_attributes: Vec<Attribute>,
    pub duplicate_hex_ids: Vec<i64>,
}

/// Build the contiguity graph once and run the local statistic for every
/// attribute over it.
///
/// Rows without a hex id take part in the graph (they are neighbours of other
/// cells) but produce no result. Rows excluded by the null-age policy are
/// left out of the graph and get all-NULL results. An attribute with no
/// variation is skipped with a warning and written as NULL.
pub fn compute_results(
    cells: &[HexCell],
    settings: &PipelineSettings,
) -> Result<Computation, HexPopError> {
    let flagged: Vec<usize> = cells
        .iter()
        .enumerate()
        .filter(|(_, cell)| cell.bands.is_all_null())
        .map(|(i, _)| i)
        .collect();

    if !flagged.is_empty() {
        let sample: Vec<Option<i64>> = flagged.iter().take(10).map(|&i| cells[i].hex_id).collect();
        match settings.null_age_policy {
            NullAgePolicy::Error => {
                return Err(HexPopError::MissingAgeData {
                    count: flagged.len(),
                })
            }
            NullAgePolicy::Zero => {
                warn!(
                    rows = flagged.len(),
                    sample = ?sample,
                    "Rows with no age data counted as zero population"
                )
            }
            NullAgePolicy::Exclude => {
                warn!(
                    rows = flagged.len(),
                    sample = ?sample,
                    "Rows with no age data excluded from the graph"
                )
            }
        }
    }

    // Row index -> position in the analysed frame.
    let mut slot_of: Vec<Option<usize>> = vec![None; cells.len()];
    let mut frame: Vec<usize> = Vec::with_capacity(cells.len());
    for (i, cell) in cells.iter().enumerate() {
        if settings.null_age_policy == NullAgePolicy::Exclude && cell.bands.is_all_null() {
            continue;
        }
        slot_of[i] = Some(frame.len());
        frame.push(i);
    }
    let excluded_rows = cells.len() - frame.len();

    let geometries: Vec<MultiPolygon<f64>> = frame
        .iter()
        .map(|&i| {
            cells[i].geometry.clone().ok_or_else(|| {
                HexPopError::GraphConstruction(format!(
                    "row {i} (hex_id {:?}) has no geometry",
                    cells[i].hex_id
                ))
            })
        })
        .collect::<Result<_, _>>()?;

    let graph = ContiguityGraph::queen(&geometries, settings.contiguity_mode)?;
    let islands = graph.islands().len();
    let mean_neighbors = graph.mean_neighbors();
    if islands > 0 {
        warn!(islands, "Cells without neighbours get NULL statistics");
    }
    info!(
        cells = graph.len(),
        mean_neighbors,
        mode = %settings.contiguity_mode,
        "Contiguity graph built"
    );

    let gi = settings.gi_config();
    let mut frame_stats = vec![[StatPair::default(); 5]; frame.len()];
    let mut skipped_attributes = Vec::new();

    for attribute in Attribute::ALL {
        let values: Vec<f64> = frame
            .iter()
            .map(|&i| cells[i].bands.value(attribute))
            .collect();

        match local_g(&values, &graph, &gi) {
            Ok(stats) => {
                for (slot, stat) in stats.iter().enumerate() {
                    frame_stats[slot][attribute.index()] =
                        StatPair::from_raw(stat.z_score, stat.p_value);
                }
                info!(%attribute, "Local G computed");
            }
            Err(HexPopError::DegenerateInput(reason)) => {
                warn!(%attribute, reason = %reason, "Attribute skipped, writing NULL statistics");
                skipped_attributes.push(attribute);
            }
            Err(e) => return Err(e),
        }
    }

    let mut results = Vec::with_capacity(cells.len());
    let mut rows_without_hex_id = 0;
    let mut seen = HashSet::new();
    let mut duplicate_hex_ids = Vec::new();

    for (i, cell) in cells.iter().enumerate() {
        let Some(hex_id) = cell.hex_id else {
            rows_without_hex_id += 1;
            continue;
        };
        if !seen.insert(hex_id) {
            duplicate_hex_ids.push(hex_id);
        }
        let stats = slot_of[i]
            .map(|slot| frame_stats[slot])
            .unwrap_or_default();
        results.push(HexResult { hex_id, stats });
    }

    if rows_without_hex_id > 0 {
        warn!(rows = rows_without_hex_id, "Rows without hex_id are not written back");
    }
    if !duplicate_hex_ids.is_empty() {
        warn!(
            count = duplicate_hex_ids.len(),
            sample = ?&duplicate_hex_ids[..duplicate_hex_ids.len().min(10)],
            "Duplicate hex_id values, the last result per id wins"
        );
    }

    Ok(Computation {
        results,
        rows_without_hex_id,
        null_age_rows: flagged.len(),
        excluded_rows,
        islands,
        mean_neighbors,
        skipped_attributes,
        duplicate_hex_ids,
    })
}

// ---------------------------------------------------------------------------
// Orchestration
// ---------------------------------------------------------------------------

/// Summary of one completed run.
#[derive(Debug, Clone)]
pub struct PipelineReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub seed: u64,
    pub rows_loaded: usize,
    pub rows_written: u64,
    pub rows_without_hex_id: usize,
    pub null_age_rows: usize,
    pub excluded_rows: usize,
    pub islands: usize,
    pub skipped_attributes: Vec<Attribute>,
    pub unmatched_hex_ids: Vec<i64>,
}

impl PipelineReport {
    pub fn log(&self) {
        let skipped: Vec<&str> = self.skipped_attributes.iter().map(|a| a.column()).collect();
        info!(
            run_id = %self.run_id,
            seed = self.seed,
            rows_loaded = self.rows_loaded,
            rows_written = self.rows_written,
            rows_without_hex_id = self.rows_without_hex_id,
            null_age_rows = self.null_age_rows,
            excluded_rows = self.excluded_rows,
            islands = self.islands,
            skipped = ?skipped,
            unmatched = self.unmatched_hex_ids.len(),
            elapsed_ms = (self.finished_at - self.started_at).num_milliseconds(),
            "Hot spot analysis complete"
        );
    }
}

pub struct Pipeline<S> {
    store: S,
    settings: PipelineSettings,
}

impl<S: HexStore> Pipeline<S> {
    pub fn new(store: S, settings: PipelineSettings) -> Self {
        Self { store, settings }
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Load, compute and write. Nothing is written unless every attribute
    /// was processed, and the write itself is all-or-nothing.
    pub async fn run(&self) -> Result<PipelineReport, HexPopError> {
        let run_id = Uuid::new_v4();
        let span = info_span!("gistar_run", %run_id);
        self.run_inner(run_id).instrument(span).await
    }

    async fn run_inner(&self, run_id: Uuid) -> Result<PipelineReport, HexPopError> {
        let started_at = Utc::now();
        let timer = Instant::now();
        info!(
            seed = self.settings.seed,
            permutations = self.settings.permutations,
            star = self.settings.star,
            "Hot spot analysis starting"
        );

        let cells = self.store.load_cells().await?;
        let rows_loaded = cells.len();

        // Permutation inference is CPU bound; keep it off the async workers.
        let settings = self.settings;
        let computation = tokio::task::spawn_blocking(move || compute_results(&cells, &settings))
            .await
            .map_err(|e| anyhow::anyhow!("statistics task failed: {e}"))??;
        info!(
            results = computation.results.len(),
            elapsed_ms = timer.elapsed().as_millis() as u64,
            "Statistics ready, writing"
        );

        let summary = self.store.write_results(&computation.results).await?;

        Ok(PipelineReport {
            run_id,
            started_at,
            finished_at: Utc::now(),
            seed: self.settings.seed,
            rows_loaded,
            rows_written: summary.updated,
            rows_without_hex_id: computation.rows_without_hex_id,
            null_age_rows: computation.null_age_rows,
            excluded_rows: computation.excluded_rows,
            islands: computation.islands,
            skipped_attributes: computation.skipped_attributes,
            unmatched_hex_ids: summary.unmatched,
        })
    }
}
