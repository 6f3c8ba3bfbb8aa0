//! End-to-end pipeline runs against an in-memory store.

use std::sync::Mutex;

use async_trait::async_trait;
use geo::{polygon, MultiPolygon};

use hexpop_common::{AgeBands, Attribute, ContiguityMode, HexPopError, HexResult, NullAgePolicy};
use hexpop_pipeline::{HexStore, Pipeline, PipelineSettings};
use hexpop_store::{HexCell, WriteSummary};

// ---------------------------------------------------------------------------
// In-memory store
// ---------------------------------------------------------------------------

#[derive(Default)]
struct MemoryStore {
    cells: Vec<HexCell>,
    written: Mutex<Vec<HexResult>>,
    fail_writes: bool,
}

impl MemoryStore {
    fn new(cells: Vec<HexCell>) -> Self {
        Self {
            cells,
            ..Default::default()
        }
    }

    fn written(&self) -> Vec<HexResult> {
        self.written.lock().unwrap().clone()
    }

    fn result(&self, hex_id: i64) -> HexResult {
        self.written()
            .into_iter()
            .find(|r| r.hex_id == hex_id)
            .unwrap()
    }
}

#[async_trait]
impl HexStore for MemoryStore {
    async fn load_cells(&self) -> Result<Vec<HexCell>, HexPopError> {
        Ok(self.cells.clone())
    }

    async fn write_results(&self, results: &[HexResult]) -> Result<WriteSummary, HexPopError> {
        if self.fail_writes {
            return Err(HexPopError::Persistence("connection reset".to_string()));
        }
        let mut summary = WriteSummary::default();
        for result in results {
            if self.cells.iter().any(|c| c.hex_id == Some(result.hex_id)) {
                summary.updated += 1;
            } else {
                summary.unmatched.push(result.hex_id);
            }
        }
        *self.written.lock().unwrap() = results.to_vec();
        Ok(summary)
    }
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

fn square(x: f64, y: f64) -> MultiPolygon<f64> {
    MultiPolygon(vec![polygon![
        (x: x, y: y),
        (x: x + 1.0, y: y),
        (x: x + 1.0, y: y + 1.0),
        (x: x, y: y + 1.0),
        (x: x, y: y),
    ]])
}

fn cell(hex_id: i64, x: f64, y: f64, children: f64) -> HexCell {
    HexCell {
        hex_id: Some(hex_id),
        district_name: Some("Mueang".to_string()),
        bands: AgeBands::new(children, 0.0, 0.0, 0.0),
        geometry: Some(square(x, y)),
    }
}

/// `side` x `side` lattice with the whole population in the corner cell (hex_id 1).
fn corner_hot_spot(side: usize) -> Vec<HexCell> {
    let mut cells = Vec::new();
    for row in 0..side {
        for col in 0..side {
            let hex_id = (row * side + col + 1) as i64;
            let children = if hex_id == 1 { 100.0 } else { 0.0 };
            cells.push(cell(hex_id, col as f64, row as f64, children));
        }
    }
    cells
}

fn settings(seed: u64) -> PipelineSettings {
    PipelineSettings {
        permutations: 999,
        seed,
        star: true,
        contiguity_mode: ContiguityMode::Vertex,
        null_age_policy: NullAgePolicy::Zero,
    }
}

fn z(result: &HexResult, attribute: Attribute) -> f64 {
    result.get(attribute).z_score.unwrap()
}

fn p(result: &HexResult, attribute: Attribute) -> f64 {
    result.get(attribute).p_value.unwrap()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn reference_value_for_hex_42() {
    // 1x3 strip, totals 1, 2, 3 with hex 42 at the right end.
    let cells = vec![
        cell(40, 0.0, 0.0, 1.0),
        cell(41, 1.0, 0.0, 2.0),
        cell(42, 2.0, 0.0, 3.0),
    ];
    let pipeline = Pipeline::new(MemoryStore::new(cells), settings(3));
    let report = pipeline.run().await.unwrap();

    assert_eq!(report.rows_loaded, 3);
    assert_eq!(report.rows_written, 3);

    let hex42 = pipeline.store().result(42);
    let expected = 54f64.sqrt() / 12.0;
    assert!((z(&hex42, Attribute::TotalPopulation) - 0.6123724356957945).abs() < 1e-9);
    assert!((z(&hex42, Attribute::TotalPopulation) - expected).abs() < 1e-9);

    let hex40 = pipeline.store().result(40);
    assert!((z(&hex40, Attribute::TotalPopulation) + expected).abs() < 1e-9);
}

#[tokio::test]
async fn two_by_two_population_in_one_cell() {
    // A B over C D; only A has people.
    let cells = vec![
        cell(1, 0.0, 0.0, 100.0),
        cell(2, 1.0, 0.0, 0.0),
        cell(3, 0.0, 1.0, 0.0),
        cell(4, 1.0, 1.0, 0.0),
    ];
    let pipeline = Pipeline::new(MemoryStore::new(cells), settings(11));
    let report = pipeline.run().await.unwrap();
    assert_eq!(report.rows_written, 4);

    let written = pipeline.store().written();
    let a = pipeline.store().result(1);
    for other in &written {
        // Every neighbourhood covers the whole grid, so A ties at the top.
        assert!(z(&a, Attribute::TotalPopulation) >= z(other, Attribute::TotalPopulation));
        assert!(p(&a, Attribute::TotalPopulation) <= p(other, Attribute::TotalPopulation));
    }
    assert!(report.skipped_attributes.contains(&Attribute::Age60Up));
    assert_eq!(a.get(Attribute::Age60Up).z_score, None);
}

#[tokio::test]
async fn corner_hot_spot_stands_out() {
    let pipeline = Pipeline::new(MemoryStore::new(corner_hot_spot(4)), settings(5));
    pipeline.run().await.unwrap();

    let written = pipeline.store().written();
    let a = pipeline.store().result(1);
    for other in written.iter().filter(|r| r.hex_id != 1) {
        assert!(z(&a, Attribute::TotalPopulation) > z(other, Attribute::TotalPopulation));
        assert!(p(&a, Attribute::TotalPopulation) <= p(other, Attribute::TotalPopulation));
    }
    assert!((p(&a, Attribute::TotalPopulation) - 1.0 / 1000.0).abs() < 1e-12);
}

#[tokio::test]
async fn total_statistics_follow_the_band_sum() {
    // Only one band is populated, so the total equals that band everywhere.
    let pipeline = Pipeline::new(MemoryStore::new(corner_hot_spot(3)), settings(9));
    pipeline.run().await.unwrap();

    for result in pipeline.store().written() {
        assert_eq!(
            result.get(Attribute::TotalPopulation),
            result.get(Attribute::Age0To14)
        );
    }
}

#[tokio::test]
async fn fixed_seed_is_reproducible() {
    let first = Pipeline::new(MemoryStore::new(corner_hot_spot(5)), settings(2024));
    let second = Pipeline::new(MemoryStore::new(corner_hot_spot(5)), settings(2024));
    first.run().await.unwrap();
    second.run().await.unwrap();
    assert_eq!(first.store().written(), second.store().written());

    let reseeded = Pipeline::new(MemoryStore::new(corner_hot_spot(5)), settings(1));
    reseeded.run().await.unwrap();
    for (a, b) in first.store().written().iter().zip(reseeded.store().written()) {
        assert_eq!(
            a.get(Attribute::TotalPopulation).z_score,
            b.get(Attribute::TotalPopulation).z_score
        );
    }
}

#[tokio::test]
async fn null_hex_id_rows_are_never_written() {
    let mut cells = corner_hot_spot(3);
    cells[4].hex_id = None;
    let pipeline = Pipeline::new(MemoryStore::new(cells), settings(1));
    let report = pipeline.run().await.unwrap();

    assert_eq!(report.rows_loaded, 9);
    assert_eq!(report.rows_without_hex_id, 1);
    assert_eq!(report.rows_written, 8);
    assert!(pipeline.store().written().iter().all(|r| r.hex_id != 5));
}

#[tokio::test]
async fn island_is_written_with_nulls() {
    let mut cells = corner_hot_spot(3);
    cells.push(cell(77, 40.0, 40.0, 5.0));
    let pipeline = Pipeline::new(MemoryStore::new(cells), settings(1));
    let report = pipeline.run().await.unwrap();

    assert_eq!(report.islands, 1);
    assert_eq!(pipeline.store().result(77), HexResult::empty(77));
}

#[tokio::test]
async fn missing_age_data_aborts_before_writing() {
    let mut cells = corner_hot_spot(3);
    cells[8].bands = AgeBands::default();
    let settings = PipelineSettings {
        null_age_policy: NullAgePolicy::Error,
        ..settings(1)
    };
    let pipeline = Pipeline::new(MemoryStore::new(cells), settings);

    let err = pipeline.run().await.unwrap_err();
    assert!(matches!(err, HexPopError::MissingAgeData { count: 1 }));
    assert!(pipeline.store().written().is_empty());
}

#[tokio::test]
async fn write_failure_is_reported() {
    let store = MemoryStore {
        fail_writes: true,
        ..MemoryStore::new(corner_hot_spot(3))
    };
    let pipeline = Pipeline::new(store, settings(1));

    let err = pipeline.run().await.unwrap_err();
    assert!(matches!(err, HexPopError::Persistence(_)));
    assert!(pipeline.store().written().is_empty());
}

#[tokio::test]
async fn empty_grid_fails_graph_construction() {
    let pipeline = Pipeline::new(MemoryStore::new(Vec::new()), settings(1));
    let err = pipeline.run().await.unwrap_err();
    assert!(matches!(err, HexPopError::GraphConstruction(_)));
}
