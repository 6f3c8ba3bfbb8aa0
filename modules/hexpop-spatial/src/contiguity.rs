//! Queen contiguity over polygon cells.
//!
//! Two cells are neighbours when they share at least one boundary point.
//! Node indices are positions in the input slice (frame order), never hex ids.

use std::collections::{BTreeSet, HashMap};

use geo::{BoundingRect, Coord, Intersects, MultiPolygon};
use rstar::primitives::{GeomWithData, Rectangle};
use rstar::{RTree, AABB};
use tracing::debug;

use hexpop_common::{ContiguityMode, HexPopError};

type Envelope = GeomWithData<Rectangle<[f64; 2]>, usize>;

/// Neighbour lists with row-standardised weights.
#[derive(Debug, Clone, PartialEq)]
pub struct ContiguityGraph {
    neighbors: Vec<Vec<usize>>,
    weights: Vec<Vec<f64>>,
}

impl ContiguityGraph {
    /// Build a queen contiguity graph over `geometries`.
    ///
    /// Fails when fewer than two geometries are given or when any geometry
    /// is empty, has a degenerate ring or carries non-finite coordinates.
    pub fn queen(
        geometries: &[MultiPolygon<f64>],
        mode: ContiguityMode,
    ) -> Result<Self, HexPopError> {
        if geometries.len() < 2 {
            return Err(HexPopError::GraphConstruction(format!(
                "need at least 2 geometries, got {}",
                geometries.len()
            )));
        }
        for (i, geometry) in geometries.iter().enumerate() {
            validate(i, geometry)?;
        }

        let sets = match mode {
            ContiguityMode::Vertex => shared_vertex_neighbors(geometries),
            ContiguityMode::Geometric => touching_neighbors(geometries),
        };

        let graph = Self::from_neighbor_sets(sets);
        debug!(
            nodes = graph.len(),
            islands = graph.islands().len(),
            mean_neighbors = graph.mean_neighbors(),
            %mode,
            "Built queen contiguity"
        );
        Ok(graph)
    }

    /// Build a graph from explicit adjacency lists.
    ///
    /// Self references and duplicates are dropped and every list is sorted.
    /// Neighbour indices must be smaller than `neighbors.len()`.
    pub fn from_adjacency(neighbors: Vec<Vec<usize>>) -> Result<Self, HexPopError> {
        let n = neighbors.len();
        let mut sets = Vec::with_capacity(n);
        for (i, list) in neighbors.into_iter().enumerate() {
            let mut set = BTreeSet::new();
            for j in list {
                if j >= n {
                    return Err(HexPopError::GraphConstruction(format!(
                        "node {i} references missing node {j}"
                    )));
                }
                if j != i {
                    set.insert(j);
                }
            }
            sets.push(set);
        }
        Ok(Self::from_neighbor_sets(sets))
    }

    fn from_neighbor_sets(sets: Vec<BTreeSet<usize>>) -> Self {
        let neighbors: Vec<Vec<usize>> = sets.into_iter().map(|s| s.into_iter().collect()).collect();
        let weights = neighbors
            .iter()
            .map(|list| {
                let k = list.len();
                vec![1.0 / k as f64; k]
            })
            .collect();
        Self { neighbors, weights }
    }

    pub fn len(&self) -> usize {
        self.neighbors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.neighbors.is_empty()
    }

    /// Sorted neighbour indices of node `i`.
    pub fn neighbors(&self, i: usize) -> &[usize] {
        &self.neighbors[i]
    }

    /// Row-standardised weights of node `i`, aligned with [`Self::neighbors`].
    pub fn weights(&self, i: usize) -> &[f64] {
        &self.weights[i]
    }

    pub fn cardinality(&self, i: usize) -> usize {
        self.neighbors[i].len()
    }

    /// Nodes with no neighbour at all.
    pub fn islands(&self) -> Vec<usize> {
        (0..self.len()).filter(|&i| self.neighbors[i].is_empty()).collect()
    }

    pub fn mean_neighbors(&self) -> f64 {
        if self.is_empty() {
            return 0.0;
        }
        let total: usize = self.neighbors.iter().map(Vec::len).sum();
        total as f64 / self.len() as f64
    }
}

fn validate(i: usize, geometry: &MultiPolygon<f64>) -> Result<(), HexPopError> {
    if geometry.0.is_empty() {
        return Err(HexPopError::GraphConstruction(format!("geometry {i} is empty")));
    }
    for polygon in &geometry.0 {
        if polygon.exterior().0.len() < 4 {
            return Err(HexPopError::GraphConstruction(format!(
                "geometry {i} has an exterior ring with fewer than 4 points"
            )));
        }
        if rings(polygon).flat_map(|ring| ring.0.iter()).any(|c| !c.x.is_finite() || !c.y.is_finite()) {
            return Err(HexPopError::GraphConstruction(format!(
                "geometry {i} has non-finite coordinates"
            )));
        }
    }
    Ok(())
}

fn rings(polygon: &geo::Polygon<f64>) -> impl Iterator<Item = &geo::LineString<f64>> {
    std::iter::once(polygon.exterior()).chain(polygon.interiors().iter())
}

/// Exact bit pattern of a coordinate; `-0.0` folds onto `0.0`.
fn vertex_key(c: &Coord<f64>) -> (u64, u64) {
    let fold = |v: f64| if v == 0.0 { 0.0_f64.to_bits() } else { v.to_bits() };
    (fold(c.x), fold(c.y))
}

fn shared_vertex_neighbors(geometries: &[MultiPolygon<f64>]) -> Vec<BTreeSet<usize>> {
    let mut by_vertex: HashMap<(u64, u64), Vec<usize>> = HashMap::new();
    for (i, geometry) in geometries.iter().enumerate() {
        for polygon in &geometry.0 {
            for coord in rings(polygon).flat_map(|ring| ring.0.iter()) {
                let cells = by_vertex.entry(vertex_key(coord)).or_default();
                if cells.last() != Some(&i) {
                    cells.push(i);
                }
            }
        }
    }

    let mut sets = vec![BTreeSet::new(); geometries.len()];
    for cells in by_vertex.values().filter(|cells| cells.len() > 1) {
        for &a in cells {
            for &b in cells {
                if a != b {
                    sets[a].insert(b);
                }
            }
        }
    }
    sets
}

fn touching_neighbors(geometries: &[MultiPolygon<f64>]) -> Vec<BTreeSet<usize>> {
    let items: Vec<Envelope> = geometries
        .iter()
        .enumerate()
        .filter_map(|(i, geometry)| {
            let rect = geometry.bounding_rect()?;
            Some(GeomWithData::new(
                Rectangle::from_corners([rect.min().x, rect.min().y], [rect.max().x, rect.max().y]),
                i,
            ))
        })
        .collect();
    let tree = RTree::bulk_load(items);

    let mut sets = vec![BTreeSet::new(); geometries.len()];
    for (i, geometry) in geometries.iter().enumerate() {
        let Some(rect) = geometry.bounding_rect() else {
            continue;
        };
        let envelope = AABB::from_corners([rect.min().x, rect.min().y], [rect.max().x, rect.max().y]);
        for candidate in tree.locate_in_envelope_intersecting(&envelope) {
            let j = candidate.data;
            if j > i && geometry.intersects(&geometries[j]) {
                sets[i].insert(j);
                sets[j].insert(i);
            }
        }
    }
    sets
}
