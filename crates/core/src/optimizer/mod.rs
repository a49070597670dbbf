//! Offline tuning of persisted indexes.
//!
//! The optimizer always works on a snapshot read from disk, never on a live
//! [`Index`]. Two entry points:
//!
//! - [`Optimizer::execute`] reshapes the graph (per-node outgoing and incoming
//!   edge quotas), measures recall over a grid of search settings, and writes
//!   the retuned copy to a new directory;
//! - [`Optimizer::adjust_search_coefficients`] only measures and stores
//!   [`SearchCoefficients`] in the property file, leaving the graph untouched.
//!
//! Recall is measured against exact linear search on objects sampled from the
//! index itself; cost is the mean number of distance computations per query.

/// Recall measurement against exact ground truth.
pub mod metrics;

use crate::config::{MAX_EDGE_SIZE, OPTIMIZER_EDGE_SIZES, OPTIMIZER_EPSILONS};
use crate::error::{IndexError, Result};
use crate::graph::search::{self, SearchParams};
use crate::graph::{neighbor_order, Neighbor};
use crate::index::{Index, IndexData};
use crate::property::{CoefficientAnchor, SearchCoefficients};
use crate::space::ObjectId;
use crate::storage::persistence;
use ordered_float::OrderedFloat;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Closed recall interval a band selection aims for.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AccuracyBand {
    pub from: f32,
    pub to: f32,
}

impl AccuracyBand {
    pub fn new(from: f32, to: f32) -> Self {
        Self { from, to }
    }

    pub fn contains(&self, recall: f32) -> bool {
        recall >= self.from && recall <= self.to
    }

    /// Distance from `recall` to the band, 0 inside it.
    fn gap(&self, recall: f32) -> f32 {
        if recall < self.from {
            self.from - recall
        } else if recall > self.to {
            recall - self.to
        } else {
            0.0
        }
    }
}

/// Optimizer run settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerConfig {
    /// Nearest edges each node keeps during reconstruction.
    pub outgoing: usize,
    /// Reverse edges each node accepts during reconstruction.
    pub incoming: usize,
    /// Number of sampled queries.
    pub queries: usize,
    pub low_accuracy: AccuracyBand,
    pub high_accuracy: AccuracyBand,
    /// `k` used for recall measurement.
    pub result_size: usize,
    /// Seed for query sampling, so runs are reproducible.
    pub seed: u64,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            outgoing: 10,
            incoming: 120,
            queries: 100,
            low_accuracy: AccuracyBand::new(0.3, 0.5),
            high_accuracy: AccuracyBand::new(0.8, 0.9),
            result_size: 10,
            seed: 0x5EED,
        }
    }
}

impl OptimizerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.outgoing == 0 {
            return Err(IndexError::InvalidProperty("outgoing must be at least 1".into()));
        }
        if self.outgoing + self.incoming > MAX_EDGE_SIZE {
            return Err(IndexError::InvalidProperty(format!(
                "outgoing + incoming must be at most {MAX_EDGE_SIZE}, got {}",
                self.outgoing + self.incoming
            )));
        }
        if self.queries == 0 || self.result_size == 0 {
            return Err(IndexError::InvalidProperty(
                "queries and result_size must be at least 1".into(),
            ));
        }
        for (name, band) in [("low", self.low_accuracy), ("high", self.high_accuracy)] {
            if !(0.0..=1.0).contains(&band.from) || !(band.from..=1.0).contains(&band.to) {
                return Err(IndexError::InvalidProperty(format!(
                    "{name} accuracy band must satisfy 0 <= from <= to <= 1, got {}..{}",
                    band.from, band.to
                )));
            }
        }
        Ok(())
    }
}

/// Measured recall and cost of one grid point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Trial {
    pub edge_size: usize,
    pub epsilon: f32,
    pub recall: f32,
    /// Mean distance computations per query.
    pub cost: f32,
}

/// Setting chosen for one accuracy band.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BandSelection {
    pub edge_size: usize,
    pub epsilon: f32,
    pub recall: f32,
    pub cost: f32,
    /// `false` when no grid point fell inside the band and the closest was taken.
    pub converged: bool,
}

impl BandSelection {
    fn anchor(&self) -> CoefficientAnchor {
        CoefficientAnchor {
            accuracy: self.recall,
            edge_size: self.edge_size,
            epsilon: self.epsilon,
        }
    }
}

/// Outcome of an optimizer run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationReport {
    pub low: BandSelection,
    pub high: BandSelection,
    /// Every evaluated grid point, in evaluation order.
    pub trials: Vec<Trial>,
}

impl OptimizationReport {
    pub fn converged(&self) -> bool {
        self.low.converged && self.high.converged
    }

    /// Fails with `Unconverged` if either band fell back to its closest setting.
    pub fn ensure_converged(&self) -> Result<()> {
        if self.converged() {
            return Ok(());
        }
        let describe = |name: &str, s: &BandSelection| {
            format!(
                "{name} band: closest recall {:.3} (edge_size={}, epsilon={})",
                s.recall, s.edge_size, s.epsilon
            )
        };
        let mut parts = Vec::new();
        if !self.low.converged {
            parts.push(describe("low", &self.low));
        }
        if !self.high.converged {
            parts.push(describe("high", &self.high));
        }
        Err(IndexError::Unconverged(parts.join("; ")))
    }

    pub fn coefficients(&self) -> SearchCoefficients {
        SearchCoefficients {
            low: self.low.anchor(),
            high: self.high.anchor(),
        }
    }
}

/// Tunes persisted indexes.
#[derive(Debug, Clone, Default)]
pub struct Optimizer {
    config: OptimizerConfig,
}

impl Optimizer {
    pub fn new(config: OptimizerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &OptimizerConfig {
        &self.config
    }

    /// Reconstructs and retunes the index at `input`, writing the result to `output`.
    ///
    /// The input directory is only read. Refuses to write over it.
    pub fn execute(&self, input: impl AsRef<Path>, output: impl AsRef<Path>) -> Result<OptimizationReport> {
        let (input, output) = (input.as_ref(), output.as_ref());
        if same_location(input, output) {
            return Err(IndexError::InvalidProperty(format!(
                "optimizer output {output:?} must differ from its input"
            )));
        }
        let mut data = persistence::load_index(input)?;
        reconstruct(&mut data, self.config.outgoing, self.config.incoming);
        let report = self.measure(&data)?;
        data.property.edge_size_for_search = report.high.edge_size;
        data.property.search_coefficients = Some(report.coefficients());
        persistence::save_index(&data, output)?;
        tracing::info!(
            "Optimized {:?} into {:?} (edge_size_for_creation={}, edge_size_for_search={})",
            input,
            output,
            data.property.edge_size_for_creation,
            data.property.edge_size_for_search
        );
        Ok(report)
    }

    /// [`execute`](Self::execute) on the persisted state behind `index`.
    pub fn execute_index(&self, index: &Index, output: impl AsRef<Path>) -> Result<OptimizationReport> {
        self.execute(backing_path(index)?, output)
    }

    /// Measures and stores search coefficients in place, without touching the graph.
    pub fn adjust_search_coefficients(&self, path: impl AsRef<Path>) -> Result<OptimizationReport> {
        let path = path.as_ref();
        let mut data = persistence::load_index(path)?;
        let report = self.measure(&data)?;
        data.property.search_coefficients = Some(report.coefficients());
        persistence::save_property(&data.property, path)?;
        tracing::info!("Adjusted search coefficients of {:?}", path);
        Ok(report)
    }

    /// [`adjust_search_coefficients`](Self::adjust_search_coefficients) on the
    /// persisted state behind `index`. The open handle keeps its old property.
    pub fn adjust_index_search_coefficients(&self, index: &Index) -> Result<OptimizationReport> {
        self.adjust_search_coefficients(backing_path(index)?)
    }

    /// Grid search over edge size and epsilon.
    fn measure(&self, data: &IndexData) -> Result<OptimizationReport> {
        let space = &data.space;
        let graph = &data.graph;
        let live: Vec<ObjectId> = space.live_ids().filter(|&id| graph.is_linked(id)).collect();
        if live.is_empty() {
            return Err(IndexError::NotFound(
                "index has no searchable objects to sample queries from".into(),
            ));
        }

        let mut rng = StdRng::seed_from_u64(self.config.seed);
        let amount = self.config.queries.min(live.len());
        let queries: Vec<Vec<f32>> = rand::seq::index::sample(&mut rng, live.len(), amount)
            .into_iter()
            .map(|i| space.decode(live[i]))
            .collect();
        let k = self.config.result_size.min(live.len());

        let ground_truth: Vec<Vec<Neighbor>> = queries
            .par_iter()
            .map(|q| search::linear_search(space, &space.scorer(q.clone()), k, -1.0).0)
            .collect();

        let mut trials = Vec::with_capacity(OPTIMIZER_EDGE_SIZES.len() * OPTIMIZER_EPSILONS.len());
        for &edge_size in OPTIMIZER_EDGE_SIZES {
            for &epsilon in OPTIMIZER_EPSILONS {
                let params = SearchParams::new(k, epsilon, -1.0).with_edge_size(edge_size);
                let per_query: Vec<(f32, usize)> = queries
                    .par_iter()
                    .zip(&ground_truth)
                    .map(|(q, truth)| {
                        let scorer = space.scorer(q.clone());
                        let (found, stats) = search::search(space, graph, &scorer, &params);
                        (metrics::recall_at_k(truth, &found, k), stats.distance_computations)
                    })
                    .collect();
                let recalls: Vec<f32> = per_query.iter().map(|r| r.0).collect();
                let cost = per_query.iter().map(|r| r.1).sum::<usize>() as f32 / per_query.len() as f32;
                let trial = Trial {
                    edge_size,
                    epsilon,
                    recall: metrics::mean(&recalls),
                    cost,
                };
                tracing::debug!(?trial, "Optimizer trial");
                trials.push(trial);
            }
        }

        let low = select("low", &trials, self.config.low_accuracy)?;
        let high = select("high", &trials, self.config.high_accuracy)?;
        Ok(OptimizationReport { low, high, trials })
    }
}

fn backing_path(index: &Index) -> Result<PathBuf> {
    index.path().ok_or_else(|| {
        IndexError::NotFound("index has no backing path; save it first".into())
    })
}

fn same_location(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(x), Ok(y)) => x == y,
        _ => a == b,
    }
}

/// Cheapest trial inside `band`, else the one with recall closest to it.
fn select(name: &str, trials: &[Trial], band: AccuracyBand) -> Result<BandSelection> {
    let inside = trials
        .iter()
        .filter(|t| band.contains(t.recall))
        .min_by_key(|t| OrderedFloat(t.cost));
    let (trial, converged) = match inside {
        Some(t) => (t, true),
        None => {
            let closest = trials
                .iter()
                .min_by_key(|t| (OrderedFloat(band.gap(t.recall)), OrderedFloat(t.cost)))
                .ok_or_else(|| IndexError::Internal("optimizer evaluated no settings".into()))?;
            tracing::warn!(
                "No setting reached the {} accuracy band {}..{}; using closest recall {:.3}",
                name,
                band.from,
                band.to,
                closest.recall
            );
            (closest, false)
        }
    };
    Ok(BandSelection {
        edge_size: trial.edge_size,
        epsilon: trial.epsilon,
        recall: trial.recall,
        cost: trial.cost,
        converged,
    })
}

/// Rebuilds every neighbor list from per-node outgoing and incoming quotas.
///
/// Each linked live node keeps its `outgoing` nearest live edges; every kept edge
/// `u -> v` then offers `v -> u`, and each node accepts at most `incoming` such
/// reverse edges, nearest first. The list bound grows to fit both quotas.
pub(crate) fn reconstruct(data: &mut IndexData, outgoing: usize, incoming: usize) {
    let space = &data.space;
    let graph = &mut data.graph;
    let slots = graph.slots();

    let mut lists: Vec<Vec<Neighbor>> = (1..=slots as ObjectId)
        .map(|id| {
            if !space.is_live(id) || !graph.is_linked(id) {
                return Vec::new();
            }
            graph
                .neighbors(id)
                .iter()
                .filter(|n| space.is_live(n.id))
                .take(outgoing)
                .copied()
                .collect()
        })
        .collect();

    let mut reverse: Vec<(ObjectId, Neighbor)> = lists
        .iter()
        .enumerate()
        .flat_map(|(slot, list)| {
            let from = slot as ObjectId + 1;
            list.iter().map(move |e| (e.id, Neighbor::new(from, e.distance)))
        })
        .collect();
    reverse.sort_by(|a, b| a.0.cmp(&b.0).then(neighbor_order(&a.1, &b.1)));

    let mut accepted = vec![0usize; slots];
    for (to, edge) in reverse {
        let slot = to as usize - 1;
        if accepted[slot] >= incoming || lists[slot].iter().any(|n| n.id == edge.id) {
            continue;
        }
        lists[slot].push(edge);
        accepted[slot] += 1;
    }

    let bound = graph.edge_size().max(outgoing + incoming);
    graph.rewire(bound, lists);
    data.property.edge_size_for_creation = bound;
    tracing::debug!(outgoing, incoming, bound, "Reconstructed graph");
}
