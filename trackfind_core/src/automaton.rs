//! Cellular automaton path finder.
//!
//! Finds vertex-disjoint, highest-value paths through a weighted relation
//! graph:
//!
//! 1. **Relax**: iterate `state(n) = intrinsic(n) + max(w + state(from))` over
//!    incoming relations until nothing changes (or the iteration bound hits).
//! 2. **Extract**: take the node with the highest state, follow its best
//!    predecessors back to a start node and emit the chain.
//! 3. **Revalidate**: if a chain runs into a node taken by an earlier path,
//!    the states are stale and the fixed point is recomputed first.
//!
//! Ties are broken deterministically: among incoming relations the first one
//! in the given order wins, among end nodes the lowest index wins.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::filter::Weight;
use crate::hits::AutomatonCell;
use crate::relation::WeightedRelation;

/// Configuration for the CellularAutomaton
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AutomatonConfig {
    /// Upper bound of relaxation passes per fixed point (at least 1)
    pub max_iterations: usize,

    /// Paths ending in a state below this are not extracted
    pub min_state: f64,
}

impl Default for AutomatonConfig {
    fn default() -> Self {
        Self {
            max_iterations: 200,
            min_state: 0.0,
        }
    }
}

/// Paths and counters of one automaton run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AutomatonOutcome {
    /// Node indices of each path, start to end, in extraction order
    pub paths: Vec<Vec<usize>>,

    /// State of the end node of each path at extraction
    pub values: Vec<f64>,

    /// Relaxation passes over all fixed point computations
    pub passes: usize,

    /// Fixed point computations that stopped at the iteration bound
    pub bound_hits: usize,

    /// Fixed point recomputations caused by stale chains
    pub recomputations: usize,
}

/// Longest path search over a weighted relation graph.
#[derive(Debug, Clone, Default)]
pub struct CellularAutomaton {
    config: AutomatonConfig,
}

impl CellularAutomaton {
    pub fn new(config: AutomatonConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AutomatonConfig {
        &self.config
    }

    /// Extracts disjoint paths.
    ///
    /// `intrinsic[n]` is the value a node contributes on its own; NaN
    /// excludes the node. Relations referencing nodes outside the slice are
    /// ignored.
    pub fn find_paths(&self, intrinsic: &[Weight], relations: &[WeightedRelation]) -> AutomatonOutcome {
        let node_count = intrinsic.len();
        let mut outcome = AutomatonOutcome::default();
        if node_count == 0 {
            return outcome;
        }

        let mut incoming: Vec<Vec<usize>> = vec![Vec::new(); node_count];
        for (index, relation) in relations.iter().enumerate() {
            if relation.from < node_count && relation.to < node_count && relation.weight.is_finite() {
                incoming[relation.to].push(index);
            }
        }

        let mut cells = vec![AutomatonCell::default(); node_count];
        let mut best_in: Vec<Option<usize>> = vec![None; node_count];
        self.relax(intrinsic, relations, &incoming, &mut cells, &mut best_in, &mut outcome);

        let mut in_path = vec![false; node_count];
        loop {
            let Some(end) = self.best_end(&cells) else {
                break;
            };

            let mut path = vec![end];
            in_path[end] = true;
            let mut stale = false;
            let mut current = end;
            while let Some(relation) = best_in[current] {
                let from = relations[relation].from;
                if cells[from].is_taken() {
                    stale = true;
                    break;
                }
                if in_path[from] {
                    // Cycle left over by a bounded relaxation
                    break;
                }
                in_path[from] = true;
                path.push(from);
                current = from;
            }
            for &node in &path {
                in_path[node] = false;
            }

            if stale {
                outcome.recomputations += 1;
                self.relax(intrinsic, relations, &incoming, &mut cells, &mut best_in, &mut outcome);
                continue;
            }

            path.reverse();
            outcome.values.push(cells[end].state);
            for &node in &path {
                cells[node].set_taken(true);
                cells[node].state = f64::NAN;
            }
            outcome.paths.push(path);
        }

        debug!(
            "Automaton extracted {} paths from {} nodes in {} passes",
            outcome.paths.len(),
            node_count,
            outcome.passes
        );
        outcome
    }

    /// Recomputes the fixed point over the untaken nodes.
    fn relax(
        &self,
        intrinsic: &[Weight],
        relations: &[WeightedRelation],
        incoming: &[Vec<usize>],
        cells: &mut [AutomatonCell],
        best_in: &mut [Option<usize>],
        outcome: &mut AutomatonOutcome,
    ) {
        for (node, cell) in cells.iter_mut().enumerate() {
            best_in[node] = None;
            if !cell.is_taken() {
                cell.state = intrinsic[node];
            }
        }

        let max_iterations = self.config.max_iterations.max(1);
        for _ in 0..max_iterations {
            outcome.passes += 1;
            let mut changed = false;

            for node in 0..cells.len() {
                let own = intrinsic[node];
                if cells[node].is_taken() || own.is_nan() {
                    continue;
                }
                let mut best = own;
                let mut best_relation = None;
                for &index in &incoming[node] {
                    let relation = &relations[index];
                    let from = &cells[relation.from];
                    if from.is_taken() || from.state.is_nan() {
                        continue;
                    }
                    let candidate = own + relation.weight + from.state;
                    if candidate > best {
                        best = candidate;
                        best_relation = Some(index);
                    }
                }
                if best != cells[node].state || best_relation != best_in[node] {
                    cells[node].state = best;
                    best_in[node] = best_relation;
                    changed = true;
                }
            }

            if !changed {
                return;
            }
        }

        outcome.bound_hits += 1;
        warn!(
            "Automaton did not converge within {} iterations; emitting best-effort paths",
            max_iterations
        );
    }

    /// Untaken node with the highest extractable state, lowest index on ties.
    fn best_end(&self, cells: &[AutomatonCell]) -> Option<usize> {
        let mut best: Option<(usize, f64)> = None;
        for (node, cell) in cells.iter().enumerate() {
            if cell.is_taken() || !cell.state.is_finite() || cell.state < self.config.min_state {
                continue;
            }
            match best {
                Some((_, state)) if cell.state <= state => {}
                _ => best = Some((node, cell.state)),
            }
        }
        best.map(|(node, _)| node)
    }
}
