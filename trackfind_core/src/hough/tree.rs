//! Iterative quad-tree search.
//!
//! Nodes live in an arena indexed by id; a work stack of `(node, level)`
//! pairs replaces recursion. Children are pushed so that the best supported
//! one is processed next, which makes the search greedy: the first leaf
//! reaching `max_level` claims its items and later boxes are recounted
//! without them.

use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use tracing::{debug, warn};

use super::{HoughBox, HoughItem};

/// Configuration for the QuadTreeSearch
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QuadTreeConfig {
    /// Depth of the leaves; the root has level 0
    pub max_level: usize,

    /// Smallest support of a box worth refining
    pub min_hits: usize,

    /// Fraction by which child boxes are grown for the membership test
    pub overlap: f64,

    /// Budget of processed nodes per search
    pub max_nodes: usize,

    /// Stop after this many seeds (None = exhaust the tree)
    pub max_seeds: Option<usize>,
}

impl Default for QuadTreeConfig {
    fn default() -> Self {
        Self {
            max_level: 9,
            min_hits: 8,
            overlap: 0.2,
            max_nodes: 200_000,
            max_seeds: None,
        }
    }
}

/// A leaf box with enough support.
#[derive(Debug, Clone, PartialEq)]
pub struct Seed {
    /// Indices of the claimed items, ascending
    pub items: Vec<usize>,
    pub bounds: HoughBox,
    /// Summed item weight
    pub weight: usize,
}

/// Result of one search.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HoughOutcome {
    pub seeds: Vec<Seed>,
    /// Processed nodes
    pub nodes: usize,
    /// True if the search stopped at `max_nodes`
    pub budget_exhausted: bool,
}

struct QuadNode {
    bounds: HoughBox,
    items: Vec<usize>,
}

/// Greedy quad-tree search over hough items.
#[derive(Debug, Clone, Default)]
pub struct QuadTreeSearch {
    config: QuadTreeConfig,
}

impl QuadTreeSearch {
    pub fn new(config: QuadTreeConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &QuadTreeConfig {
        &self.config
    }

    /// Searches `root` for seeds.
    ///
    /// `taken` flags items already claimed; items of new seeds are flagged
    /// as they are found.
    pub fn search<I: HoughItem>(&self, root: HoughBox, items: &[I], taken: &mut [bool]) -> HoughOutcome {
        let mut outcome = HoughOutcome::default();
        let support = |ids: &[usize]| ids.iter().map(|&i| items[i].weight()).sum::<usize>();

        let root_items: Vec<usize> = (0..items.len())
            .filter(|&i| !taken[i] && items[i].in_box(&root))
            .collect();
        let mut arena = vec![QuadNode {
            bounds: root,
            items: root_items,
        }];
        let mut stack: Vec<(usize, usize)> = vec![(0, 0)];

        while let Some((id, level)) = stack.pop() {
            if outcome.nodes >= self.config.max_nodes {
                warn!(
                    "Quad tree node budget of {} exhausted, {} boxes left unvisited",
                    self.config.max_nodes,
                    stack.len() + 1
                );
                outcome.budget_exhausted = true;
                break;
            }
            outcome.nodes += 1;

            let mut node_items = std::mem::take(&mut arena[id].items);
            node_items.retain(|&i| !taken[i]);
            let weight = support(&node_items);
            if weight < self.config.min_hits.max(1) {
                continue;
            }

            let bounds = arena[id].bounds;
            if level >= self.config.max_level {
                for &i in &node_items {
                    taken[i] = true;
                }
                outcome.seeds.push(Seed {
                    items: node_items,
                    bounds,
                    weight,
                });
                if self.config.max_seeds.is_some_and(|max| outcome.seeds.len() >= max) {
                    break;
                }
                continue;
            }

            let mut children: Vec<(usize, usize, QuadNode)> = Vec::with_capacity(4);
            for (quadrant, child) in bounds.split().into_iter().enumerate() {
                let probe = child.expanded(self.config.overlap);
                let child_items: Vec<usize> = node_items
                    .iter()
                    .copied()
                    .filter(|&i| items[i].in_box(&probe))
                    .collect();
                let child_weight = support(&child_items);
                if child_weight >= self.config.min_hits.max(1) {
                    children.push((
                        child_weight,
                        quadrant,
                        QuadNode {
                            bounds: child,
                            items: child_items,
                        },
                    ));
                }
            }

            // Last pushed is processed first: highest support, then lowest quadrant
            children.sort_by_key(|(w, q, _)| (*w, Reverse(*q)));
            for (_, _, child) in children {
                arena.push(child);
                stack.push((arena.len() - 1, level + 1));
            }
        }

        debug!(
            "Quad tree search: {} nodes, {} seeds",
            outcome.nodes,
            outcome.seeds.len()
        );
        outcome
    }
}
