//! Clustering of neighbouring wire hits.
//!
//! A cluster is a connected component of the wire neighbourhood graph of one
//! superlayer: hits on the same layer within one wire of each other, or on an
//! adjacent layer within the configured wire window.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use trackfind_env::WireGeometry;

use crate::hits::{CellTable, HitId, HitStore};

/// Configuration for the Clusterizer
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    /// Clusters with fewer hits are tagged as background
    pub min_cluster_size: usize,

    /// Clusters whose mean drift length exceeds this fraction of the cell
    /// width are tagged as background
    pub max_mean_drift: f64,

    /// Wire window towards adjacent layers
    pub wire_window: u16,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            min_cluster_size: 3,
            max_mean_drift: 0.45, // track hits average a quarter cell
            wire_window: 1,
        }
    }
}

/// Connected hits of one superlayer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Cluster {
    pub superlayer: u8,

    /// Members, ascending
    pub hits: Vec<HitId>,

    /// Tagged as background by the cluster filter
    pub background: bool,
}

impl Cluster {
    pub fn len(&self) -> usize {
        self.hits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }
}

/// Groups hits into clusters and tags background clusters.
#[derive(Debug, Clone, Default)]
pub struct Clusterizer {
    config: ClusterConfig,
}

impl Clusterizer {
    pub fn new(config: ClusterConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ClusterConfig {
        &self.config
    }

    /// Clusters every superlayer. Hits of background clusters get their
    /// cell's background flag set.
    pub fn clusterize(
        &self,
        store: &HitStore,
        geometry: &dyn WireGeometry,
        cells: &mut CellTable,
    ) -> Vec<Cluster> {
        let mut clusters = Vec::new();
        let mut visited = vec![false; store.len()];

        for superlayer in 0..geometry.superlayer_count() {
            let wire_count = geometry.wire_count(superlayer);
            let layer_count = geometry.layer_count(superlayer);
            let cell_width = geometry.cell_width(superlayer);

            for seed in store.superlayer_hits(superlayer) {
                if visited[seed.id.index()] {
                    continue;
                }
                visited[seed.id.index()] = true;

                let mut members = Vec::new();
                let mut queue = VecDeque::from([seed.id]);
                while let Some(id) = queue.pop_front() {
                    members.push(id);
                    let hit = store.get(id);
                    let layer = hit.layer();

                    let mut neighbours = store.hits_near(superlayer, layer, hit.wire.wire, 1, wire_count);
                    if layer > 0 {
                        neighbours.extend(store.hits_near(
                            superlayer,
                            layer - 1,
                            hit.wire.wire,
                            self.config.wire_window,
                            wire_count,
                        ));
                    }
                    if layer + 1 < layer_count {
                        neighbours.extend(store.hits_near(
                            superlayer,
                            layer + 1,
                            hit.wire.wire,
                            self.config.wire_window,
                            wire_count,
                        ));
                    }

                    for next in neighbours {
                        if !visited[next.index()] {
                            visited[next.index()] = true;
                            queue.push_back(next);
                        }
                    }
                }
                members.sort_unstable();

                let mean_drift = members
                    .iter()
                    .map(|&id| store.get(id).drift_length)
                    .sum::<f64>()
                    / members.len() as f64;
                let background = members.len() < self.config.min_cluster_size
                    || mean_drift > self.config.max_mean_drift * cell_width;

                if background {
                    for &id in &members {
                        cells.get_mut(id).set_background(true);
                    }
                }

                clusters.push(Cluster {
                    superlayer,
                    hits: members,
                    background,
                });
            }
        }

        clusters
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trackfind_env::{CylindricalGeometry, RawHit, WireId};

    fn run(raw: &[RawHit], config: ClusterConfig) -> (Vec<Cluster>, CellTable) {
        let geometry = CylindricalGeometry::default();
        let store = HitStore::build(&raw.to_vec(), &geometry).unwrap();
        let mut cells = CellTable::new(store.len());
        let clusters = Clusterizer::new(config).clusterize(&store, &geometry, &mut cells);
        (clusters, cells)
    }

    #[test]
    fn test_empty_input() {
        let (clusters, _) = run(&[], ClusterConfig::default());
        assert!(clusters.is_empty());
    }

    #[test]
    fn test_two_separate_clusters() {
        let mut raw = crate::hits::tests::column(0, 10, 6);
        raw.extend(crate::hits::tests::column(0, 60, 4));
        let (clusters, cells) = run(&raw, ClusterConfig::default());

        assert_eq!(clusters.len(), 2);
        assert_eq!(clusters[0].len(), 6);
        assert_eq!(clusters[1].len(), 4);
        assert!(clusters.iter().all(|c| !c.background));
        assert!(cells.untaken().all(|id| cells.is_available(id)));
    }

    #[test]
    fn test_cluster_never_spans_superlayers() {
        let mut raw = crate::hits::tests::column(0, 10, 6);
        raw.extend(crate::hits::tests::column(1, 10, 6));
        let (clusters, _) = run(&raw, ClusterConfig::default());

        assert_eq!(clusters.len(), 2);
        assert_eq!(clusters[0].superlayer, 0);
        assert_eq!(clusters[1].superlayer, 1);
    }

    #[test]
    fn test_wrap_around_neighbours() {
        let raw = vec![
            RawHit::new(WireId::new(0, 0, 0), 0.1),
            RawHit::new(WireId::new(0, 0, 159), 0.1),
            RawHit::new(WireId::new(0, 1, 159), 0.1),
        ];
        let (clusters, _) = run(&raw, ClusterConfig::default());
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].len(), 3);
    }

    #[test]
    fn test_small_cluster_is_background() {
        let raw = vec![RawHit::new(WireId::new(2, 3, 40), 0.1)];
        let (clusters, cells) = run(&raw, ClusterConfig::default());
        assert!(clusters[0].background);
        assert!(cells.get(HitId(0)).is_background());
    }

    #[test]
    fn test_wide_drift_cluster_is_background() {
        let raw: Vec<RawHit> = (0..4)
            .map(|layer| RawHit::new(WireId::new(0, layer, 5), 0.6))
            .collect();
        let (clusters, _) = run(&raw, ClusterConfig::default());
        // 0.6 cm is beyond 45% of the 0.63 cm cell
        assert!(clusters[0].background);
    }
}
