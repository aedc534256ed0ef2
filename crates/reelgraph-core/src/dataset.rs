//! Dataset assembly and supervised edge splits.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;

use crate::batch::BatchIter;
use crate::config::DataConfig;
use crate::error::{Error, Result};
use crate::graph::{EdgeIndex, HeteroGraph, Metadata, Relation};
use crate::ratings::RatingTable;

/// One split of the supervised relation: labeled edges only.
#[derive(Debug, Clone)]
pub struct SupervisedSplit {
    pub index: EdgeIndex,
    pub labels: Vec<f32>,
}

impl SupervisedSplit {
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

/// The full dataset: the heterogeneous graph plus disjoint train/val/test
/// splits over the supervised `movie -ratedby-> user` edges.
#[derive(Debug, Clone)]
pub struct RecDataset {
    graph: HeteroGraph,
    pub train: SupervisedSplit,
    pub val: SupervisedSplit,
    pub test: SupervisedSplit,
}

impl RecDataset {
    /// Ingest the CSV files and split the supervised edges with a seeded
    /// shuffle. Ratios come from the config; the remainder is the training
    /// split.
    pub fn build(config: &DataConfig, rng: &mut StdRng) -> Result<Self> {
        let table = RatingTable::from_csv(
            &config.ratings,
            config.movies.as_deref(),
            config.binarize_threshold,
        )?;
        let graph = table.into_graph()?;
        Self::from_graph(graph, config.val_ratio, config.test_ratio, rng)
    }

    /// Split an already-assembled graph. Exposed separately so tests can
    /// build toy graphs without CSV fixtures.
    pub fn from_graph(
        graph: HeteroGraph,
        val_ratio: f32,
        test_ratio: f32,
        rng: &mut StdRng,
    ) -> Result<Self> {
        if val_ratio + test_ratio >= 1.0 {
            return Err(Error::InvalidSplit {
                val: val_ratio,
                test: test_ratio,
            });
        }
        let store = graph
            .edges(Relation::RATED_BY)
            .ok_or_else(|| Error::Dataset("graph has no supervised edges".into()))?;
        let labels = store
            .labels
            .as_ref()
            .ok_or_else(|| Error::Dataset("supervised edges carry no labels".into()))?;

        let n = store.index.len();
        let mut order: Vec<usize> = (0..n).collect();
        order.shuffle(rng);

        let n_val = (n as f32 * val_ratio).round() as usize;
        let n_test = (n as f32 * test_ratio).round() as usize;
        if n_val + n_test >= n {
            return Err(Error::Dataset(format!(
                "split leaves no training edges ({n} total, {n_val} val, {n_test} test)"
            )));
        }

        let take = |positions: &[usize]| SupervisedSplit {
            index: store.index.select(positions),
            labels: positions.iter().map(|&p| labels[p]).collect(),
        };

        let val = take(&order[..n_val]);
        let test = take(&order[n_val..n_val + n_test]);
        let train = take(&order[n_val + n_test..]);

        Ok(Self {
            graph,
            train,
            val,
            test,
        })
    }

    pub fn graph(&self) -> &HeteroGraph {
        &self.graph
    }

    pub fn metadata(&self) -> Metadata {
        self.graph.metadata()
    }

    /// Minibatch iterator over a split's labeled edges. Message-passing
    /// edges come from the training split, with each batch's own label
    /// edges masked out.
    pub fn loader<'a>(
        &'a self,
        split: &'a SupervisedSplit,
        batch_size: usize,
        shuffle: bool,
        rng: &mut StdRng,
    ) -> BatchIter<'a> {
        BatchIter::new(self, split, batch_size, shuffle, rng)
    }

    /// Verify the three splits share no labeled edge. The split
    /// construction guarantees this for distinct edge positions; duplicate
    /// ratings in the input could still alias, which this catches.
    pub fn assert_no_overlap(&self) -> Result<()> {
        use std::collections::HashSet;
        let train: HashSet<(u32, u32)> = self.train.index.pairs().collect();
        let val: HashSet<(u32, u32)> = self.val.index.pairs().collect();
        let test: HashSet<(u32, u32)> = self.test.index.pairs().collect();

        let tv = train.intersection(&val).count();
        let tt = train.intersection(&test).count();
        if tv > 0 || tt > 0 {
            return Err(Error::Dataset(format!(
                "split overlap: {tv} train/val edges, {tt} train/test edges"
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::NodeType;
    use rand::SeedableRng;

    pub(crate) fn toy_graph(n_edges: usize) -> HeteroGraph {
        let n_movies = 10u32;
        let n_users = 8u32;
        let mut g = HeteroGraph::new();
        g.set_node_count(NodeType::Movie, n_movies);
        g.set_node_count(NodeType::User, n_users);
        g.set_node_count(NodeType::Genre, 0);

        // Distinct (movie, user) pairs so overlap checking is meaningful.
        let src: Vec<u32> = (0..n_edges).map(|i| (i as u32) % n_movies).collect();
        let dst: Vec<u32> = (0..n_edges)
            .map(|i| ((i as u32) / n_movies) % n_users)
            .collect();
        let labels: Vec<f32> = (0..n_edges).map(|i| (i % 2) as f32).collect();
        g.insert_edges(Relation::RATED_BY, src, dst, Some(labels))
            .unwrap();
        g
    }

    #[test]
    fn split_sizes_follow_ratios() {
        let mut rng = StdRng::seed_from_u64(0);
        let ds = RecDataset::from_graph(toy_graph(50), 0.2, 0.1, &mut rng).unwrap();
        assert_eq!(ds.val.len(), 10);
        assert_eq!(ds.test.len(), 5);
        assert_eq!(ds.train.len(), 35);
    }

    #[test]
    fn splits_are_disjoint() {
        let mut rng = StdRng::seed_from_u64(7);
        let ds = RecDataset::from_graph(toy_graph(60), 0.25, 0.25, &mut rng).unwrap();
        ds.assert_no_overlap().unwrap();
    }

    #[test]
    fn degenerate_split_is_rejected() {
        let mut rng = StdRng::seed_from_u64(0);
        let err = RecDataset::from_graph(toy_graph(4), 0.5, 0.5, &mut rng).unwrap_err();
        assert!(matches!(
            err,
            Error::InvalidSplit { .. } | Error::Dataset(_)
        ));
    }

    #[test]
    fn same_seed_same_split() {
        let mut a = StdRng::seed_from_u64(42);
        let mut b = StdRng::seed_from_u64(42);
        let da = RecDataset::from_graph(toy_graph(30), 0.2, 0.2, &mut a).unwrap();
        let db = RecDataset::from_graph(toy_graph(30), 0.2, 0.2, &mut b).unwrap();
        assert_eq!(da.train.index, db.train.index);
        assert_eq!(da.val.index, db.val.index);
    }
}
