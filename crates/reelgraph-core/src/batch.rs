//! Minibatch iteration over labeled edges.
//!
//! A batch carries the labeled edge subset to score plus the
//! message-passing view of the graph for that step: the training edges of
//! the supervised relation with the batch's own label edges removed (so a
//! label edge never leaks its own existence as a message), and the
//! auxiliary relation edges unchanged.

use std::collections::HashSet;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;

use crate::dataset::{RecDataset, SupervisedSplit};
use crate::graph::{EdgeIndex, Relation};

/// One minibatch of supervised edges.
#[derive(Debug, Clone)]
pub struct RecBatch {
    /// Labeled edges to score: `(movie, user)` pairs.
    pub edge_label_index: EdgeIndex,
    /// Binarized rating per labeled edge.
    pub labels: Vec<f32>,
    /// Message-passing edges for the supervised relation.
    pub message_index: EdgeIndex,
    /// Message-passing edges for `movie -hasgenre-> genre`, if present.
    pub genre_index: Option<EdgeIndex>,
}

/// Iterator of [`RecBatch`]es over one split.
pub struct BatchIter<'a> {
    dataset: &'a RecDataset,
    split: &'a SupervisedSplit,
    order: Vec<usize>,
    batch_size: usize,
    cursor: usize,
}

impl<'a> BatchIter<'a> {
    pub(crate) fn new(
        dataset: &'a RecDataset,
        split: &'a SupervisedSplit,
        batch_size: usize,
        shuffle: bool,
        rng: &mut StdRng,
    ) -> Self {
        let mut order: Vec<usize> = (0..split.len()).collect();
        if shuffle {
            order.shuffle(rng);
        }
        Self {
            dataset,
            split,
            order,
            batch_size,
            cursor: 0,
        }
    }

    /// Number of batches this iterator will yield.
    pub fn num_batches(&self) -> usize {
        self.order.len().div_ceil(self.batch_size)
    }

    fn message_edges_excluding(&self, label_index: &EdgeIndex) -> EdgeIndex {
        let excluded: HashSet<(u32, u32)> = label_index.pairs().collect();
        let train = &self.dataset.train.index;
        let mut src = Vec::with_capacity(train.len());
        let mut dst = Vec::with_capacity(train.len());
        for (s, d) in train.pairs() {
            if !excluded.contains(&(s, d)) {
                src.push(s);
                dst.push(d);
            }
        }
        EdgeIndex::from_unchecked(src, dst)
    }
}

impl<'a> Iterator for BatchIter<'a> {
    type Item = RecBatch;

    fn next(&mut self) -> Option<RecBatch> {
        if self.cursor >= self.order.len() {
            return None;
        }
        let end = (self.cursor + self.batch_size).min(self.order.len());
        let positions = &self.order[self.cursor..end];
        self.cursor = end;

        let edge_label_index = self.split.index.select(positions);
        let labels = positions.iter().map(|&p| self.split.labels[p]).collect();
        let message_index = self.message_edges_excluding(&edge_label_index);
        let genre_index = self
            .dataset
            .graph()
            .edges(Relation::HAS_GENRE)
            .map(|store| store.index.clone());

        Some(RecBatch {
            edge_label_index,
            labels,
            message_index,
            genre_index,
        })
    }
}
