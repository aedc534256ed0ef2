//! Heterogeneous LightGCN recommendation model.
//!
//! One learned embedding table per node type (genre excluded by default),
//! one parameter-free [`BipartiteLightGcn`] step per relation whose
//! endpoints both carry embeddings. A node type's final representation is
//! the sum of its raw embeddings and every convolution output that lands
//! on it. Ratings are scored as the dot product of the movie and user
//! representations at the labeled edge endpoints.

use std::collections::HashMap;

use candle_core::{DType, Device, Result, Tensor, D};
use candle_nn::{Embedding, VarBuilder, VarMap};
use reelgraph_core::{Metadata, ModelConfig, NodeType, RecBatch, Relation};

use crate::conv::BipartiteLightGcn;

pub struct HeteroLightGcn {
    varmap: VarMap,
    device: Device,
    embeddings: HashMap<NodeType, Embedding>,
    relations: Vec<Relation>,
    conv: BipartiteLightGcn,
    num_dim: usize,
}

impl HeteroLightGcn {
    /// Build the model from graph metadata.
    ///
    /// Node types listed in `cfg.exclude_nodes` get no embedding table,
    /// and relations touching them are dropped from propagation entirely.
    pub fn new(metadata: &Metadata, cfg: &ModelConfig, device: &Device) -> Result<Self> {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, device);

        let mut embeddings = HashMap::new();
        for &(ty, count) in &metadata.node_counts {
            if cfg.exclude_nodes.contains(&ty) {
                continue;
            }
            let emb = candle_nn::embedding(count as usize, cfg.num_dim, vb.pp(ty.as_str()))?;
            embeddings.insert(ty, emb);
        }

        let relations = metadata
            .relations
            .iter()
            .copied()
            .filter(|r| embeddings.contains_key(&r.src) && embeddings.contains_key(&r.dst))
            .collect();

        Ok(Self {
            varmap,
            device: device.clone(),
            embeddings,
            relations,
            conv: BipartiteLightGcn::new(),
            num_dim: cfg.num_dim,
        })
    }

    pub fn varmap(&self) -> &VarMap {
        &self.varmap
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    pub fn num_dim(&self) -> usize {
        self.num_dim
    }

    /// Relations the model actually propagates over.
    pub fn relations(&self) -> &[Relation] {
        &self.relations
    }

    fn message_edges<'a>(
        &self,
        relation: Relation,
        batch: &'a RecBatch,
    ) -> Option<&'a reelgraph_core::EdgeIndex> {
        if relation == Relation::RATED_BY {
            Some(&batch.message_index)
        } else if relation == Relation::HAS_GENRE {
            batch.genre_index.as_ref()
        } else {
            None
        }
    }

    /// One propagation round over the batch's message edges.
    ///
    /// Returns, per embedded node type, the raw embedding table plus the
    /// summed neighbor aggregations from every incident relation. A node
    /// with no incident message edges keeps its raw embedding unchanged.
    pub fn propagate(&self, batch: &RecBatch) -> Result<HashMap<NodeType, Tensor>> {
        let mut base = HashMap::new();
        let mut reps = HashMap::new();
        for (&ty, emb) in &self.embeddings {
            base.insert(ty, emb.embeddings().clone());
            reps.insert(ty, emb.embeddings().clone());
        }

        for &relation in &self.relations {
            let Some(edges) = self.message_edges(relation, batch) else {
                continue;
            };
            let (y2x, x2y) = self.conv.forward(&base[&relation.src], &base[&relation.dst], edges)?;
            let src_rep = (&reps[&relation.src] + y2x)?;
            reps.insert(relation.src, src_rep);
            let dst_rep = (&reps[&relation.dst] + x2y)?;
            reps.insert(relation.dst, dst_rep);
        }
        Ok(reps)
    }

    /// Score the batch's labeled `(movie, user)` edges.
    ///
    /// Returns raw logits of shape `(batch,)` plus the propagated node
    /// representations.
    pub fn forward(&self, batch: &RecBatch) -> Result<(Tensor, HashMap<NodeType, Tensor>)> {
        let reps = self.propagate(batch)?;

        let labels = &batch.edge_label_index;
        let movie_ids =
            Tensor::from_vec(labels.src().to_vec(), (labels.len(),), &self.device)?;
        let user_ids = Tensor::from_vec(labels.dst().to_vec(), (labels.len(),), &self.device)?;

        let movies = reps[&NodeType::Movie].index_select(&movie_ids, 0)?;
        let users = reps[&NodeType::User].index_select(&user_ids, 0)?;
        let scores = (movies * users)?.sum(D::Minus1)?;
        Ok((scores, reps))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::IndexOp;
    use reelgraph_core::EdgeIndex;

    fn metadata() -> Metadata {
        Metadata {
            node_counts: vec![
                (NodeType::User, 4),
                (NodeType::Movie, 3),
                (NodeType::Genre, 2),
            ],
            relations: vec![Relation::HAS_GENRE, Relation::RATED_BY],
        }
    }

    fn config(exclude: Vec<NodeType>) -> ModelConfig {
        ModelConfig {
            num_dim: 8,
            exclude_nodes: exclude,
        }
    }

    fn batch() -> RecBatch {
        RecBatch {
            edge_label_index: EdgeIndex::from_unchecked(vec![0, 1, 2], vec![0, 1, 3]),
            labels: vec![1.0, 0.0, 1.0],
            message_index: EdgeIndex::from_unchecked(vec![0, 0, 2], vec![1, 2, 0]),
            genre_index: Some(EdgeIndex::from_unchecked(vec![0, 1], vec![0, 1])),
        }
    }

    #[test]
    fn excluded_type_gets_no_parameters() {
        let device = Device::Cpu;
        let model =
            HeteroLightGcn::new(&metadata(), &config(vec![NodeType::Genre]), &device).unwrap();
        // Only the user and movie tables.
        assert_eq!(model.varmap().all_vars().len(), 2);
        // Relations incident to genre are dropped.
        assert_eq!(model.relations(), &[Relation::RATED_BY]);
    }

    #[test]
    fn no_exclusion_keeps_every_relation() {
        let device = Device::Cpu;
        let model = HeteroLightGcn::new(&metadata(), &config(vec![]), &device).unwrap();
        assert_eq!(model.varmap().all_vars().len(), 3);
        assert_eq!(
            model.relations(),
            &[Relation::HAS_GENRE, Relation::RATED_BY]
        );
        let reps = model.propagate(&batch()).unwrap();
        assert_eq!(reps[&NodeType::Genre].dims(), &[2, 8]);
    }

    #[test]
    fn forward_scores_one_logit_per_label_edge() {
        let device = Device::Cpu;
        device.set_seed(7).unwrap();
        let model =
            HeteroLightGcn::new(&metadata(), &config(vec![NodeType::Genre]), &device).unwrap();

        let (scores, reps) = model.forward(&batch()).unwrap();
        assert_eq!(scores.dims(), &[3]);
        assert_eq!(reps[&NodeType::Movie].dims(), &[3, 8]);
        assert_eq!(reps[&NodeType::User].dims(), &[4, 8]);
        for s in scores.to_vec1::<f32>().unwrap() {
            assert!(s.is_finite());
        }
    }

    #[test]
    fn isolated_node_keeps_its_raw_embedding() {
        let device = Device::Cpu;
        let model =
            HeteroLightGcn::new(&metadata(), &config(vec![NodeType::Genre]), &device).unwrap();

        // Movie 1 has no message edges at all.
        let b = RecBatch {
            edge_label_index: EdgeIndex::from_unchecked(vec![1], vec![0]),
            labels: vec![1.0],
            message_index: EdgeIndex::from_unchecked(vec![0, 2], vec![1, 2]),
            genre_index: None,
        };
        let reps = model.propagate(&b).unwrap();
        let raw = model.varmap().data().lock().unwrap()["movie.weight"]
            .as_tensor()
            .clone();
        let raw_row = raw.i(1).unwrap().to_vec1::<f32>().unwrap();
        let rep_row = reps[&NodeType::Movie].i(1).unwrap().to_vec1::<f32>().unwrap();
        assert_eq!(raw_row, rep_row);
    }

    #[test]
    fn gradients_reach_both_embedding_tables() {
        let device = Device::Cpu;
        let model =
            HeteroLightGcn::new(&metadata(), &config(vec![NodeType::Genre]), &device).unwrap();

        let (scores, _) = model.forward(&batch()).unwrap();
        let loss = scores.sqr().unwrap().mean_all().unwrap();
        let grads = loss.backward().unwrap();
        for var in model.varmap().all_vars() {
            assert!(grads.get(&var).is_some());
        }
    }
}
