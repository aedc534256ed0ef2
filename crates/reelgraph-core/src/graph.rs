//! Heterogeneous bipartite graph data model.
//!
//! The graph holds three typed node sets (user, movie, genre) and typed
//! directed relations between them. Edges only ever connect two distinct
//! node types, so every relation is a bipartite edge set; this is what the
//! degree-normalized convolution in `reelgraph-nn` operates on.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::error::{Error, Result};

/// Node types of the movie/user/genre graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeType {
    User,
    Movie,
    Genre,
}

impl NodeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeType::User => "user",
            NodeType::Movie => "movie",
            NodeType::Genre => "genre",
        }
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A typed directed relation between two node types.
///
/// The supervised relation is `movie -ratedby-> user`; movie/genre
/// membership rides along as `movie -hasgenre-> genre`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Relation {
    pub src: NodeType,
    pub name: &'static str,
    pub dst: NodeType,
}

impl Relation {
    pub const RATED_BY: Relation = Relation {
        src: NodeType::Movie,
        name: "ratedby",
        dst: NodeType::User,
    };

    pub const HAS_GENRE: Relation = Relation {
        src: NodeType::Movie,
        name: "hasgenre",
        dst: NodeType::Genre,
    };
}

impl fmt::Display for Relation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.src, self.name, self.dst)
    }
}

/// A bipartite edge index: parallel source/destination id vectors.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EdgeIndex {
    src: Vec<u32>,
    dst: Vec<u32>,
}

impl EdgeIndex {
    /// Build an edge index, validating endpoint bounds against the two
    /// node-set sizes.
    pub fn new(src: Vec<u32>, dst: Vec<u32>, n_src: u32, n_dst: u32) -> Result<Self> {
        debug_assert_eq!(src.len(), dst.len());
        if let Some(&i) = src.iter().find(|&&i| i >= n_src) {
            return Err(Error::EndpointOutOfBounds {
                node_type: "source",
                index: i,
                count: n_src,
            });
        }
        if let Some(&j) = dst.iter().find(|&&j| j >= n_dst) {
            return Err(Error::EndpointOutOfBounds {
                node_type: "destination",
                index: j,
                count: n_dst,
            });
        }
        Ok(Self { src, dst })
    }

    /// Build without bounds validation. For edge sets derived from an
    /// already-validated index (subsets, flips).
    pub fn from_unchecked(src: Vec<u32>, dst: Vec<u32>) -> Self {
        debug_assert_eq!(src.len(), dst.len());
        Self { src, dst }
    }

    pub fn len(&self) -> usize {
        self.src.len()
    }

    pub fn is_empty(&self) -> bool {
        self.src.is_empty()
    }

    pub fn src(&self) -> &[u32] {
        &self.src
    }

    pub fn dst(&self) -> &[u32] {
        &self.dst
    }

    /// Iterate over `(src, dst)` pairs.
    pub fn pairs(&self) -> impl Iterator<Item = (u32, u32)> + '_ {
        self.src.iter().copied().zip(self.dst.iter().copied())
    }

    /// The reverse view: every edge `(i, j)` becomes `(j, i)`.
    pub fn flipped(&self) -> EdgeIndex {
        EdgeIndex {
            src: self.dst.clone(),
            dst: self.src.clone(),
        }
    }

    /// Select a subset of edges by position. Positions must lie in
    /// `0..len`; callers derive them from this index's own length.
    pub(crate) fn select(&self, positions: &[usize]) -> EdgeIndex {
        debug_assert!(positions.iter().all(|&p| p < self.len()));
        EdgeIndex {
            src: positions.iter().map(|&p| self.src[p]).collect(),
            dst: positions.iter().map(|&p| self.dst[p]).collect(),
        }
    }
}

/// A relation's edges plus optional per-edge labels (the binarized rating
/// on supervised relations).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EdgeStore {
    pub index: EdgeIndex,
    pub labels: Option<Vec<f32>>,
}

/// Node type/counts plus the relation list; what a model needs to size its
/// embedding tables and instantiate one convolution per relation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Metadata {
    pub node_counts: Vec<(NodeType, u32)>,
    pub relations: Vec<Relation>,
}

/// The heterogeneous graph: typed node counts and one edge store per
/// relation.
#[derive(Debug, Clone, Default)]
pub struct HeteroGraph {
    node_counts: HashMap<NodeType, u32>,
    edges: HashMap<Relation, EdgeStore>,
}

impl HeteroGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_node_count(&mut self, ty: NodeType, count: u32) {
        self.node_counts.insert(ty, count);
    }

    pub fn node_count(&self, ty: NodeType) -> u32 {
        self.node_counts.get(&ty).copied().unwrap_or(0)
    }

    /// Insert a relation's edges, validating endpoints against the node
    /// counts registered for the relation's endpoint types.
    pub fn insert_edges(
        &mut self,
        relation: Relation,
        src: Vec<u32>,
        dst: Vec<u32>,
        labels: Option<Vec<f32>>,
    ) -> Result<()> {
        let index = EdgeIndex::new(
            src,
            dst,
            self.node_count(relation.src),
            self.node_count(relation.dst),
        )?;
        if let Some(ref l) = labels {
            debug_assert_eq!(l.len(), index.len());
        }
        self.edges.insert(relation, EdgeStore { index, labels });
        Ok(())
    }

    pub fn edges(&self, relation: Relation) -> Option<&EdgeStore> {
        self.edges.get(&relation)
    }

    pub fn relations(&self) -> impl Iterator<Item = Relation> + '_ {
        let mut rels: Vec<Relation> = self.edges.keys().copied().collect();
        rels.sort();
        rels.into_iter()
    }

    pub fn metadata(&self) -> Metadata {
        let mut node_counts: Vec<(NodeType, u32)> =
            self.node_counts.iter().map(|(&t, &c)| (t, c)).collect();
        node_counts.sort_by_key(|(t, _)| *t);
        Metadata {
            node_counts,
            relations: self.relations().collect(),
        }
    }
}
