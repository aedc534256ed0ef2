//! Neural components of the reelgraph recommender.
//!
//! Built on candle: a parameter-free bipartite LightGCN convolution, the
//! heterogeneous model that stacks it over the movie/user/genre graph,
//! the binary cross-entropy training loss, and the evaluation metrics.

pub mod conv;
pub mod loss;
pub mod metrics;
pub mod model;

pub use conv::{edge_norms, BipartiteLightGcn};
pub use loss::bce_with_logits;
pub use metrics::{classification_metrics, EvalReport};
pub use model::HeteroLightGcn;
