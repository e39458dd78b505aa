//! Density-based grouping of analyzed articles.

pub mod dbscan;
pub mod engine;
pub mod naming;
pub mod similarity;

pub use engine::{
    ClusterEngine, ClusterParams, ClusterStats, ClusterStatus, ClusteredArticle, ViewCluster,
};
pub use naming::{name_cluster, ClusterLabel};
