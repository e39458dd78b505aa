//! Markdown news briefs from clustered articles.

pub mod composer;
pub mod insights;
pub mod render;
pub mod summary;

pub use composer::BriefComposer;
pub use summary::ClusterSummary;
