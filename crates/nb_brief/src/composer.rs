use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use chrono::{Local, Utc};
use nb_cluster::ViewCluster;
use nb_core::{GenerationParams, LanguageModel, NewsBrief, Result, ServiceConfig, UnitOfWork};
use tracing::{debug, error, info, warn};

use crate::insights::{build_prompt, digest, fallback_insights, parse_insights};
use crate::render::render_brief;
use crate::summary::{overall_label, ClusterSummary};

/// Turns view-mode clusters into a stored, written markdown brief.
pub struct BriefComposer {
    model: Arc<dyn LanguageModel>,
    params: GenerationParams,
}

impl fmt::Debug for BriefComposer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BriefComposer")
            .field("model", &self.model.name())
            .field("params", &self.params)
            .finish()
    }
}

impl BriefComposer {
    pub fn new(config: &ServiceConfig, model: Arc<dyn LanguageModel>) -> Self {
        Self {
            model,
            params: config.insight_params,
        }
    }

    /// Asks the model for cross-cluster insights. A failed call yields the
    /// canned fallback; no clusters yields nothing.
    pub async fn generate_insights(&self, summaries: &[ClusterSummary]) -> Vec<String> {
        if summaries.is_empty() {
            return Vec::new();
        }

        let label = overall_label(summaries);
        let prompt = match digest(summaries) {
            Ok(digest) => build_prompt(label, &digest),
            Err(e) => {
                warn!("Could not build cluster digest: {}", e);
                return fallback_insights(label);
            }
        };

        info!("💡 Generating insights with {}", self.model.name());
        match self.model.generate(&prompt, &self.params).await {
            Ok(text) => {
                debug!("Raw insights response:\n{}", text);
                parse_insights(&text)
            }
            Err(e) => {
                error!("❌ Error generating insights: {}", e);
                fallback_insights(label)
            }
        }
    }

    /// Renders the brief for `clusters`, stores it and writes it to
    /// `output_path`, all or nothing. The document is staged next to the
    /// target and only renamed over it once the record has committed, so a
    /// failed write or commit leaves both the store and any previous brief
    /// untouched.
    pub async fn compose(
        &self,
        uow: &mut dyn UnitOfWork,
        clusters: &[ViewCluster],
        output_path: &Path,
    ) -> Result<NewsBrief> {
        let summaries: Vec<ClusterSummary> = clusters.iter()
            .filter_map(ClusterSummary::from_cluster)
            .collect();
        let insights = self.generate_insights(&summaries).await;
        let content = render_brief(Local::now().date_naive(), &insights, &summaries);

        let brief = NewsBrief {
            filename: output_path.display().to_string(),
            content,
            article_count: clusters.iter().map(ViewCluster::len).sum(),
            cluster_count: clusters.len(),
            created_at: Utc::now(),
        };

        let staging = staging_path(output_path);
        uow.begin().await?;
        let result = match persist(uow, &brief, &staging).await {
            Ok(()) => uow.commit().await,
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            error!("❌ Error generating news brief: {}", e);
            if let Err(rollback) = uow.rollback().await {
                warn!("Rollback failed: {}", rollback);
            }
            discard(&staging).await;
            return Err(e);
        }

        if let Err(e) = tokio::fs::rename(&staging, output_path).await {
            error!("❌ Brief stored but could not be moved to {}: {}", output_path.display(), e);
            discard(&staging).await;
            return Err(e.into());
        }

        info!("📝 News brief saved to {}", output_path.display());
        Ok(brief)
    }
}

async fn persist(uow: &mut dyn UnitOfWork, brief: &NewsBrief, staging: &Path) -> Result<()> {
    uow.insert_brief(brief).await?;
    tokio::fs::write(staging, &brief.content).await?;
    Ok(())
}

/// `news_brief.md` -> `news_brief.md.tmp`, in the same directory so the
/// final rename stays on one filesystem.
fn staging_path(output_path: &Path) -> PathBuf {
    let mut name = output_path
        .file_name()
        .map(OsString::from)
        .unwrap_or_else(|| OsString::from("brief"));
    name.push(".tmp");
    output_path.with_file_name(name)
}

async fn discard(staging: &Path) {
    match tokio::fs::remove_file(staging).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("Could not remove {}: {}", staging.display(), e),
    }
}
