use anyhow::Context;
use clap::{Parser, Subcommand};
use nb_cluster::{ClusterEngine, ClusterParams};
use nb_core::config::DEFAULT_ANALYSIS_MODEL;
use nb_core::{EmbeddingFallback, NewArticle, ServiceConfig, UnitOfWork};
use nb_inference::{create_models, Provider};
use std::path::{Path, PathBuf};
use tokio::sync::watch;
use tracing::{error, info, warn};

mod duration;
mod logging;
mod pipeline;

use duration::HumanDuration;
use pipeline::{Pipeline, RunSummary, DEFAULT_ANALYZE_LIMIT};

#[derive(Parser, Debug)]
#[command(author, version, about = "Analyze, cluster and summarize news articles", long_about = None)]
pub struct Cli {
    /// Record store: `memory`, or a SQLite database such as `sqlite:news.db`
    #[arg(long, env = "DATABASE_URL", default_value = "sqlite:news.db")]
    storage: String,
    #[arg(long, env = "NB_PROVIDER", default_value = "gemini", help = "Model provider. Available providers: gemini (default), dummy")]
    provider: Provider,
    #[arg(long, env = "GEMINI_API_KEY", hide_env_values = true)]
    api_key: Option<String>,
    /// Override the generative-language API base URL
    #[arg(long)]
    base_url: Option<String>,
    #[arg(long, default_value = DEFAULT_ANALYSIS_MODEL)]
    model: String,
    /// What to do when embedding fails: random or unavailable
    #[arg(long, default_value = "random")]
    embedding_fallback: EmbeddingFallback,
    #[arg(short, long)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Load articles from a JSON array produced by a fetcher
    Import {
        file: PathBuf,
    },
    /// Analyze pending articles
    Analyze {
        #[arg(long, default_value_t = DEFAULT_ANALYZE_LIMIT)]
        limit: usize,
    },
    /// Run a persisted clustering pass
    Cluster {
        #[arg(long, default_value_t = 10)]
        min_articles: usize,
        #[arg(long, default_value_t = 0.2)]
        eps: f64,
        #[arg(long, default_value_t = 3)]
        min_samples: usize,
    },
    /// Compose a news brief from the current analyses
    Brief {
        #[arg(long, env = "OUTPUT_FILE", default_value = "news_brief.md")]
        output: PathBuf,
    },
    /// Run analyze, cluster and brief in order
    Run {
        /// Repeat with this interval (e.g. 1h, 30m, 1d, 1h15m30s; a plain number is hours)
        #[arg(long, env = "SCHEDULE_INTERVAL")]
        interval: Option<HumanDuration>,
        #[arg(long, env = "OUTPUT_FILE", default_value = "news_brief.md")]
        output: PathBuf,
    },
    /// Print the latest brief
    Show,
}

impl Cli {
    fn service_config(&self) -> nb_core::Result<ServiceConfig> {
        let mut config = ServiceConfig::default()
            .with_model_name(&self.model)
            .with_embedding_fallback(self.embedding_fallback);
        if let Some(key) = &self.api_key {
            config = config.with_api_key(key.clone());
        }
        if let Some(url) = &self.base_url {
            config = config.with_base_url(url)?;
        }
        Ok(config)
    }

    fn pipeline(&self) -> anyhow::Result<Pipeline> {
        let config = self.service_config()?;
        let models = create_models(&config, self.provider)
            .with_context(|| format!("initializing {:?} provider", self.provider))?;
        info!("🧠 Models initialized (using {})", models.language.name());
        Ok(Pipeline::new(&config, &models))
    }
}

async fn import(uow: &mut dyn UnitOfWork, file: &Path) -> anyhow::Result<usize> {
    let raw = tokio::fs::read_to_string(file)
        .await
        .with_context(|| format!("reading {}", file.display()))?;
    let articles: Vec<NewArticle> = serde_json::from_str(&raw)
        .with_context(|| format!("parsing {}", file.display()))?;

    let mut imported = 0;
    for article in &articles {
        match uow.insert_article(article).await {
            Ok(id) => {
                imported += 1;
                info!("📥 Imported article {}: {}", id, article.title);
            }
            Err(e) => warn!("⚠️ Skipping {}: {}", article.url, e),
        }
    }
    Ok(imported)
}

fn report(summary: &RunSummary) {
    println!("Analyzed {} articles", summary.analyzed);
    println!("Clustering: {}", summary.clustering.status);
    match &summary.brief {
        Some(path) => println!("Brief written to {}", path.display()),
        None => println!("No brief generated"),
    }
}

/// Flips to `true` on Ctrl-C. Checked only between pipeline runs.
fn shutdown_signal() -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("👋 Shutdown requested, finishing current run");
                let _ = tx.send(true);
            }
            Err(e) => {
                warn!("Could not listen for Ctrl-C: {}", e);
                // keep the sender alive so receivers keep waiting
                std::future::pending::<()>().await;
            }
        }
    });
    rx
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init_logging(cli.verbose);

    let store = nb_storage::create_store(&cli.storage)
        .await
        .with_context(|| format!("opening storage '{}'", cli.storage))?;
    info!("✨ Storage initialized (using {})", store.name());
    let mut uow = store.unit_of_work().await?;

    match &cli.command {
        Commands::Import { file } => {
            let imported = import(uow.as_mut(), file).await?;
            println!("Imported {} articles", imported);
        }
        Commands::Analyze { limit } => {
            let pipeline = cli.pipeline()?;
            let analyzed = pipeline.analyze_batch(uow.as_mut(), *limit).await?;
            println!("Analyzed {} articles", analyzed);
        }
        Commands::Cluster { min_articles, eps, min_samples } => {
            let params = ClusterParams {
                min_articles: *min_articles,
                eps: *eps,
                min_samples: *min_samples,
            };
            let stats = ClusterEngine::new().run(uow.as_mut(), &params).await;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
        Commands::Brief { output } => {
            let pipeline = cli.pipeline()?;
            let path = pipeline.compose_brief(uow.as_mut(), output).await?;
            println!("Brief written to {}", path.display());
        }
        Commands::Run { interval, output } => {
            let pipeline = cli.pipeline()?;
            match interval {
                None => report(&pipeline.run_once(uow.as_mut(), output).await?),
                Some(interval) => {
                    info!("⏰ Running every {}", interval);
                    let mut shutdown = shutdown_signal();
                    loop {
                        match pipeline.run_once(uow.as_mut(), output).await {
                            Ok(summary) => report(&summary),
                            Err(e) => error!("❌ Pipeline run failed: {}", e),
                        }
                        if *shutdown.borrow() {
                            break;
                        }
                        info!("Waiting {} before next run", interval);
                        tokio::select! {
                            _ = tokio::time::sleep(interval.0) => {}
                            Ok(()) = shutdown.changed() => {}
                        }
                        if *shutdown.borrow() {
                            break;
                        }
                    }
                    info!("👋 Scheduler stopped");
                }
            }
        }
        Commands::Show => match uow.latest_brief().await? {
            Some(brief) => print!("{}", brief.content),
            None => println!("No brief generated yet"),
        },
    }

    Ok(())
}
