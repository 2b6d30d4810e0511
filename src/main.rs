use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use trendscope::analytics::{
    detect_series_crossovers, ChangepointDetector, ForecastResponse, Forecaster, SignalBuilder,
};
use trendscope::config::Config;
use trendscope::embedding::{EmbeddingProvider, HashingEmbedder};
use trendscope::models::{load_records, PaperRecord};
use trendscope::network::NetworkAnalyzer;
use trendscope::report::ReportBuilder;
use trendscope::topics::{Document, TopicModeler};

#[derive(Parser)]
#[command(
    name = "trendscope",
    version,
    about = "Research trend analytics: changepoints, crossovers, forecasts, topics and networks",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Paper records (JSON array or JSON Lines)
    #[arg(short, long, global = true, default_value = "papers.json")]
    input: PathBuf,

    /// TOML configuration file (environment variables are used otherwise)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log format (text, json)
    #[arg(long, global = true, default_value = "text")]
    log_format: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the per-topic activity series
    Signals,

    /// Detect validated changepoints
    Changepoints {
        /// Restrict to one topic
        #[arg(short, long)]
        topic: Option<String>,
    },

    /// Detect where one topic overtakes another
    Crossovers {
        /// First topic
        #[arg(long)]
        topic_a: String,

        /// Second topic
        #[arg(long)]
        topic_b: String,
    },

    /// Forecast topic activity
    Forecast {
        /// Restrict to one topic
        #[arg(short, long)]
        topic: Option<String>,

        /// Number of future periods (configured horizon by default)
        #[arg(short, long)]
        periods: Option<usize>,
    },

    /// Analyze co-authorship and citation networks
    Network {
        /// Include the community partition
        #[arg(long)]
        communities: bool,
    },

    /// Train a topic model over titles and abstracts
    Topics {
        /// Use the sentence-transformer embedder instead of feature hashing
        #[cfg(feature = "bert")]
        #[arg(long)]
        bert: bool,
    },

    /// Build the combined insight report
    Report,
}

fn setup_tracing(format: &str, verbose: bool) -> Result<()> {
    let env_filter = if verbose {
        tracing_subscriber::EnvFilter::new("trendscope=debug,info")
    } else {
        tracing_subscriber::EnvFilter::new("trendscope=info,warn")
    };

    match format {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty().with_writer(std::io::stderr))
                .init();
        }
    }

    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    let config = match path {
        Some(path) => Config::from_file(path)?,
        None => Config::from_env()?,
    };
    config.validate()?;
    Ok(config)
}

fn load_papers(path: &Path) -> Result<Vec<PaperRecord>> {
    let papers = load_records(path)
        .with_context(|| format!("Failed to load paper records: {}", path.display()))?;
    tracing::info!(papers = papers.len(), path = %path.display(), "Loaded paper records");
    Ok(papers)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Run CPU-bound analytics off the async runtime
async fn blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .context("Analytics task panicked")?
}

fn changepoints(config: &Config, papers: &[PaperRecord], topic: Option<&str>) -> Result<serde_json::Value> {
    let detector = ChangepointDetector::new(config.changepoint.clone());
    let mut signals = SignalBuilder::from_config(&config.signal).build(papers);
    if let Some(topic) = topic {
        signals.retain(|name, _| name == topic);
    }

    let results: BTreeMap<String, _> = signals
        .iter()
        .map(|(name, series)| (name.clone(), detector.detect_series(series)))
        .collect();
    Ok(serde_json::to_value(results)?)
}

fn crossovers(config: &Config, papers: &[PaperRecord], a: &str, b: &str) -> Result<serde_json::Value> {
    let signals = SignalBuilder::from_config(&config.signal).build(papers);
    let series_a = signals
        .get(a)
        .with_context(|| format!("Unknown topic: {a}"))?;
    let series_b = signals
        .get(b)
        .with_context(|| format!("Unknown topic: {b}"))?;
    Ok(serde_json::to_value(detect_series_crossovers(a, series_a, b, series_b))?)
}

fn forecast(
    config: &Config,
    papers: &[PaperRecord],
    topic: Option<&str>,
    periods: Option<usize>,
) -> Result<serde_json::Value> {
    let forecaster = Forecaster::new(config.forecast.clone());
    let mut signals = SignalBuilder::from_config(&config.signal).build(papers);
    if let Some(topic) = topic {
        signals.retain(|name, _| name == topic);
    }

    let results: BTreeMap<String, ForecastResponse> = signals
        .iter()
        .map(|(name, series)| (name.clone(), forecaster.forecast(series, periods).into()))
        .collect();
    Ok(serde_json::to_value(results)?)
}

fn network(config: &Config, papers: &[PaperRecord], communities: bool) -> Result<serde_json::Value> {
    let mut report = NetworkAnalyzer::new(config.network.clone()).analyze(papers);
    if !communities {
        report.coauthorship.communities.clear();
    }
    Ok(serde_json::to_value(report)?)
}

fn topics(config: &Config, papers: &[PaperRecord], provider: &mut dyn EmbeddingProvider) -> Result<serde_json::Value> {
    let documents: Vec<Document> = papers.iter().map(Document::from).collect();
    let mut modeler = TopicModeler::new(config.topics.clone());
    let training = modeler.fit_with_provider(&documents, provider)?;

    Ok(serde_json::json!({
        "training": training,
        "topics": modeler.topic_info(),
        "assignments": modeler.assignments(),
    }))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing/logging
    setup_tracing(&cli.log_format, cli.verbose)?;

    let config = load_config(cli.config.as_deref())?;
    let papers = load_papers(&cli.input)?;

    let output = match cli.command {
        Commands::Signals => {
            let signals = SignalBuilder::from_config(&config.signal).build(&papers);
            serde_json::to_value(signals)?
        }

        Commands::Changepoints { topic } => {
            tracing::info!(topic = ?topic, "Starting changepoint detection");
            blocking(move || changepoints(&config, &papers, topic.as_deref())).await?
        }

        Commands::Crossovers { topic_a, topic_b } => {
            tracing::info!(a = %topic_a, b = %topic_b, "Starting crossover detection");
            crossovers(&config, &papers, &topic_a, &topic_b)?
        }

        Commands::Forecast { topic, periods } => {
            tracing::info!(topic = ?topic, periods = ?periods, "Starting forecast");
            blocking(move || forecast(&config, &papers, topic.as_deref(), periods)).await?
        }

        Commands::Network { communities } => {
            tracing::info!(communities, "Starting network analysis");
            blocking(move || network(&config, &papers, communities)).await?
        }

        #[cfg(feature = "bert")]
        Commands::Topics { bert } => {
            tracing::info!(bert, "Starting topic modeling");
            blocking(move || {
                let mut provider: Box<dyn EmbeddingProvider> = if bert {
                    Box::new(trendscope::embedding::BertEmbedder::from_pretrained(
                        trendscope::embedding::BertConfig::default(),
                    )?)
                } else {
                    Box::new(HashingEmbedder::new(config.topics.embedding_dim))
                };
                topics(&config, &papers, provider.as_mut())
            })
            .await?
        }

        #[cfg(not(feature = "bert"))]
        Commands::Topics { .. } => {
            tracing::info!("Starting topic modeling");
            blocking(move || {
                let mut provider = HashingEmbedder::new(config.topics.embedding_dim);
                topics(&config, &papers, &mut provider)
            })
            .await?
        }

        Commands::Report => {
            tracing::info!("Building insight report");
            let report = blocking(move || Ok(ReportBuilder::new(config, false).build(&papers))).await?;
            serde_json::to_value(report)?
        }
    };

    print_json(&output)
}
