use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use narrative_topics::models::{NarrativeRecord, RunReport};
use narrative_topics::{perplexity_sweep, prepare_corpus, DtmOptions, GibbsLDA, LDAConfig, Narrative, Normalizer};

#[derive(Parser, Debug)]
#[command(version, about = "Topic model accident narratives", long_about = None)]
struct Args {
    /// JSON array of {"id": ..., "narrative": ...} records
    path: PathBuf,
    #[clap(short = 'k', long, default_value_t = 10)]
    topics: usize,
    #[clap(short, long, default_value_t = 500)]
    iterations: usize,
    #[clap(short, long, default_value_t = 42)]
    seed: u64,
    #[clap(long, help = "Document-topic prior; defaults to 50/k")]
    alpha: Option<f64>,
    #[clap(long, default_value_t = 0.1)]
    eta: f64,
    #[clap(long, default_value_t = 0.01)]
    min_doc_freq: f64,
    #[clap(long, default_value_t = 0.80)]
    max_doc_freq: f64,
    #[clap(long, value_delimiter = ',', help = "Candidate topic counts to score by perplexity, e.g. 5,10,20")]
    sweep: Vec<usize>,
    #[clap(long, default_value_t = 10)]
    top_terms: usize,
    #[clap(short, long, help = "Write the JSON report here instead of stdout")]
    output: Option<PathBuf>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    info!(path = %args.path.display(), "reading narratives");
    let narratives = load_narratives(&args.path)?;

    let options = DtmOptions::with_bounds(args.min_doc_freq, args.max_doc_freq);
    let corpus = prepare_corpus(&narratives, &Normalizer::english(), &options)
        .context("failed to build document-term matrix")?;

    let config = LDAConfig {
        num_topics: args.topics,
        iterations: args.iterations,
        alpha: args.alpha,
        eta: args.eta,
        seed: args.seed,
        ..Default::default()
    };
    let model = GibbsLDA::new(config.clone())
        .fit(corpus.counts())
        .context("topic model fit failed")?;
    let perplexity = model.perplexity(corpus.counts())?;
    info!(perplexity, "fitted topic model");

    let sweep = if args.sweep.is_empty() {
        Vec::new()
    } else {
        perplexity_sweep(corpus.counts(), &args.sweep, &config).context("perplexity sweep failed")?
    };

    let report = RunReport::new(&corpus, &options, &config, &model, perplexity, args.top_terms, sweep);
    let json = serde_json::to_string_pretty(&report)?;
    match &args.output {
        Some(path) => {
            fs::write(path, json).with_context(|| format!("cannot write {}", path.display()))?;
            info!(path = %path.display(), "report written");
        }
        None => println!("{json}"),
    }
    Ok(())
}

fn load_narratives(path: &Path) -> Result<Vec<Narrative>> {
    let raw = fs::read_to_string(path).with_context(|| format!("cannot read {}", path.display()))?;
    let records: Vec<NarrativeRecord> =
        serde_json::from_str(&raw).with_context(|| format!("{} is not a JSON array of records", path.display()))?;
    Ok(records.into_iter().map(Narrative::from).collect())
}
