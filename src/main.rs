// ========================================================================================
//
//                      THE PROGRESSIVE VALIDATION HARNESS: ADPREDICTOR
//
// ========================================================================================
//
// This binary replays a file of labelled feature vectors through a single predictor.
// Every event is first scored with the current beliefs and only then used for
// training, so the reported log loss is an honest out-of-sample estimate of the
// online learner. It owns the predictor for its whole lifetime; nothing is saved
// or reloaded between runs.
//
// 1.  Parameters come from an optional TOML file, with command-line overrides.
// 2.  Events are loaded and validated up front, so a malformed file fails before
//     any training happens.
// 3.  After the replay, features are ranked by importance and the final belief
//     store can be exported as TSV for inspection.

use adpredictor::config::{ConfigError, PredictorConfig};
use adpredictor::data::{self, DataError, TrainingEvent};
use adpredictor::observer::LoggingObserver;
use adpredictor::{AdPredictor, FeatureKey, PredictorError};
use ahash::AHashSet;
use clap::Parser;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use serde::Serialize;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;

// ========================================================================================
//                           APPLICATION-LEVEL CONSTANTS
// ========================================================================================

/// Predictions are clamped this far from 0 and 1 before taking logarithms.
const LOG_LOSS_CLAMP: f64 = 1e-8;

// ========================================================================================
//                         COMMAND-LINE INTERFACE DEFINITION
// ========================================================================================

#[derive(Parser, Debug)]
#[clap(
    name = "adpredictor",
    version,
    about = "Progressive validation of an online Bayesian click-probability model."
)]
struct Args {
    /// Tab-separated events: label, then one feature_id:value_id key per column.
    events: PathBuf,

    /// TOML file with beta, prior_probability, epsilon and num_features.
    #[clap(long)]
    config: Option<PathBuf>,

    /// Observation noise scale (overrides the config file).
    #[clap(long)]
    beta: Option<f64>,

    /// Prediction of a freshly initialised model (overrides the config file).
    #[clap(long)]
    prior_probability: Option<f64>,

    /// Prior regression rate per update (overrides the config file).
    #[clap(long)]
    epsilon: Option<f64>,

    /// Number of feature keys per event, bias included (overrides the config file).
    #[clap(long)]
    num_features: Option<usize>,

    /// Number of features to report, ranked by importance.
    #[clap(long, default_value = "10")]
    top: usize,

    /// Write the final beliefs to this path as TSV.
    #[clap(long)]
    weights_out: Option<PathBuf>,

    /// Forward every prediction and belief transition to the debug log.
    #[clap(long)]
    trace_beliefs: bool,
}

#[derive(Error, Debug)]
enum CliError {
    #[error("{0}")]
    Config(#[from] ConfigError),
    #[error("{0}")]
    Model(#[from] PredictorError),
    #[error("{0}")]
    Data(#[from] DataError),
    #[error("Failed to write weights: {0}")]
    Export(#[from] csv::Error),
    #[error("Failed to write weights: {0}")]
    Io(#[from] std::io::Error),
}

/// Running totals for progressive validation.
#[derive(Debug, Default)]
struct ReplaySummary {
    events: usize,
    positives: usize,
    log_loss_sum: f64,
    correct: usize,
}

impl ReplaySummary {
    fn record(&mut self, probability: f64, label: bool) {
        let p = probability.clamp(LOG_LOSS_CLAMP, 1.0 - LOG_LOSS_CLAMP);
        self.events += 1;
        if label {
            self.positives += 1;
            self.log_loss_sum -= p.ln();
        } else {
            self.log_loss_sum -= (1.0 - p).ln();
        }
        if (probability >= 0.5) == label {
            self.correct += 1;
        }
    }

    fn mean_log_loss(&self) -> f64 {
        self.log_loss_sum / self.events.max(1) as f64
    }

    fn accuracy(&self) -> f64 {
        self.correct as f64 / self.events.max(1) as f64
    }
}

#[derive(Serialize)]
struct WeightRow {
    feature_id: u64,
    value_id: u64,
    mean: f64,
    variance: f64,
}

// ========================================================================================
//                           THE MAIN ORCHESTRATION LOGIC
// ========================================================================================

fn main() {
    env_logger::init();
    let start_time = Instant::now();
    let args = Args::parse();

    if let Err(e) = run(&args) {
        eprintln!("Error: {e}");
        process::exit(1);
    }

    eprintln!(
        "\nSuccess! Total execution time: {:.2?}",
        start_time.elapsed()
    );
}

fn run(args: &Args) -> Result<(), CliError> {
    // --- Phase 1: Configuration ---
    let config = resolve_config(args)?;
    log::debug!("Effective configuration:\n{}", config.to_toml_string()?);
    let mut predictor = AdPredictor::from_config(&config)?;
    if args.trace_beliefs {
        predictor = predictor.with_observer(Arc::new(LoggingObserver));
    }
    eprintln!(
        "> Model: beta = {}, prior = {}, epsilon = {}, {} features per event",
        config.beta, config.prior_probability, config.epsilon, config.num_features
    );

    // --- Phase 2: Event Loading ---
    let events = data::load_events(&args.events, config.num_features)?;
    eprintln!("> Loaded {} events from {}", events.len(), args.events.display());

    // --- Phase 3: Progressive Validation ---
    let summary = replay(&mut predictor, &events)?;
    eprintln!(
        "> Replayed {} events ({} positive): mean log loss {:.6}, accuracy {:.4}",
        summary.events,
        summary.positives,
        summary.mean_log_loss(),
        summary.accuracy()
    );

    // --- Phase 4: Diagnostics and Export ---
    report_importance(&predictor, &events, args.top)?;
    if let Some(path) = &args.weights_out {
        write_weights(&predictor, path)?;
        eprintln!(
            "> Wrote {} beliefs to {}",
            predictor.weights().len(),
            path.display()
        );
    }
    Ok(())
}

// ========================================================================================
//                                  HELPER FUNCTIONS
// ========================================================================================

fn resolve_config(args: &Args) -> Result<PredictorConfig, ConfigError> {
    let mut config = match &args.config {
        Some(path) => PredictorConfig::load(path)?,
        None => PredictorConfig::default(),
    };
    if let Some(beta) = args.beta {
        config.beta = beta;
    }
    if let Some(prior_probability) = args.prior_probability {
        config.prior_probability = prior_probability;
    }
    if let Some(epsilon) = args.epsilon {
        config.epsilon = epsilon;
    }
    if let Some(num_features) = args.num_features {
        config.num_features = num_features;
    }
    Ok(config)
}

fn create_progress_bar(len: u64, message: &str) -> ProgressBar {
    let draw_target = if std::io::stderr().is_terminal() {
        ProgressDrawTarget::stderr_with_hz(20)
    } else {
        ProgressDrawTarget::hidden()
    };

    let pb = ProgressBar::with_draw_target(Some(len), draw_target);
    if let Ok(style) = ProgressStyle::with_template(
        "\n> [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}",
    ) {
        pb.set_style(style.progress_chars("█▉▊▋▌▍▎▏  "));
    }
    pb.set_message(message.to_string());
    pb
}

/// Predicts each event before training on it.
fn replay(
    predictor: &mut AdPredictor,
    events: &[TrainingEvent],
) -> Result<ReplaySummary, PredictorError> {
    let pb = create_progress_bar(events.len() as u64, "replaying events");
    let mut summary = ReplaySummary::default();
    for event in events {
        let probability = predictor.predict(&event.features)?;
        summary.record(probability, event.label);
        predictor.train(&event.features, event.label)?;
        pb.inc(1);
    }
    pb.finish_and_clear();
    Ok(summary)
}

fn report_importance(
    predictor: &AdPredictor,
    events: &[TrainingEvent],
    top: usize,
) -> Result<(), PredictorError> {
    if top == 0 {
        return Ok(());
    }
    let mut seen = AHashSet::new();
    let candidates: Vec<FeatureKey> = events
        .iter()
        .flat_map(|event| event.features.iter().copied())
        .filter(|key| !key.is_bias() && seen.insert(*key))
        .collect();

    let ranked = predictor.rank_features(&candidates)?;
    eprintln!("> Top {} of {} features by importance:", top.min(ranked.len()), ranked.len());
    for (key, score) in ranked.into_iter().take(top) {
        let belief = predictor.belief(&key);
        eprintln!("    {key}\tKL = {score:.6e}\t{belief}");
    }
    Ok(())
}

fn write_weights(predictor: &AdPredictor, path: &Path) -> Result<(), CliError> {
    let mut rows: Vec<WeightRow> = predictor
        .weights()
        .iter()
        .map(|(key, belief)| WeightRow {
            feature_id: key.feature_id,
            value_id: key.value_id,
            mean: belief.mean,
            variance: belief.variance,
        })
        .collect();
    rows.sort_by_key(|row| (row.feature_id, row.value_id));

    let mut writer = csv::WriterBuilder::new().delimiter(b'\t').from_path(path)?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}
