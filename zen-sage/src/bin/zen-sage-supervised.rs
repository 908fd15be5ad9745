//! Zen Sage Supervised Training CLI
//!
//! Trains a GraphSAGE link prediction model on a node CSV and an edge CSV,
//! writes the trained weights, and reports train/test metrics.

use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use tracing::{info, warn};

use zen_sage::logging::{self, DEFAULT_LOG_FILE};
use zen_sage::{load_graph, EvaluationMetrics, ModelWeights, SessionConfig, SupervisedModel};

fn main() -> Result<()> {
    let matches = create_cli().get_matches();

    let log_file = matches
        .get_one::<PathBuf>("log-file")
        .cloned()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_LOG_FILE));
    logging::init(&log_file)
        .with_context(|| format!("Failed to open log file {}", log_file.display()))?;

    let config = build_config(&matches)?;
    let args = RunArgs::from_matches(&matches)?;
    run(&args, config)?;
    Ok(())
}

fn create_cli() -> Command {
    Command::new("zen-sage-supervised")
        .version(zen_sage::VERSION)
        .about("Supervised GraphSAGE link prediction training")
        .long_about(
            r#"
Supervised GraphSAGE link prediction training

Loads a node table (first column id, remaining columns numeric features) and an
edge table (with `source` and `target` columns), holds out test and train links,
trains the encoder, saves the weights and logs train/test metrics.

Configuration is layered: built-in defaults, then --config, then flags.

EXAMPLES:
  # Train for 20 epochs with default hyperparameters
  zen-sage-supervised weights.bin nodes.csv edges.csv 20

  # Smaller model, custom sampling, history written as JSON
  zen-sage-supervised weights.bin nodes.csv edges.csv 5 \
      --layer-sizes 16,16 --num-samples 10,5 --history history.json
"#,
        )
        .arg(
            Arg::new("path_weights")
                .value_name("PATH_WEIGHTS")
                .help("Output file for the trained weights")
                .required(true)
                .value_parser(value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("path_nodes")
                .value_name("PATH_NODES")
                .help("Node CSV: id column followed by feature columns")
                .required(true)
                .value_parser(value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("path_edges")
                .value_name("PATH_EDGES")
                .help("Edge CSV with source and target columns")
                .required(true)
                .value_parser(value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("epochs")
                .value_name("EPOCHS")
                .help("Number of training epochs")
                .required(true)
                .value_parser(value_parser!(usize)),
        )
        .arg(
            Arg::new("config")
                .long("config")
                .short('c')
                .value_name("JSON")
                .help("Session configuration file; flags override its values")
                .value_parser(value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("batch-size")
                .long("batch-size")
                .value_name("N")
                .help("Links per batch")
                .value_parser(value_parser!(usize)),
        )
        .arg(
            Arg::new("num-samples")
                .long("num-samples")
                .value_name("S1,S2,...")
                .help("Neighbours sampled per hop")
                .value_delimiter(',')
                .num_args(1..)
                .value_parser(value_parser!(usize)),
        )
        .arg(
            Arg::new("layer-sizes")
                .long("layer-sizes")
                .value_name("D1,D2,...")
                .help("Output width of each encoder layer")
                .value_delimiter(',')
                .num_args(1..)
                .value_parser(value_parser!(usize)),
        )
        .arg(
            Arg::new("dropout")
                .long("dropout")
                .value_name("RATE")
                .help("Input dropout rate during training")
                .value_parser(value_parser!(f32)),
        )
        .arg(
            Arg::new("learning-rate")
                .long("learning-rate")
                .visible_alias("lr")
                .value_name("LR")
                .help("Adam learning rate")
                .value_parser(value_parser!(f32)),
        )
        .arg(
            Arg::new("no-bias")
                .long("no-bias")
                .action(ArgAction::SetTrue)
                .help("Train the encoder without bias vectors"),
        )
        .arg(
            Arg::new("seed")
                .long("seed")
                .value_name("SEED")
                .help("Master random seed")
                .value_parser(value_parser!(u64)),
        )
        .arg(
            Arg::new("log-file")
                .long("log-file")
                .value_name("PATH")
                .help("Log file, appended to")
                .default_value(DEFAULT_LOG_FILE)
                .value_parser(value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("initial-weights")
                .long("initial-weights")
                .value_name("PATH")
                .help("Start from previously saved weights")
                .value_parser(value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("history")
                .long("history")
                .value_name("PATH")
                .help("Write the per-epoch training history as JSON")
                .value_parser(value_parser!(PathBuf)),
        )
}

/// Defaults, then the JSON file, then flags
fn build_config(matches: &ArgMatches) -> Result<SessionConfig> {
    let mut config = match matches.get_one::<PathBuf>("config") {
        Some(path) => SessionConfig::from_json_file(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?,
        None => SessionConfig::default(),
    };

    let hyper = &mut config.hyper;
    if let Some(&batch_size) = matches.get_one::<usize>("batch-size") {
        hyper.batch_size = batch_size;
    }
    if let Some(values) = matches.get_many::<usize>("num-samples") {
        hyper.num_samples = values.copied().collect();
    }
    if let Some(values) = matches.get_many::<usize>("layer-sizes") {
        hyper.layer_sizes = values.copied().collect();
    }
    if let Some(&dropout) = matches.get_one::<f32>("dropout") {
        hyper.dropout = dropout;
    }
    if let Some(&lr) = matches.get_one::<f32>("learning-rate") {
        hyper.learning_rate = lr;
    }
    if matches.get_flag("no-bias") {
        hyper.bias = false;
    }
    if let Some(&seed) = matches.get_one::<u64>("seed") {
        config.seed = seed;
    }

    config.validate().context("Invalid session configuration")?;
    Ok(config)
}

/// Paths and epoch count of one training run
#[derive(Debug, Clone)]
struct RunArgs {
    path_weights: PathBuf,
    path_nodes: PathBuf,
    path_edges: PathBuf,
    epochs: usize,
    initial_weights: Option<PathBuf>,
    history: Option<PathBuf>,
}

impl RunArgs {
    fn from_matches(matches: &ArgMatches) -> Result<Self> {
        let path = |name: &str| {
            matches
                .get_one::<PathBuf>(name)
                .cloned()
                .with_context(|| format!("Missing argument {}", name))
        };
        Ok(Self {
            path_weights: path("path_weights")?,
            path_nodes: path("path_nodes")?,
            path_edges: path("path_edges")?,
            epochs: matches
                .get_one::<usize>("epochs")
                .copied()
                .context("Missing argument epochs")?,
            initial_weights: matches.get_one::<PathBuf>("initial-weights").cloned(),
            history: matches.get_one::<PathBuf>("history").cloned(),
        })
    }
}

/// Train, persist and evaluate; returns the train and test metrics
fn run(args: &RunArgs, config: SessionConfig) -> Result<(EvaluationMetrics, EvaluationMetrics)> {
    let graph = load_graph(&args.path_nodes, &args.path_edges).with_context(|| {
        format!(
            "Failed to load graph from {} and {}",
            args.path_nodes.display(),
            args.path_edges.display()
        )
    })?;

    warn!("################################## New Training Session ################################");

    let mut model = SupervisedModel::new(graph, config)?;
    let sizes = model.initialize().context("Failed to initialize the model")?;
    info!(
        "Training links : {}, testing links : {}",
        sizes.train, sizes.test
    );

    if let Some(initial) = &args.initial_weights {
        let weights = ModelWeights::load(initial)
            .with_context(|| format!("Failed to load weights from {}", initial.display()))?;
        model
            .set_weights(&weights)
            .context("Initial weights do not match the model")?;
        info!("Initial weights loaded from {}", initial.display());
    }

    info!("Training started!");
    let start = Instant::now();

    let (weights, history) = model.fit(args.epochs).context("Training failed")?;

    let elapsed_secs = start.elapsed().as_secs_f64();
    info!("Training done!");

    weights.save(&args.path_weights).with_context(|| {
        format!("Failed to save weights to {}", args.path_weights.display())
    })?;

    if let Some(history_path) = &args.history {
        history.save_json(history_path).with_context(|| {
            format!("Failed to write history to {}", history_path.display())
        })?;
    }

    let (train, test) = model.evaluate().context("Evaluation failed")?;
    info!("{}", metrics_line("Training set", &train));
    info!("{}", metrics_line("Testing set", &test));
    info!("Elapsed time : {} seconds", elapsed_secs);

    Ok((train, test))
}

fn metrics_line(label: &str, metrics: &EvaluationMetrics) -> String {
    format!(
        "{} : accuracy - {}, recall - {}, AUC - {}, F1 - {}, precision - {}",
        label,
        metrics.accuracy,
        metrics.recall,
        metrics.auc,
        metrics.f1(),
        metrics.precision
    )
}
