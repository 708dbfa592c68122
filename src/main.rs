use std::process;

use structopt::StructOpt;
use tracing::{error, Level};

use truncated_collisions::{ConsoleSink, DigestAlgorithm, Experiment, StrategyKind, TrialConfig};

/// Measures how many random guesses it takes to collide on a truncated digest
///
/// A weak collision matches the digest prefix of one input drawn up front. A strong collision is
/// any pair of distinct inputs sharing a prefix (the birthday attack). With the default 6 hex
/// characters (24 bits) a strong collision shows up after roughly 5,000 attempts while a weak
/// collision needs around 16.7 million.
#[derive(Debug, StructOpt)]
struct Cli {
    /// Attack to run: weak or strong
    strategy: StrategyKind,
    /// Number of independent trials
    #[structopt(short, long, default_value = "100")]
    trials: usize,
    /// Length of every generated input, drawn from [A-Za-z0-9]
    #[structopt(short = "l", long, default_value = "5")]
    input_length: usize,
    /// Number of leading hex characters of the digest that must match
    #[structopt(short = "w", long, default_value = "6")]
    prefix_width: usize,
    /// Digest algorithm: sha256 or md5
    #[structopt(short, long, default_value = "sha256")]
    digest: DigestAlgorithm,
    /// Worker threads, defaults to the number of CPUs
    #[structopt(short = "j", long)]
    threads: Option<usize>,
    /// Base seed for reproducible runs
    #[structopt(short, long)]
    seed: Option<u64>,
    /// Give up on a trial after this many attempts
    #[structopt(short, long)]
    max_attempts: Option<u64>,
    /// Log more detail to stderr (-v, -vv)
    #[structopt(short, long, parse(from_occurrences))]
    verbose: u8,
}

fn main() {
    let args = Cli::from_args();

    let level = match args.verbose {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt().with_writer(std::io::stderr).with_max_level(level).init();

    let config = TrialConfig {
        strategy: args.strategy,
        input_length: args.input_length,
        prefix_width: args.prefix_width,
        algorithm: args.digest,
        max_attempts: args.max_attempts,
    };

    let mut experiment = Experiment::new(config).seed(args.seed);
    if let Some(threads) = args.threads {
        experiment = experiment.threads(threads);
    }

    let mut sink = ConsoleSink::stdout();
    if let Err(e) = experiment.run(args.trials, &mut sink) {
        error!(error = %e, "experiment aborted");
        process::exit(1);
    }
}
