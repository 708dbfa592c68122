use std::time::Instant;

use rand::Rng;
use tracing::{debug, trace};

use crate::error::Result;
use crate::prefix::{DigestAlgorithm, DigestPrefix, Prefix, DEFAULT_PREFIX_WIDTH};
use crate::sampler::{Input, InputSampler, DEFAULT_INPUT_LENGTH};
use crate::sink::rule;
use crate::strategy::{CollisionStrategy, Step, StrategyKind, Strong, Weak};

/// Attempts between progress log lines
const PROGRESS_INTERVAL: u64 = 1_000_000;

/// Settings shared by every trial of an experiment
#[derive(Debug, Clone, Copy)]
pub struct TrialConfig {
    pub strategy: StrategyKind,
    pub input_length: usize,
    pub prefix_width: usize,
    pub algorithm: DigestAlgorithm,
    /// Give up after this many attempts; `None` searches until a collision is found
    pub max_attempts: Option<u64>,
}

impl TrialConfig {
    pub fn new(strategy: StrategyKind) -> Self {
        TrialConfig {
            strategy,
            input_length: DEFAULT_INPUT_LENGTH,
            prefix_width: DEFAULT_PREFIX_WIDTH,
            algorithm: DigestAlgorithm::default(),
            max_attempts: None,
        }
    }
}

/// A collision found by one trial
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrialResult {
    pub attempts: u64,
    pub first_input: Input,
    pub second_input: Input,
    pub matched_prefix: Prefix,
    pub summary: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrialOutcome {
    Collision(TrialResult),
    /// The attempt cap was reached before any collision
    Inconclusive { attempts: u64 },
}

impl TrialOutcome {
    pub fn attempts(&self) -> u64 {
        match self {
            TrialOutcome::Collision(result) => result.attempts,
            TrialOutcome::Inconclusive { attempts } => *attempts,
        }
    }
}

/// Runs one trial to completion with its own random source.
///
/// `attempts` counts every `step` call up to and including the one that finds the collision.
/// The weak target draw happens in `initialize` and is not counted.
pub fn run_trial<R: Rng>(config: &TrialConfig, rng: R) -> Result<TrialOutcome> {
    let mut sampler = InputSampler::new(rng, config.input_length)?;
    let digester = DigestPrefix::new(config.algorithm, config.prefix_width)?;

    let outcome = match config.strategy {
        StrategyKind::Weak => search(&Weak, &mut sampler, &digester, config.max_attempts),
        StrategyKind::Strong => search(&Strong, &mut sampler, &digester, config.max_attempts),
    };

    debug!(strategy = %config.strategy, attempts = outcome.attempts(), "trial finished");
    Ok(outcome)
}

fn search<S: CollisionStrategy, R: Rng>(
    strategy: &S,
    sampler: &mut InputSampler<R>,
    digester: &DigestPrefix,
    max_attempts: Option<u64>,
) -> TrialOutcome {
    let mut state = strategy.initialize(sampler, digester);
    let mut attempts: u64 = 0;
    let mut interval_start = Instant::now();

    loop {
        if max_attempts.map_or(false, |max| attempts >= max) {
            return TrialOutcome::Inconclusive { attempts };
        }

        if attempts > 0 && attempts % PROGRESS_INTERVAL == 0 {
            let rate = PROGRESS_INTERVAL as f32 / interval_start.elapsed().as_secs_f32();
            trace!(attempts, rate, "still searching");
            interval_start = Instant::now();
        }

        attempts += 1;
        if let Step::Found(collision) = strategy.step(&mut state, sampler, digester) {
            let (first_label, second_label) = S::LABELS;
            let summary = format!(
                "{rule}\n{} -> Hash: {} -> {}\n{} -> Hash: {} -> {}\nAttempts: {}\n",
                first_label,
                collision.first,
                collision.prefix,
                second_label,
                collision.second,
                collision.prefix,
                attempts,
                rule = rule(),
            );

            return TrialOutcome::Collision(TrialResult {
                attempts,
                first_input: collision.first,
                second_input: collision.second,
                matched_prefix: collision.prefix,
                summary,
            });
        }
    }
}
