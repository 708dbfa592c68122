use std::f64::consts::PI;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::Arc;

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::{info, warn};

use crate::error::{CollisionError, Result};
use crate::prefix::DigestPrefix;
use crate::sink::ResultsSink;
use crate::strategy::StrategyKind;
use crate::trial::{run_trial, TrialConfig, TrialOutcome};

/// Birthday-bound estimate of the attempts needed to find a collision in a space of `space_size`
/// prefixes
///
/// Strong collisions are expected after about `sqrt(pi/2 * N)` draws, weak ones after `N`.
pub fn expected_attempts(strategy: StrategyKind, space_size: f64) -> f64 {
    match strategy {
        StrategyKind::Weak => space_size,
        StrategyKind::Strong => (PI / 2.0 * space_size).sqrt(),
    }
}

/// Aggregated attempts of an experiment, in the order trials completed
#[derive(Debug, Clone, PartialEq)]
pub struct ExperimentSummary {
    pub trial_count: usize,
    pub attempts: Vec<u64>,
    pub inconclusive: usize,
    pub failures: Vec<String>,
    pub expected_attempts: f64,
}

impl ExperimentSummary {
    pub fn new(trial_count: usize, strategy: StrategyKind, space_size: f64) -> Self {
        ExperimentSummary {
            trial_count,
            attempts: Vec::with_capacity(trial_count),
            inconclusive: 0,
            failures: Vec::new(),
            expected_attempts: expected_attempts(strategy, space_size),
        }
    }

    pub fn record(&mut self, attempts: u64) {
        self.attempts.push(attempts);
    }

    pub fn record_inconclusive(&mut self) {
        self.inconclusive += 1;
    }

    pub fn record_failure(&mut self, error: String) {
        self.failures.push(error);
    }

    /// Trials that found a collision
    pub fn completed(&self) -> usize {
        self.attempts.len()
    }

    /// Mean attempts over the trials that found a collision, truncated toward zero
    pub fn mean(&self) -> Option<u64> {
        if self.attempts.is_empty() {
            return None;
        }

        let total: u128 = self.attempts.iter().map(|&a| a as u128).sum();
        Some((total / self.attempts.len() as u128) as u64)
    }
}

/// Runs independent trials in parallel and reports them as they complete
#[derive(Debug, Clone)]
pub struct Experiment {
    config: TrialConfig,
    threads: usize,
    seed: Option<u64>,
}

impl Experiment {
    pub fn new(config: TrialConfig) -> Self {
        Experiment { config, threads: num_cpus::get(), seed: None }
    }

    pub fn threads(mut self, threads: usize) -> Self {
        self.threads = threads;
        self
    }

    /// Derive every trial's random source from `seed` instead of OS entropy
    pub fn seed(mut self, seed: Option<u64>) -> Self {
        self.seed = seed;
        self
    }

    pub fn run<S: ResultsSink>(&self, trials: usize, sink: &mut S) -> Result<ExperimentSummary> {
        self.run_with(trials, sink, run_trial::<ChaCha8Rng>)
    }

    /// Runs `trials` calls of `trial_fn`, each on a worker thread with its own random source
    ///
    /// A trial that errors or panics is reported to the sink and left out of the mean; the other
    /// trials are unaffected. If the sink itself fails, trials that have not started yet are
    /// skipped and the first sink error is returned once every running trial has finished.
    pub fn run_with<S, F>(&self, trials: usize, sink: &mut S, trial_fn: F) -> Result<ExperimentSummary>
    where
        S: ResultsSink,
        F: Fn(&TrialConfig, ChaCha8Rng) -> Result<TrialOutcome> + Send + Sync + 'static,
    {
        if trials == 0 {
            return Err(CollisionError::NoTrials);
        }
        if self.config.input_length == 0 {
            return Err(CollisionError::InvalidInputLength);
        }
        let digester = DigestPrefix::new(self.config.algorithm, self.config.prefix_width)?;

        let pool = rayon::ThreadPoolBuilder::new().num_threads(self.threads).build()?;
        info!(
            strategy = %self.config.strategy,
            digest = %self.config.algorithm,
            prefix_width = self.config.prefix_width,
            input_length = self.config.input_length,
            trials,
            threads = pool.current_num_threads(),
            "starting experiment"
        );

        let (tx, rx) = mpsc::channel();
        let trial_fn = Arc::new(trial_fn);
        let cancelled = Arc::new(AtomicBool::new(false));

        for index in 0..trials {
            let tx = tx.clone();
            let trial_fn = Arc::clone(&trial_fn);
            let cancelled = Arc::clone(&cancelled);
            let config = self.config;
            let seed = self.seed;

            pool.spawn(move || {
                if cancelled.load(Ordering::SeqCst) {
                    return;
                }

                // One key per base seed, one stream per trial
                let rng = match seed {
                    Some(seed) => {
                        let mut rng = ChaCha8Rng::seed_from_u64(seed);
                        rng.set_stream(index as u64);
                        rng
                    }
                    None => ChaCha8Rng::from_entropy(),
                };

                let outcome = panic::catch_unwind(AssertUnwindSafe(|| (*trial_fn)(&config, rng)))
                    .unwrap_or_else(|payload| Err(CollisionError::WorkerFailed(panic_message(&*payload))));

                // The receiver only disappears if the collecting side already bailed out
                if tx.send(outcome).is_err() {
                    warn!(index, "result channel closed before trial finished");
                }
            });
        }
        // Workers hold the only remaining senders, so the loop below ends once all have reported
        // (or skipped)
        drop(tx);

        let mut summary = ExperimentSummary::new(trials, self.config.strategy, digester.space_size());
        let mut sink_error: Option<std::io::Error> = None;
        for (i, outcome) in rx.iter().enumerate() {
            let ordinal = i + 1;
            let reported = match outcome {
                Ok(outcome) => {
                    match &outcome {
                        TrialOutcome::Collision(result) => summary.record(result.attempts),
                        TrialOutcome::Inconclusive { .. } => summary.record_inconclusive(),
                    }
                    match sink_error {
                        None => sink.trial_completed(ordinal, &outcome),
                        Some(_) => Ok(()),
                    }
                }
                Err(error) => {
                    warn!(ordinal, %error, "trial failed");
                    let reported = match sink_error {
                        None => sink.trial_failed(ordinal, &error),
                        Some(_) => Ok(()),
                    };
                    summary.record_failure(error.to_string());
                    reported
                }
            };

            if let Err(e) = reported {
                warn!(ordinal, error = %e, "results sink failed, skipping remaining trials");
                cancelled.store(true, Ordering::SeqCst);
                sink_error = Some(e);
            }
        }

        if let Some(e) = sink_error {
            return Err(e.into());
        }

        info!(
            completed = summary.completed(),
            failed = summary.failures.len(),
            inconclusive = summary.inconclusive,
            mean = ?summary.mean(),
            "experiment finished"
        );
        sink.experiment_completed(&summary)?;

        Ok(summary)
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "trial panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::CollectingSink;
    use proptest::prelude::*;
    use std::io;
    use std::sync::atomic::AtomicUsize;

    fn experiment(strategy: StrategyKind, width: usize, seed: u64) -> Experiment {
        let config = TrialConfig { prefix_width: width, ..TrialConfig::new(strategy) };
        Experiment::new(config).threads(4).seed(Some(seed))
    }

    #[test]
    fn test_reports_every_trial() {
        let mut sink = CollectingSink::default();
        let summary = experiment(StrategyKind::Strong, 2, 1).run(20, &mut sink).unwrap();

        assert_eq!(summary.trial_count, 20);
        assert_eq!(summary.completed(), 20);
        assert_eq!(sink.outcomes.len(), 20);
        assert!(sink.failures.is_empty());

        // Ordinals count results as they arrive
        let ordinals: Vec<usize> = sink.outcomes.iter().map(|(ordinal, _)| *ordinal).collect();
        assert_eq!(ordinals, (1..=20).collect::<Vec<_>>());
        assert_eq!(sink.summary, Some(summary));
    }

    #[test]
    fn test_seeded_runs_share_aggregate() {
        let mut first = CollectingSink::default();
        let mut second = CollectingSink::default();
        let a = experiment(StrategyKind::Strong, 3, 77).run(16, &mut first).unwrap();
        let b = experiment(StrategyKind::Strong, 3, 77).run(16, &mut second).unwrap();

        // Completion order may differ between runs, the multiset of attempts may not
        let mut a_attempts = a.attempts.clone();
        let mut b_attempts = b.attempts.clone();
        a_attempts.sort_unstable();
        b_attempts.sort_unstable();
        assert_eq!(a_attempts, b_attempts);
        assert_eq!(a.mean(), b.mean());
    }

    #[test]
    fn test_weak_to_strong_ratio_near_sqrt_space() {
        let trials = 200;
        let mut sink = CollectingSink::default();
        let weak = experiment(StrategyKind::Weak, 2, 10).run(trials, &mut sink).unwrap();
        let strong = experiment(StrategyKind::Strong, 2, 20).run(trials, &mut sink).unwrap();

        let weak_mean = weak.mean().unwrap() as f64;
        let strong_mean = strong.mean().unwrap() as f64;

        // N = 256: weak ~ 256, strong ~ 20, ratio ~ sqrt(N)
        assert!(weak_mean > 180.0 && weak_mean < 340.0, "weak mean {}", weak_mean);
        assert!(strong_mean > 12.0 && strong_mean < 32.0, "strong mean {}", strong_mean);
        let ratio = weak_mean / strong_mean;
        assert!(ratio > 4.0 && ratio < 40.0, "ratio {}", ratio);
    }

    #[test]
    fn test_panicking_trial_is_isolated() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let mut sink = CollectingSink::default();

        let summary = experiment(StrategyKind::Strong, 2, 5)
            .run_with(10, &mut sink, move |config, rng| {
                if counter.fetch_add(1, Ordering::SeqCst) == 3 {
                    panic!("worker ran out of memory");
                }
                run_trial(config, rng)
            })
            .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 10);
        assert_eq!(summary.completed(), 9);
        assert_eq!(summary.failures, vec!["Trial worker failed: worker ran out of memory".to_string()]);
        assert_eq!(sink.outcomes.len(), 9);
        assert_eq!(sink.failures.len(), 1);

        let total: u64 = summary.attempts.iter().sum();
        assert_eq!(summary.mean(), Some(total / 9));
    }

    /// Rejects every record, like a closed stdout pipe
    struct BrokenSink;

    impl ResultsSink for BrokenSink {
        fn trial_completed(&mut self, _ordinal: usize, _outcome: &TrialOutcome) -> io::Result<()> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "stdout closed"))
        }

        fn trial_failed(&mut self, _ordinal: usize, _error: &CollisionError) -> io::Result<()> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "stdout closed"))
        }

        fn experiment_completed(&mut self, _summary: &ExperimentSummary) -> io::Result<()> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "stdout closed"))
        }
    }

    #[test]
    fn test_sink_error_waits_for_running_trials() {
        let started = Arc::new(AtomicUsize::new(0));
        let finished = Arc::new(AtomicUsize::new(0));
        let (started_in, finished_in) = (Arc::clone(&started), Arc::clone(&finished));

        let result = experiment(StrategyKind::Strong, 2, 3).threads(2).run_with(
            20,
            &mut BrokenSink,
            move |config, rng| {
                started_in.fetch_add(1, Ordering::SeqCst);
                std::thread::sleep(std::time::Duration::from_millis(20));
                let outcome = run_trial(config, rng);
                finished_in.fetch_add(1, Ordering::SeqCst);
                outcome
            },
        );

        assert!(matches!(result, Err(CollisionError::Io(_))));
        // Nothing is still running once the error comes back, and queued trials were skipped
        let started = started.load(Ordering::SeqCst);
        assert_eq!(finished.load(Ordering::SeqCst), started);
        std::thread::sleep(std::time::Duration::from_millis(100));
        assert_eq!(finished.load(Ordering::SeqCst), started);
        assert!(started < 20, "started {}", started);
    }

    #[test]
    fn test_adjacent_seeds_are_uncorrelated() {
        let mut sink = CollectingSink::default();
        let a = experiment(StrategyKind::Strong, 4, 41).run(8, &mut sink).unwrap();
        let b = experiment(StrategyKind::Strong, 4, 42).run(8, &mut sink).unwrap();

        // Shifted per-trial seeds would make 7 of the 8 trials identical
        let shared = b.attempts.iter().filter(|n| a.attempts.contains(n)).count();
        assert!(shared < 4, "a {:?} b {:?}", a.attempts, b.attempts);
    }

    #[test]
    fn test_failing_trial_excluded_from_mean() {
        let mut sink = CollectingSink::default();
        let summary = experiment(StrategyKind::Weak, 2, 5)
            .run_with(4, &mut sink, |_config, _rng| Err(CollisionError::WorkerFailed("no cpu".to_string())))
            .unwrap();

        assert_eq!(summary.completed(), 0);
        assert_eq!(summary.failures.len(), 4);
        assert_eq!(summary.mean(), None);
    }

    #[test]
    fn test_inconclusive_trials_counted_separately() {
        let config = TrialConfig {
            prefix_width: 12,
            max_attempts: Some(5),
            ..TrialConfig::new(StrategyKind::Weak)
        };
        let mut sink = CollectingSink::default();
        let summary = Experiment::new(config).threads(2).seed(Some(0)).run(3, &mut sink).unwrap();

        assert_eq!(summary.inconclusive, 3);
        assert_eq!(summary.completed(), 0);
        assert_eq!(summary.mean(), None);
    }

    #[test]
    fn test_rejects_invalid_experiment() {
        let mut sink = CollectingSink::default();
        assert!(matches!(
            experiment(StrategyKind::Weak, 2, 0).run(0, &mut sink),
            Err(CollisionError::NoTrials)
        ));
        assert!(matches!(
            experiment(StrategyKind::Weak, 70, 0).run(1, &mut sink),
            Err(CollisionError::InvalidPrefixWidth { .. })
        ));
        assert!(sink.summary.is_none());
    }

    #[test]
    fn test_expected_attempts() {
        assert_eq!(expected_attempts(StrategyKind::Weak, 256.0), 256.0);
        let strong = expected_attempts(StrategyKind::Strong, 16_777_216.0);
        assert!((strong - 5133.6).abs() < 1.0);
    }

    #[test]
    fn test_mean_truncates() {
        let mut summary = ExperimentSummary::new(3, StrategyKind::Weak, 256.0);
        for attempts in [1, 2, 2].iter() {
            summary.record(*attempts);
        }
        assert_eq!(summary.mean(), Some(1));
    }

    proptest! {
        #[test]
        fn prop_mean_independent_of_arrival_order(
            attempts in prop::collection::vec(0u64..10_000_000, 1..100)
                .prop_flat_map(|v| (Just(v.clone()), Just(v).prop_shuffle()))
        ) {
            let (ordered, shuffled) = attempts;
            let mut a = ExperimentSummary::new(ordered.len(), StrategyKind::Strong, 256.0);
            let mut b = ExperimentSummary::new(shuffled.len(), StrategyKind::Strong, 256.0);
            ordered.iter().for_each(|&n| a.record(n));
            shuffled.iter().for_each(|&n| b.record(n));

            let expected = ordered.iter().sum::<u64>() / ordered.len() as u64;
            prop_assert_eq!(a.mean(), Some(expected));
            prop_assert_eq!(b.mean(), Some(expected));
        }
    }
}
