use std::io::{self, Write};

use crate::error::CollisionError;
use crate::experiment::ExperimentSummary;
use crate::trial::TrialOutcome;

/// Receives trial outcomes as they complete and the final experiment summary
///
/// `ordinal` is the number of outcomes collected so far, not a stable trial id.
pub trait ResultsSink {
    fn trial_completed(&mut self, ordinal: usize, outcome: &TrialOutcome) -> io::Result<()>;

    fn trial_failed(&mut self, ordinal: usize, error: &CollisionError) -> io::Result<()>;

    fn experiment_completed(&mut self, summary: &ExperimentSummary) -> io::Result<()>;
}

/// Separator line used in trial and summary records
pub(crate) fn rule() -> String {
    "-".repeat(40)
}

/// Writes the human readable report
pub struct ConsoleSink<W> {
    out: W,
}

impl ConsoleSink<io::Stdout> {
    pub fn stdout() -> Self {
        ConsoleSink { out: io::stdout() }
    }
}

impl<W: Write> ConsoleSink<W> {
    pub fn new(out: W) -> Self {
        ConsoleSink { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> ResultsSink for ConsoleSink<W> {
    fn trial_completed(&mut self, ordinal: usize, outcome: &TrialOutcome) -> io::Result<()> {
        writeln!(self.out, "Trial {}:", ordinal)?;
        match outcome {
            TrialOutcome::Collision(result) => writeln!(self.out, "{}", result.summary),
            TrialOutcome::Inconclusive { attempts } => writeln!(
                self.out,
                "{}\nNo collision after {} attempts (inconclusive)\n",
                rule(),
                attempts
            ),
        }
    }

    fn trial_failed(&mut self, ordinal: usize, error: &CollisionError) -> io::Result<()> {
        writeln!(self.out, "Trial {}:", ordinal)?;
        writeln!(self.out, "{}\nFailed: {}\n", rule(), error)
    }

    fn experiment_completed(&mut self, summary: &ExperimentSummary) -> io::Result<()> {
        writeln!(self.out, "Experiment Completed:")?;
        writeln!(self.out, "{}", rule())?;
        writeln!(self.out, "Number of trials completed: {}", summary.completed())?;
        match summary.mean() {
            Some(mean) => writeln!(self.out, "Average number of attempts: {}", mean)?,
            None => writeln!(self.out, "Average number of attempts: n/a")?,
        }
        writeln!(self.out, "Expected number of attempts: {:.0}", summary.expected_attempts)?;

        if summary.inconclusive > 0 {
            writeln!(self.out, "Inconclusive trials: {}", summary.inconclusive)?;
        }
        if !summary.failures.is_empty() {
            writeln!(self.out, "Failed trials: {}", summary.failures.len())?;
        }

        self.out.flush()
    }
}

/// Keeps every record in memory
#[derive(Debug, Default)]
pub struct CollectingSink {
    pub outcomes: Vec<(usize, TrialOutcome)>,
    pub failures: Vec<(usize, String)>,
    pub summary: Option<ExperimentSummary>,
}

impl ResultsSink for CollectingSink {
    fn trial_completed(&mut self, ordinal: usize, outcome: &TrialOutcome) -> io::Result<()> {
        self.outcomes.push((ordinal, outcome.clone()));
        Ok(())
    }

    fn trial_failed(&mut self, ordinal: usize, error: &CollisionError) -> io::Result<()> {
        self.failures.push((ordinal, error.to_string()));
        Ok(())
    }

    fn experiment_completed(&mut self, summary: &ExperimentSummary) -> io::Result<()> {
        self.summary = Some(summary.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prefix::Prefix;
    use crate::sampler::Input;
    use crate::strategy::StrategyKind;
    use crate::trial::TrialResult;

    fn render<F: FnOnce(&mut ConsoleSink<Vec<u8>>) -> io::Result<()>>(f: F) -> String {
        let mut sink = ConsoleSink::new(Vec::new());
        f(&mut sink).unwrap();
        String::from_utf8(sink.into_inner()).unwrap()
    }

    #[test]
    fn test_console_trial_record() {
        let outcome = TrialOutcome::Collision(TrialResult {
            attempts: 3,
            first_input: Input::from(b"abcde".to_vec()),
            second_input: Input::from(b"fghij".to_vec()),
            matched_prefix: Prefix::from_hex("ab"),
            summary: "collision summary\n".to_string(),
        });

        let text = render(|sink| sink.trial_completed(4, &outcome));
        assert_eq!(text, "Trial 4:\ncollision summary\n\n");

        let text = render(|sink| sink.trial_completed(5, &TrialOutcome::Inconclusive { attempts: 9 }));
        assert!(text.starts_with("Trial 5:\n"));
        assert!(text.contains("No collision after 9 attempts"));
    }

    #[test]
    fn test_console_failure_record() {
        let error = CollisionError::WorkerFailed("out of memory".to_string());
        let text = render(|sink| sink.trial_failed(2, &error));
        assert!(text.starts_with("Trial 2:\n"));
        assert!(text.contains("Failed: Trial worker failed: out of memory"));
    }

    #[test]
    fn test_console_summary() {
        let mut summary = ExperimentSummary::new(3, StrategyKind::Strong, 256.0);
        summary.record(10);
        summary.record(21);
        summary.record_failure("boom".to_string());

        let text = render(|sink| sink.experiment_completed(&summary));
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "Experiment Completed:");
        assert_eq!(lines[2], "Number of trials completed: 2");
        assert_eq!(lines[3], "Average number of attempts: 15");
        assert_eq!(lines[4], "Expected number of attempts: 20");
        assert_eq!(lines[5], "Failed trials: 1");
    }

    #[test]
    fn test_console_summary_without_results() {
        let summary = ExperimentSummary::new(1, StrategyKind::Weak, 256.0);
        let text = render(|sink| sink.experiment_completed(&summary));
        assert!(text.contains("Average number of attempts: n/a"));
    }
}
