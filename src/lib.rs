//! Brute-force collision search against truncated digests
//!
//! Every trial draws random alphanumeric inputs, hashes them and keeps only the first few hex
//! characters of the digest. A [`Weak`] search looks for a second input matching the prefix of a
//! target drawn up front; a [`Strong`] search (the birthday attack) looks for any two distinct
//! inputs sharing a prefix. An [`Experiment`] runs many trials on a worker pool and reports the
//! attempts each one needed.

pub mod error;
pub mod experiment;
pub mod prefix;
pub mod sampler;
pub mod sink;
pub mod strategy;
pub mod trial;

pub use error::{CollisionError, Result};
pub use experiment::{expected_attempts, Experiment, ExperimentSummary};
pub use prefix::{DigestAlgorithm, DigestPrefix, Prefix};
pub use sampler::{Input, InputSampler};
pub use sink::{CollectingSink, ConsoleSink, ResultsSink};
pub use strategy::{Collision, CollisionStrategy, Step, StrategyKind, Strong, Weak};
pub use trial::{run_trial, TrialConfig, TrialOutcome, TrialResult};
