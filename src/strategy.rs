use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

use rand::Rng;

use crate::prefix::{DigestPrefix, Prefix};
use crate::sampler::{Input, InputSampler};

/// Two distinct inputs sharing a prefix
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Collision {
    pub first: Input,
    pub second: Input,
    pub prefix: Prefix,
}

/// Result of a single search step
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    Searching,
    Found(Collision),
}

/// A collision search, split into a one-off setup and a repeated step
///
/// The runner owns the state and threads it through every `step` call; nothing is shared between
/// trials.
pub trait CollisionStrategy {
    type State;

    /// Labels for the two inputs of a reported collision
    const LABELS: (&'static str, &'static str);

    fn initialize<R: Rng>(&self, sampler: &mut InputSampler<R>, digester: &DigestPrefix)
        -> Self::State;

    fn step<R: Rng>(
        &self,
        state: &mut Self::State,
        sampler: &mut InputSampler<R>,
        digester: &DigestPrefix,
    ) -> Step;
}

/// Which attack an experiment runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyKind {
    Weak,
    Strong,
}

impl FromStr for StrategyKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "weak" => Ok(StrategyKind::Weak),
            "strong" => Ok(StrategyKind::Strong),
            other => Err(format!("unknown strategy '{}', expected weak or strong", other)),
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StrategyKind::Weak => write!(f, "weak"),
            StrategyKind::Strong => write!(f, "strong"),
        }
    }
}

/// Searches for a second input matching the prefix of a target drawn up front
pub struct Weak;

/// The target fixed at the start of a weak search
#[derive(Debug, Clone)]
pub struct WeakState {
    pub target: Input,
    pub target_prefix: Prefix,
}

impl CollisionStrategy for Weak {
    type State = WeakState;

    const LABELS: (&'static str, &'static str) = ("Initial Data", "Results Data");

    fn initialize<R: Rng>(&self, sampler: &mut InputSampler<R>, digester: &DigestPrefix) -> WeakState {
        let target = sampler.sample(&());
        let target_prefix = digester.prefix_of(&target);

        WeakState { target, target_prefix }
    }

    fn step<R: Rng>(
        &self,
        state: &mut WeakState,
        sampler: &mut InputSampler<R>,
        digester: &DigestPrefix,
    ) -> Step {
        let input = sampler.sample(&state.target);
        let prefix = digester.prefix_of(&input);

        if prefix != state.target_prefix {
            return Step::Searching;
        }

        Step::Found(Collision { first: state.target.clone(), second: input, prefix })
    }
}

/// Birthday search: any two distinct inputs with the same prefix
pub struct Strong;

/// Prefixes observed so far and the first input that produced each of them
#[derive(Debug, Clone, Default)]
pub struct StrongState {
    pub observed: HashMap<Prefix, Input>,
    // Mirrors the values of `observed` so duplicate plaintexts can be rejected in O(1)
    drawn: HashSet<Input>,
}

impl CollisionStrategy for Strong {
    type State = StrongState;

    const LABELS: (&'static str, &'static str) = ("1st Data", "2nd Data");

    fn initialize<R: Rng>(&self, _sampler: &mut InputSampler<R>, _digester: &DigestPrefix) -> StrongState {
        StrongState::default()
    }

    fn step<R: Rng>(
        &self,
        state: &mut StrongState,
        sampler: &mut InputSampler<R>,
        digester: &DigestPrefix,
    ) -> Step {
        let input = sampler.sample(&state.drawn);
        let prefix = digester.prefix_of(&input);

        if let Some(previous) = state.observed.get(&prefix) {
            return Step::Found(Collision { first: previous.clone(), second: input, prefix });
        }

        state.drawn.insert(input.clone());
        state.observed.insert(prefix, input);
        Step::Searching
    }
}
