use std::collections::HashSet;
use std::fmt;

use rand::Rng;

use crate::error::{CollisionError, Result};

/// Upper and lower case ASCII letters followed by digits
pub const ALPHANUMERIC: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

/// Default number of symbols in each generated input
pub const DEFAULT_INPUT_LENGTH: usize = 5;

/// A generated plaintext
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Input(Vec<u8>);

impl Input {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<u8>> for Input {
    fn from(bytes: Vec<u8>) -> Self {
        Input(bytes)
    }
}

impl fmt::Display for Input {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&String::from_utf8_lossy(&self.0))
    }
}

/// Inputs the sampler must not hand back
pub trait Exclusion {
    fn excludes(&self, input: &Input) -> bool;
}

/// Nothing is excluded
impl Exclusion for () {
    fn excludes(&self, _input: &Input) -> bool {
        false
    }
}

impl Exclusion for Input {
    fn excludes(&self, input: &Input) -> bool {
        self == input
    }
}

impl Exclusion for HashSet<Input> {
    fn excludes(&self, input: &Input) -> bool {
        self.contains(input)
    }
}

/// Draws fixed-length inputs uniformly from an alphabet
///
/// Each sampler owns its random source, so samplers running on different workers never contend
/// on (or duplicate) generator state.
pub struct InputSampler<R> {
    rng: R,
    alphabet: Vec<u8>,
    length: usize,
}

impl<R: Rng> InputSampler<R> {
    /// Sampler over the alphanumeric alphabet
    pub fn new(rng: R, length: usize) -> Result<Self> {
        Self::with_alphabet(rng, ALPHANUMERIC, length)
    }

    pub fn with_alphabet(rng: R, alphabet: &[u8], length: usize) -> Result<Self> {
        if length == 0 {
            return Err(CollisionError::InvalidInputLength);
        }

        let distinct: HashSet<u8> = alphabet.iter().copied().collect();
        if alphabet.is_empty() || distinct.len() != alphabet.len() {
            return Err(CollisionError::InvalidAlphabet);
        }

        Ok(InputSampler { rng, alphabet: alphabet.to_vec(), length })
    }

    /// Draws inputs until one is not excluded.
    ///
    /// Loops forever if `excluded` covers every possible input.
    pub fn sample<E: Exclusion + ?Sized>(&mut self, excluded: &E) -> Input {
        loop {
            let candidate = self.draw();
            if !excluded.excludes(&candidate) {
                return candidate;
            }
        }
    }

    fn draw(&mut self) -> Input {
        let alphabet = &self.alphabet;
        let rng = &mut self.rng;
        let bytes = (0..self.length)
            .map(|_| alphabet[rng.gen_range(0..alphabet.len())])
            .collect();

        Input(bytes)
    }
}
