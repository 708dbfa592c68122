use std::fmt;
use std::str::FromStr;

use sha2::{Digest, Sha256};

use crate::error::{CollisionError, Result};
use crate::sampler::Input;

/// Default number of hex characters kept from each digest (24 bits)
pub const DEFAULT_PREFIX_WIDTH: usize = 6;

/// Digest algorithms an experiment can be configured with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DigestAlgorithm {
    Sha256,
    Md5,
}

impl DigestAlgorithm {
    /// Number of hex characters in a full digest
    pub fn hex_len(self) -> usize {
        match self {
            DigestAlgorithm::Sha256 => 64,
            DigestAlgorithm::Md5 => 32,
        }
    }

    fn digest(self, bytes: &[u8]) -> Vec<u8> {
        match self {
            DigestAlgorithm::Sha256 => Sha256::digest(bytes).to_vec(),
            DigestAlgorithm::Md5 => md5::compute(bytes).to_vec(),
        }
    }
}

impl Default for DigestAlgorithm {
    fn default() -> Self {
        DigestAlgorithm::Sha256
    }
}

impl FromStr for DigestAlgorithm {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sha256" | "sha-256" => Ok(DigestAlgorithm::Sha256),
            "md5" => Ok(DigestAlgorithm::Md5),
            other => Err(format!("unknown digest '{}', expected sha256 or md5", other)),
        }
    }
}

impl fmt::Display for DigestAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DigestAlgorithm::Sha256 => write!(f, "sha256"),
            DigestAlgorithm::Md5 => write!(f, "md5"),
        }
    }
}

/// Leading lowercase hex characters of a digest
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Prefix(String);

impl Prefix {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[cfg(test)]
    pub(crate) fn from_hex(hex: &str) -> Self {
        Prefix(hex.to_string())
    }
}

impl fmt::Display for Prefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Digests inputs and truncates the hex encoding to `width` characters
///
/// The truncation is what makes a brute-force search tractable: a width of `k` hex characters
/// leaves a space of `16^k` prefixes.
#[derive(Debug, Clone, Copy)]
pub struct DigestPrefix {
    algorithm: DigestAlgorithm,
    width: usize,
}

impl DigestPrefix {
    pub fn new(algorithm: DigestAlgorithm, width: usize) -> Result<Self> {
        let max = algorithm.hex_len();
        if width == 0 || width > max {
            return Err(CollisionError::InvalidPrefixWidth { width, max });
        }

        Ok(DigestPrefix { algorithm, width })
    }

    /// Number of distinct prefixes, i.e. `16^width`
    pub fn space_size(&self) -> f64 {
        16f64.powi(self.width as i32)
    }

    pub fn prefix_of(&self, input: &Input) -> Prefix {
        let digest = self.algorithm.digest(input.as_bytes());

        // Each byte encodes to two hex characters, so only the leading bytes are needed
        let n_bytes = (self.width + 1) / 2;
        let mut encoded = hex::encode(&digest[..n_bytes]);
        encoded.truncate(self.width);

        Prefix(encoded)
    }
}
