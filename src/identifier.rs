//! Public record identifiers.
//!
//! A public id is an opaque 12-digit ticket number drawn at random, so it
//! says nothing about where the record sits in the ledger. Records written
//! before public ids existed are still addressed by their 1-based position.

use crate::error::{LedgerError, Result};
use rand::rngs::StdRng;
use rand::{Rng, RngCore, SeedableRng};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const PUBLIC_ID_LEN: usize = 12;
const PUBLIC_ID_MIN: u64 = 100_000_000_000;
const PUBLIC_ID_MAX: u64 = 999_999_999_999;

/// Re-roll budget for collision-checked allocation.
pub const MAX_ALLOCATION_ATTEMPTS: u32 = 64;

/// A 12-digit decimal record identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PublicId(String);

impl PublicId {
    /// Parse user input; surrounding whitespace is ignored.
    pub fn parse(input: &str) -> Result<Self> {
        let trimmed = input.trim();
        if trimmed.len() != PUBLIC_ID_LEN || !trimmed.bytes().all(|b| b.is_ascii_digit()) {
            return Err(LedgerError::MalformedIdentifier(input.to_string()));
        }
        Ok(Self(trimmed.to_string()))
    }

    fn from_number(n: u64) -> Self {
        Self(format!("{:0width$}", n, width = PUBLIC_ID_LEN))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PublicId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for PublicId {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for PublicId {
    type Error = LedgerError;

    fn try_from(s: String) -> Result<Self> {
        Self::parse(&s)
    }
}

impl From<PublicId> for String {
    fn from(id: PublicId) -> Self {
        id.0
    }
}

/// Lookup key covering both identifier schemes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordRef {
    Public(PublicId),
    /// 1-based ledger position, the only key legacy records have.
    Position(u64),
}

impl fmt::Display for RecordRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordRef::Public(id) => write!(f, "{}", id),
            RecordRef::Position(pos) => write!(f, "#{}", pos),
        }
    }
}

/// Whether allocation consults existing ids before handing one out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CollisionPolicy {
    /// Re-roll until the id is unused.
    #[default]
    Check,
    /// Take the first draw as-is; duplicates are possible.
    Unchecked,
}

/// Draws public ids from a random source.
pub struct IdAllocator {
    rng: Box<dyn RngCore>,
}

impl IdAllocator {
    /// Allocator backed by OS-seeded randomness.
    pub fn new() -> Self {
        Self {
            rng: Box::new(StdRng::from_entropy()),
        }
    }

    /// Reproducible allocator (for tests / replay).
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: Box::new(StdRng::seed_from_u64(seed)),
        }
    }

    /// Uniform draw from the 12-digit range; never has a leading zero.
    pub fn allocate(&mut self) -> PublicId {
        PublicId::from_number(self.rng.gen_range(PUBLIC_ID_MIN..=PUBLIC_ID_MAX))
    }

    /// Draw until `is_taken` rejects nothing, up to [`MAX_ALLOCATION_ATTEMPTS`].
    pub fn allocate_unique<F>(&mut self, mut is_taken: F) -> Result<PublicId>
    where
        F: FnMut(&PublicId) -> bool,
    {
        for attempt in 1..=MAX_ALLOCATION_ATTEMPTS {
            let id = self.allocate();
            if !is_taken(&id) {
                return Ok(id);
            }
            tracing::warn!(%id, attempt, "public id collision, re-rolling");
        }
        Err(LedgerError::IdentifierExhausted(MAX_ALLOCATION_ATTEMPTS))
    }

    /// Allocate according to `policy`.
    pub fn allocate_with<F>(&mut self, policy: CollisionPolicy, is_taken: F) -> Result<PublicId>
    where
        F: FnMut(&PublicId) -> bool,
    {
        match policy {
            CollisionPolicy::Check => self.allocate_unique(is_taken),
            CollisionPolicy::Unchecked => Ok(self.allocate()),
        }
    }
}

impl Default for IdAllocator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocated_ids_are_twelve_digits() {
        let mut alloc = IdAllocator::seeded(7);
        for _ in 0..500 {
            let id = alloc.allocate();
            assert_eq!(id.as_str().len(), 12);
            assert_ne!(id.as_str().as_bytes()[0], b'0');
            assert!(PublicId::parse(id.as_str()).is_ok());
        }
    }

    #[test]
    fn parse_rejects_bad_input() {
        for bad in ["123", "", "12345678901a", "1234567890123", "-12345678901"] {
            assert!(matches!(
                PublicId::parse(bad),
                Err(LedgerError::MalformedIdentifier(_))
            ));
        }
    }

    #[test]
    fn parse_trims_whitespace() {
        let id = PublicId::parse("  123456789012 ").unwrap();
        assert_eq!(id.as_str(), "123456789012");
    }

    #[test]
    fn check_policy_rerolls_on_collision() {
        let first = IdAllocator::seeded(42).allocate();

        let mut alloc = IdAllocator::seeded(42);
        let id = alloc
            .allocate_with(CollisionPolicy::Check, |candidate| *candidate == first)
            .unwrap();
        assert_ne!(id, first);
    }

    #[test]
    fn unchecked_policy_keeps_first_draw() {
        let first = IdAllocator::seeded(42).allocate();

        let mut alloc = IdAllocator::seeded(42);
        let id = alloc
            .allocate_with(CollisionPolicy::Unchecked, |candidate| *candidate == first)
            .unwrap();
        assert_eq!(id, first);
    }

    #[test]
    fn exhausted_when_everything_is_taken() {
        let mut alloc = IdAllocator::seeded(1);
        let err = alloc.allocate_unique(|_| true).unwrap_err();
        assert!(matches!(
            err,
            LedgerError::IdentifierExhausted(MAX_ALLOCATION_ATTEMPTS)
        ));
    }

    #[test]
    fn serde_validates_on_deserialize() {
        let ok: PublicId = serde_json::from_str("\"100000000000\"").unwrap();
        assert_eq!(ok.to_string(), "100000000000");
        assert!(serde_json::from_str::<PublicId>("\"42\"").is_err());
    }
}
