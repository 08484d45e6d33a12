//! Injectable time and randomness.
//!
//! Message-Id, Date, Content-ID and boundary generation read from a
//! [`Clock`] and a [`RandomSource`]. Production code uses the system
//! implementations; tests pass [`FixedClock`] and [`SequenceRandom`] for
//! byte-for-byte reproducible output.

use chrono::{DateTime, FixedOffset, Local};
use rand::{Rng, RngCore};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Exclusive upper bound of [`RandomSource::token`].
pub const TOKEN_BOUND: u64 = 999_999;

/// Source of the current time.
pub trait Clock: Send + Sync {
    /// Returns the current local time with its UTC offset.
    fn now(&self) -> DateTime<FixedOffset>;
}

/// Source of random identifiers.
pub trait RandomSource: Send + Sync {
    /// Returns a number in `0..TOKEN_BOUND` used in identifiers.
    fn token(&self) -> u64;

    /// Fills `buf` with random bytes.
    fn fill(&self, buf: &mut [u8]);
}

/// Wall clock in the local timezone.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<FixedOffset> {
        Local::now().fixed_offset()
    }
}

/// Thread-local cryptographically secure RNG.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRandom;

impl RandomSource for SystemRandom {
    fn token(&self) -> u64 {
        rand::thread_rng().gen_range(0..TOKEN_BOUND)
    }

    fn fill(&self, buf: &mut [u8]) {
        rand::thread_rng().fill_bytes(buf);
    }
}

/// Clock frozen at one instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<FixedOffset>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<FixedOffset> {
        self.0
    }
}

/// Deterministic counter posing as a random source.
///
/// Every call advances the counter, so consecutive boundaries still differ.
#[derive(Debug, Default)]
pub struct SequenceRandom {
    next: AtomicU64,
}

impl SequenceRandom {
    /// Creates a sequence starting at `start`.
    #[must_use]
    pub const fn new(start: u64) -> Self {
        Self {
            next: AtomicU64::new(start),
        }
    }

    fn advance(&self) -> u64 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }
}

impl RandomSource for SequenceRandom {
    fn token(&self) -> u64 {
        self.advance() % TOKEN_BOUND
    }

    fn fill(&self, buf: &mut [u8]) {
        let seed = self.advance().to_be_bytes();
        for (i, b) in buf.iter_mut().enumerate() {
            *b = seed[i % seed.len()];
        }
    }
}

/// The clock and random source used by one builder.
#[derive(Clone)]
pub struct Sources {
    /// Time source.
    pub clock: Arc<dyn Clock>,
    /// Randomness source.
    pub random: Arc<dyn RandomSource>,
}

impl Sources {
    /// Creates sources from explicit implementations.
    pub fn new(clock: impl Clock + 'static, random: impl RandomSource + 'static) -> Self {
        Self {
            clock: Arc::new(clock),
            random: Arc::new(random),
        }
    }

    /// Returns a fresh hex boundary from 30 random bytes.
    #[must_use]
    pub fn boundary(&self) -> String {
        let mut buf = [0u8; 30];
        self.random.fill(&mut buf);
        hex(&buf)
    }
}

impl Default for Sources {
    fn default() -> Self {
        Self::new(SystemClock, SystemRandom)
    }
}

impl fmt::Debug for Sources {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sources").finish_non_exhaustive()
    }
}

/// Lowercase hex encoding.
pub(crate) fn hex(bytes: &[u8]) -> String {
    use std::fmt::Write as _;
    bytes
        .iter()
        .fold(String::with_capacity(bytes.len() * 2), |mut s, b| {
            let _ = write!(s, "{b:02x}");
            s
        })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_boundary_is_60_hex_chars() {
        let sources = Sources::default();
        let b = sources.boundary();
        assert_eq!(b.len(), 60);
        assert!(b.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_system_boundaries_differ() {
        let sources = Sources::default();
        assert_ne!(sources.boundary(), sources.boundary());
    }

    #[test]
    fn test_sequence_random_advances() {
        let random = SequenceRandom::new(7);
        assert_eq!(random.token(), 7);
        assert_eq!(random.token(), 8);

        let sources = Sources::new(SystemClock, SequenceRandom::new(1));
        assert_ne!(sources.boundary(), sources.boundary());
    }

    #[test]
    fn test_system_token_in_range() {
        for _ in 0..100 {
            assert!(SystemRandom.token() < TOKEN_BOUND);
        }
    }
}
