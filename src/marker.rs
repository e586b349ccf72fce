//! Completion Marker Generation
//!
//! Produces the long token that the remote prompt is redefined to print
//! after every command. The token only has to be stable for one shell
//! session and practically impossible to appear in genuine output.

use chrono::{DateTime, TimeZone, Utc};
use sha1::{Digest, Sha1};

/// Source of wall-clock time for marker generation
pub trait Clock: Send + Sync {
    /// Current time
    fn now(&self) -> DateTime<Utc>;
}

/// Source of random values for marker generation
pub trait RandomSource: Send + Sync {
    /// A fresh random 32-bit value
    fn random_u32(&self) -> u32;
}

/// System clock backed by `chrono::Utc::now`
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Thread-local RNG from `rand`
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadRandom;

impl RandomSource for ThreadRandom {
    fn random_u32(&self) -> u32 {
        rand::random::<u32>()
    }
}

/// Clock that always reports the same instant
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl FixedClock {
    /// Build from unix seconds and microseconds
    pub fn from_unix(secs: i64, micros: u32) -> Self {
        let time = Utc
            .timestamp_opt(secs, micros.saturating_mul(1_000))
            .single()
            .unwrap_or_default();
        Self(time)
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// Random source that always yields the same value
#[derive(Debug, Clone, Copy)]
pub struct FixedRandom(pub u32);

impl RandomSource for FixedRandom {
    fn random_u32(&self) -> u32 {
        self.0
    }
}

/// Builds completion markers from a host identifier, the time and a random value
pub struct MarkerGenerator {
    clock: Box<dyn Clock>,
    random: Box<dyn RandomSource>,
}

impl MarkerGenerator {
    /// Create a generator with explicit time and randomness sources
    pub fn new(clock: Box<dyn Clock>, random: Box<dyn RandomSource>) -> Self {
        Self { clock, random }
    }

    /// Generator with fixed inputs, producing the same marker every time
    pub fn deterministic(secs: i64, micros: u32, random: u32) -> Self {
        Self::new(
            Box::new(FixedClock::from_unix(secs, micros)),
            Box::new(FixedRandom(random)),
        )
    }

    /// Produce a marker for the given host.
    ///
    /// The marker is the hex SHA-1 of `host:seconds:micros:random` followed by
    /// the hex SHA-1 of that digest, 80 lowercase hex characters in total.
    pub fn generate(&self, host: &str) -> String {
        let now = self.clock.now();
        let seed = format!(
            "{}:{}:{}:{}",
            host,
            now.timestamp(),
            now.timestamp_subsec_micros(),
            self.random.random_u32()
        );

        let mut marker = hex_sha1(seed.as_bytes());
        let tail = hex_sha1(marker.as_bytes());
        marker.push_str(&tail);
        marker
    }
}

impl Default for MarkerGenerator {
    fn default() -> Self {
        Self::new(Box::new(SystemClock), Box::new(ThreadRandom))
    }
}

impl std::fmt::Debug for MarkerGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MarkerGenerator").finish_non_exhaustive()
    }
}

fn hex_sha1(data: &[u8]) -> String {
    let mut hasher = Sha1::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}
