//! The single pseudo-random source behind every randomised probe field.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::ops::RangeInclusive;
use std::sync::{Arc, Mutex, PoisonError};

/// Ephemeral port range (RFC 6335) used for probe source ports.
pub const EPHEMERAL_PORTS: RangeInclusive<u16> = 49152..=65535;

/// Process-scoped PRNG, seeded once and shared by all probes of a run.
///
/// Cloning shares the underlying generator. A fixed seed makes source ports,
/// sequence numbers and IP identifications reproducible.
#[derive(Clone, Debug)]
pub struct ProbeRng {
    inner: Arc<Mutex<StdRng>>,
}

impl ProbeRng {
    /// Seed from the operating system's entropy source.
    pub fn from_entropy() -> Self {
        Self::from_rng(StdRng::from_entropy())
    }

    /// Deterministic generator for reproducible runs and tests.
    pub fn seeded(seed: u64) -> Self {
        Self::from_rng(StdRng::seed_from_u64(seed))
    }

    fn from_rng(rng: StdRng) -> Self {
        Self {
            inner: Arc::new(Mutex::new(rng)),
        }
    }

    /// A source port in the ephemeral range.
    pub fn source_port(&self) -> u16 {
        self.with(|rng| rng.gen_range(EPHEMERAL_PORTS))
    }

    /// An initial TCP sequence number.
    pub fn sequence(&self) -> u32 {
        self.with(|rng| rng.gen())
    }

    /// An IPv4 identification value.
    pub fn identification(&self) -> u16 {
        self.with(|rng| rng.gen())
    }

    fn with<T>(&self, f: impl FnOnce(&mut StdRng) -> T) -> T {
        // A panic while holding the lock cannot leave the generator in an
        // unusable state, so poisoning is ignored.
        let mut rng = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut rng)
    }
}

impl Default for ProbeRng {
    fn default() -> Self {
        Self::from_entropy()
    }
}
