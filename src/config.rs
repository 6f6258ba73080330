/*!
 * Spin Configuration
 *
 * Runtime tuning for the optimistic spin phase of the hybrid lock
 */

/// Spin tuning for blocking acquisition
///
/// A contended `enter` spins briefly before parking on the internal
/// condvar; these knobs bound that spin. Spinning pays off when the
/// owner typically exits within a few hundred nanoseconds, and wastes
/// CPU otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpinConfig {
    /// Maximum spin iterations before parking
    pub max_spins: u32,
    /// Yield to the scheduler every N iterations
    pub yield_every: u32,
}

impl Default for SpinConfig {
    fn default() -> Self {
        Self {
            max_spins: 140,
            yield_every: 10,
        }
    }
}

impl SpinConfig {
    /// No spinning; contended callers park immediately
    ///
    /// Best when hold times are known to be long. Also keeps parking
    /// deterministic in tests.
    pub const fn no_spin() -> Self {
        Self {
            max_spins: 0,
            yield_every: 1,
        }
    }

    /// Spin harder before parking (hold times expected < 10µs)
    pub const fn low_latency() -> Self {
        Self {
            max_spins: 1000,
            yield_every: 25,
        }
    }
}
