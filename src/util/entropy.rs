//! Entropy source abstraction for deterministic testing.
//!
//! Simulated remote calls draw their success/failure decision from an
//! [`EntropySource`] carried by the [`Cx`](crate::Cx). Production code uses
//! [`OsEntropy`]; tests and virtual-time runs use [`DetEntropy`] or
//! [`ScriptedEntropy`].

use crate::util::DetRng;
use parking_lot::Mutex;
use std::collections::VecDeque;

/// Core trait for entropy providers.
pub trait EntropySource: Send + Sync + 'static {
    /// Fill a buffer with entropy bytes.
    fn fill_bytes(&self, dest: &mut [u8]);

    /// Return the next random `u64`.
    fn next_u64(&self) -> u64;

    /// Return a uniform draw in `[0, 1)`.
    fn next_f64(&self) -> f64 {
        // 53 high bits fill the f64 mantissa exactly.
        #[allow(clippy::cast_precision_loss)]
        let draw = (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64;
        draw
    }

    /// Stable identifier for tracing and diagnostics.
    fn source_id(&self) -> &'static str;
}

/// OS-backed entropy source for production use.
#[derive(Debug, Default, Clone, Copy)]
pub struct OsEntropy;

impl EntropySource for OsEntropy {
    fn fill_bytes(&self, dest: &mut [u8]) {
        if getrandom::fill(dest).is_err() {
            // The OS source is unavailable; fall back to a time-seeded stream
            // rather than aborting a simulated call.
            let seed = std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .map_or(0, |d| d.as_nanos() as u64);
            DetRng::new(seed).fill_bytes(dest);
        }
    }

    fn next_u64(&self) -> u64 {
        let mut buf = [0u8; 8];
        self.fill_bytes(&mut buf);
        u64::from_le_bytes(buf)
    }

    fn source_id(&self) -> &'static str {
        "os"
    }
}

/// Deterministic entropy source seeded once.
#[derive(Debug)]
pub struct DetEntropy {
    rng: Mutex<DetRng>,
    seed: u64,
}

impl DetEntropy {
    /// Create a deterministic entropy source from a seed.
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self {
            rng: Mutex::new(DetRng::new(seed)),
            seed,
        }
    }

    /// The seed this source was created with.
    #[must_use]
    pub const fn seed(&self) -> u64 {
        self.seed
    }
}

impl EntropySource for DetEntropy {
    fn fill_bytes(&self, dest: &mut [u8]) {
        self.rng.lock().fill_bytes(dest);
    }

    fn next_u64(&self) -> u64 {
        self.rng.lock().next_u64()
    }

    fn source_id(&self) -> &'static str {
        "deterministic"
    }
}

/// Replays a fixed list of `[0, 1)` draws, then repeats the last one.
///
/// Useful for forcing exact success/failure sequences out of a
/// [`SimulatedCall`](crate::remote::SimulatedCall): a draw below the call's
/// success probability succeeds.
#[derive(Debug)]
pub struct ScriptedEntropy {
    draws: Mutex<VecDeque<f64>>,
    last: Mutex<f64>,
}

impl ScriptedEntropy {
    /// Creates a source that yields `draws` in order.
    #[must_use]
    pub fn new(draws: impl IntoIterator<Item = f64>) -> Self {
        Self {
            draws: Mutex::new(draws.into_iter().collect()),
            last: Mutex::new(0.0),
        }
    }
}

impl EntropySource for ScriptedEntropy {
    fn fill_bytes(&self, dest: &mut [u8]) {
        let mut rng = DetRng::new(self.next_u64());
        rng.fill_bytes(dest);
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn next_u64(&self) -> u64 {
        (self.next_f64() * (1u64 << 53) as f64) as u64
    }

    fn next_f64(&self) -> f64 {
        let mut last = self.last.lock();
        if let Some(draw) = self.draws.lock().pop_front() {
            *last = draw;
        }
        *last
    }

    fn source_id(&self) -> &'static str {
        "scripted"
    }
}
