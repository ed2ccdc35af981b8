//! Internal utilities.
//!
//! These utilities are intentionally minimal to keep runs reproducible under
//! virtual time.

pub mod det_rng;
pub mod entropy;

pub use det_rng::DetRng;
pub use entropy::{DetEntropy, EntropySource, OsEntropy, ScriptedEntropy};
