// Tonal analysis module
// Key inference and scale membership for note filtering and key signatures

pub mod key;
pub mod profiles;

pub use key::{
    estimate_key, key_confidence, rank_keys, try_estimate_key, KeyCandidate, KeyError,
    KeyEstimate, Mode, PitchClassHistogram,
};
