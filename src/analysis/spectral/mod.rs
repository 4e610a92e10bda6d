// Spectral secondary path: fingerprints, profiles and matching

pub mod fft;
pub mod matcher;
pub mod profile;

pub use matcher::{best_match, ProfileMatch, SpectralProfileMatcher};
pub use profile::{
    average_fingerprints, cosine_similarity, FingerprintExtractor, ProfileKind, SoundProfile,
    DEFAULT_SIMILARITY_THRESHOLD, FINGERPRINT_BINS,
};
