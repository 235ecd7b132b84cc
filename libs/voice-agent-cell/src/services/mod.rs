pub mod intake;
pub mod normalizer;

pub use intake::VoiceIntakeService;
pub use normalizer::{DateTimeNormalizer, HeuristicNormalizer};
