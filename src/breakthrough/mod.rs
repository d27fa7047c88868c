//! Breakthrough detection

pub mod scorer;

pub use scorer::{is_breakthrough, BreakthroughAnalysis, BreakthroughLevel, BreakthroughScorer};
