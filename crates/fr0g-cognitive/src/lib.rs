pub mod engine;
pub mod learning;
pub mod recognizer;
pub mod types;

pub use engine::CognitiveEngine;
pub use learning::AdaptiveLearner;
pub use recognizer::PatternRecognizer;
pub use types::{
    CognitiveConfig, Experience, Insight, IntelligenceMetrics, Pattern, PatternKind, Reflection,
    SystemAwareness,
};
