//! Adaptive learning: experience ingest and learning-rate adaptation.
//!
//! The learner keeps a bounded experience buffer and nudges its learning
//! rate by `feedback × adaptation_factor` per experience, clamped to
//! [0.01, 0.5]. The adaptation score summarises recent feedback quality.

use std::collections::VecDeque;
use std::sync::RwLock;

use tracing::debug;

use crate::types::Experience;

/// Experiences retained before the oldest block is dropped.
const BUFFER_CAPACITY: usize = 1_000;
/// Oldest experiences dropped in one batch when the buffer fills.
const DROP_BATCH: usize = 100;
/// Learning-rate step per unit of feedback.
const ADAPTATION_FACTOR: f64 = 0.05;
/// Learning-rate bounds.
const RATE_MIN: f64 = 0.01;
const RATE_MAX: f64 = 0.5;
/// Experiences considered by `adaptation_score`.
const SCORE_WINDOW: usize = 50;

struct LearnerState {
    buffer: VecDeque<Experience>,
    learning_rate: f64,
}

/// Thread-safe adaptive learner shared by the cognitive engine and the
/// workflow engine's learning-integration step.
pub struct AdaptiveLearner {
    state: RwLock<LearnerState>,
}

impl AdaptiveLearner {
    pub fn new(initial_rate: f64) -> Self {
        Self {
            state: RwLock::new(LearnerState {
                buffer: VecDeque::with_capacity(BUFFER_CAPACITY),
                learning_rate: initial_rate.clamp(RATE_MIN, RATE_MAX),
            }),
        }
    }

    /// Ingest one experience and adapt the learning rate.
    pub fn add_experience(&self, experience: Experience) {
        let mut state = self.state.write().unwrap();

        let next = state.learning_rate + experience.feedback * ADAPTATION_FACTOR;
        state.learning_rate = next.clamp(RATE_MIN, RATE_MAX);

        if state.buffer.len() >= BUFFER_CAPACITY {
            for _ in 0..DROP_BATCH {
                state.buffer.pop_front();
            }
            debug!(dropped = DROP_BATCH, "experience buffer trimmed");
        }
        state.buffer.push_back(experience);
    }

    pub fn learning_rate(&self) -> f64 {
        self.state.read().unwrap().learning_rate
    }

    pub fn experience_count(&self) -> usize {
        self.state.read().unwrap().buffer.len()
    }

    /// Score recent adaptation quality in [0, 1].
    ///
    /// Base: average feedback of the last 50 experiences mapped via
    /// `(avg + 1) / 2`. Each improving step between consecutive experiences
    /// adds 0.1; each regressing step subtracts 0.05.
    pub fn adaptation_score(&self) -> f64 {
        let state = self.state.read().unwrap();
        let recent: Vec<f64> = state
            .buffer
            .iter()
            .rev()
            .take(SCORE_WINDOW)
            .map(|e| e.feedback)
            .collect();
        if recent.is_empty() {
            return 0.0;
        }
        // `recent` is newest-first; restore chronological order for the trend.
        let chronological: Vec<f64> = recent.into_iter().rev().collect();

        let avg: f64 = chronological.iter().sum::<f64>() / chronological.len() as f64;
        let mut score = (avg + 1.0) / 2.0;

        for pair in chronological.windows(2) {
            if pair[1] > pair[0] {
                score += 0.1;
            } else if pair[1] < pair[0] {
                score -= 0.05;
            }
        }
        score.clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn experience(feedback: f64) -> Experience {
        Experience::new("test", feedback, 0.5, "unit test")
    }

    #[test]
    fn positive_feedback_raises_rate_to_upper_bound() {
        let learner = AdaptiveLearner::new(0.1);
        let mut previous = learner.learning_rate();
        for _ in 0..20 {
            learner.add_experience(experience(1.0));
            let rate = learner.learning_rate();
            assert!(rate >= previous, "rate must climb monotonically");
            previous = rate;
        }
        assert_eq!(learner.learning_rate(), 0.5);
    }

    #[test]
    fn negative_feedback_lowers_rate_to_floor() {
        let learner = AdaptiveLearner::new(0.1);
        let mut previous = learner.learning_rate();
        for _ in 0..20 {
            learner.add_experience(experience(-1.0));
            let rate = learner.learning_rate();
            assert!(rate <= previous, "rate must fall monotonically");
            previous = rate;
        }
        assert_eq!(learner.learning_rate(), 0.01);
    }

    #[test]
    fn buffer_drops_oldest_batch_when_full() {
        let learner = AdaptiveLearner::new(0.1);
        for _ in 0..BUFFER_CAPACITY {
            learner.add_experience(experience(0.0));
        }
        assert_eq!(learner.experience_count(), BUFFER_CAPACITY);
        learner.add_experience(experience(0.0));
        assert_eq!(learner.experience_count(), BUFFER_CAPACITY - DROP_BATCH + 1);
    }

    #[test]
    fn adaptation_score_empty_is_zero() {
        let learner = AdaptiveLearner::new(0.1);
        assert_eq!(learner.adaptation_score(), 0.0);
    }

    #[test]
    fn steady_positive_feedback_scores_high() {
        let learner = AdaptiveLearner::new(0.1);
        for _ in 0..10 {
            learner.add_experience(experience(1.0));
        }
        assert_eq!(learner.adaptation_score(), 1.0);
    }

    #[test]
    fn improving_trend_beats_flat_average() {
        let flat = AdaptiveLearner::new(0.1);
        for _ in 0..4 {
            flat.add_experience(experience(0.0));
        }

        let improving = AdaptiveLearner::new(0.1);
        for feedback in [-0.3, -0.1, 0.1, 0.3] {
            improving.add_experience(experience(feedback));
        }

        // Same average feedback (0.0) but the improving stream earns the
        // trend bonus.
        assert!(improving.adaptation_score() > flat.adaptation_score());
    }

    #[test]
    fn score_stays_in_unit_interval() {
        let learner = AdaptiveLearner::new(0.1);
        for i in 0..SCORE_WINDOW {
            // Strictly alternating feedback exercises both trend branches.
            let f = if i % 2 == 0 { 0.9 } else { -0.9 };
            learner.add_experience(experience(f));
        }
        let score = learner.adaptation_score();
        assert!((0.0..=1.0).contains(&score));
    }
}
