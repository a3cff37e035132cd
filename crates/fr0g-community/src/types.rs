use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Short description of one persona invited into a community.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersonaSummary {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub expertise: Vec<String>,
}

/// A transient group of personas reviewing one topic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Community {
    pub id: String,
    pub topic: String,
    pub members: Vec<PersonaSummary>,
    pub created_at: DateTime<Utc>,
    /// One of `forming`, `active`, `disbanded`.
    pub status: String,
}

/// One persona's verdict on a piece of content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersonaReview {
    pub persona_id: String,
    pub persona_name: String,
    #[serde(default)]
    pub expertise: Vec<String>,
    pub review: String,
    /// 0.0–1.0 threat assessment.
    pub score: f64,
    /// 0.0–1.0 reviewer self-confidence.
    pub confidence: f64,
    #[serde(default)]
    pub tags: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

/// Aggregate produced from the per-persona reviews.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Consensus {
    /// 0.0–1.0 fused threat score.
    pub overall_score: f64,
    /// 0.0–1.0, high when the reviewers agree.
    pub agreement: f64,
    pub recommendation: String,
    #[serde(default)]
    pub key_points: Vec<String>,
    /// 0.0–1.0.
    pub confidence_level: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewStatus {
    Pending,
    InProgress,
    Completed,
}

/// The full result of one `submit_for_review` call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommunityReview {
    pub id: String,
    pub community_id: String,
    pub reviews: Vec<PersonaReview>,
    pub consensus: Consensus,
    pub status: ReviewStatus,
    pub created_at: DateTime<Utc>,
}
