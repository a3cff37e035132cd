//! Deterministic in-process community: keyword-weighted threat scoring with
//! a fixed persona panel. Used when no AIP service is configured, and by
//! tests that need reproducible consensus.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;

use crate::error::{CommunityError, Result};
use crate::types::{
    Community, CommunityReview, Consensus, PersonaReview, PersonaSummary, ReviewStatus,
};

/// Keywords the panel treats as threat markers.
const THREAT_MARKERS: &[&str] = &[
    "free",
    "urgent",
    "winner",
    "prize",
    "click",
    "verify",
    "credentials",
    "bitcoin",
    "giveaway",
    "nitro",
    "press 1",
    "arrest",
    "suspended",
];
const MARKER_WEIGHT: f64 = 0.15;

/// (name, expertise, score bias) for the fixed panel. Bias models how
/// suspicious each reviewer's discipline makes them.
const PANEL: &[(&str, &[&str], f64)] = &[
    ("security-analyst", &["threat-intel", "phishing"], 0.10),
    ("linguist", &["rhetoric", "social-engineering"], 0.0),
    ("behavioral-psychologist", &["manipulation", "persuasion"], -0.05),
    ("fraud-investigator", &["payments", "scams"], 0.05),
    ("network-engineer", &["infrastructure", "urls"], -0.10),
];

pub struct MockCommunityClient {
    communities: Mutex<HashMap<String, Community>>,
    review_statuses: Mutex<HashMap<String, ReviewStatus>>,
}

impl MockCommunityClient {
    pub fn new() -> Self {
        Self {
            communities: Mutex::new(HashMap::new()),
            review_statuses: Mutex::new(HashMap::new()),
        }
    }

    /// Base threat score for a piece of content: marker hits × weight,
    /// capped below 1.0.
    fn base_score(content: &str) -> f64 {
        let lowered = content.to_lowercase();
        let hits = THREAT_MARKERS
            .iter()
            .filter(|marker| lowered.contains(*marker))
            .count();
        (0.05 + hits as f64 * MARKER_WEIGHT).min(0.95)
    }

    fn recommendation(score: f64) -> &'static str {
        if score >= 0.7 {
            "block and alert: the panel considers this content hostile"
        } else if score >= 0.4 {
            "flag for human review"
        } else {
            "no action needed"
        }
    }
}

impl Default for MockCommunityClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl crate::client::CommunityClient for MockCommunityClient {
    async fn create_community(&self, topic: &str, persona_count: usize) -> Result<Community> {
        let members: Vec<PersonaSummary> = PANEL
            .iter()
            .cycle()
            .take(persona_count.clamp(1, PANEL.len()))
            .enumerate()
            .map(|(i, (name, expertise, _))| PersonaSummary {
                id: format!("persona-{i}"),
                name: (*name).to_string(),
                expertise: expertise.iter().map(|e| e.to_string()).collect(),
            })
            .collect();

        let community = Community {
            id: uuid::Uuid::new_v4().to_string(),
            topic: topic.to_string(),
            members,
            created_at: Utc::now(),
            status: "active".to_string(),
        };
        self.communities
            .lock()
            .unwrap()
            .insert(community.id.clone(), community.clone());
        Ok(community)
    }

    async fn submit_for_review(
        &self,
        community_id: &str,
        content: &str,
    ) -> Result<CommunityReview> {
        let members = self.get_community_members(community_id).await?;
        let base = Self::base_score(content);

        let reviews: Vec<PersonaReview> = members
            .iter()
            .enumerate()
            .map(|(i, member)| {
                let (_, _, bias) = PANEL[i % PANEL.len()];
                let score = (base + bias).clamp(0.0, 1.0);
                PersonaReview {
                    persona_id: member.id.clone(),
                    persona_name: member.name.clone(),
                    expertise: member.expertise.clone(),
                    review: format!(
                        "{} assessment: content scores {score:.2} against known {} signals",
                        member.name,
                        member.expertise.first().map(String::as_str).unwrap_or("threat"),
                    ),
                    score,
                    confidence: 0.8,
                    tags: member.expertise.clone(),
                    timestamp: Utc::now(),
                }
            })
            .collect();

        let overall_score = if reviews.is_empty() {
            0.0
        } else {
            reviews.iter().map(|r| r.score).sum::<f64>() / reviews.len() as f64
        };
        let spread = reviews
            .iter()
            .map(|r| (r.score - overall_score).abs())
            .fold(0.0, f64::max);
        let consensus = Consensus {
            overall_score,
            agreement: (1.0 - spread).clamp(0.0, 1.0),
            recommendation: Self::recommendation(overall_score).to_string(),
            key_points: reviews.iter().map(|r| r.review.clone()).take(3).collect(),
            confidence_level: 0.8,
        };

        let review = CommunityReview {
            id: uuid::Uuid::new_v4().to_string(),
            community_id: community_id.to_string(),
            reviews,
            consensus,
            status: ReviewStatus::Completed,
            created_at: Utc::now(),
        };
        self.review_statuses
            .lock()
            .unwrap()
            .insert(review.id.clone(), ReviewStatus::Completed);
        Ok(review)
    }

    async fn get_review_status(&self, review_id: &str) -> Result<ReviewStatus> {
        self.review_statuses
            .lock()
            .unwrap()
            .get(review_id)
            .copied()
            .ok_or_else(|| CommunityError::UnknownReview {
                id: review_id.to_string(),
            })
    }

    async fn get_community_members(&self, community_id: &str) -> Result<Vec<PersonaSummary>> {
        self.communities
            .lock()
            .unwrap()
            .get(community_id)
            .map(|c| c.members.clone())
            .ok_or_else(|| CommunityError::UnknownCommunity {
                id: community_id.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::CommunityClient;

    #[tokio::test]
    async fn community_carries_requested_panel() {
        let client = MockCommunityClient::new();
        let community = client.create_community("sms review", 3).await.unwrap();
        assert_eq!(community.members.len(), 3);
        assert_eq!(community.status, "active");
    }

    #[tokio::test]
    async fn hostile_content_scores_high_with_block_recommendation() {
        let client = MockCommunityClient::new();
        let community = client.create_community("sms review", 5).await.unwrap();
        let review = client
            .submit_for_review(
                &community.id,
                "URGENT! You are a winner - click to verify your free prize",
            )
            .await
            .unwrap();
        assert!(review.consensus.overall_score >= 0.7);
        assert!(review.consensus.recommendation.contains("block"));
        assert_eq!(review.reviews.len(), 5);
    }

    #[tokio::test]
    async fn benign_content_scores_low() {
        let client = MockCommunityClient::new();
        let community = client.create_community("sms review", 5).await.unwrap();
        let review = client
            .submit_for_review(&community.id, "meeting moved to 3pm, room 204")
            .await
            .unwrap();
        assert!(review.consensus.overall_score < 0.2);
        assert_eq!(review.consensus.recommendation, "no action needed");
    }

    #[tokio::test]
    async fn scoring_is_deterministic() {
        let client = MockCommunityClient::new();
        let community = client.create_community("sms review", 5).await.unwrap();
        let a = client
            .submit_for_review(&community.id, "free bitcoin giveaway")
            .await
            .unwrap();
        let b = client
            .submit_for_review(&community.id, "free bitcoin giveaway")
            .await
            .unwrap();
        assert_eq!(a.consensus.overall_score, b.consensus.overall_score);
        assert_eq!(a.consensus.agreement, b.consensus.agreement);
    }

    #[tokio::test]
    async fn review_status_is_tracked() {
        let client = MockCommunityClient::new();
        let community = client.create_community("topic", 2).await.unwrap();
        let review = client.submit_for_review(&community.id, "hi").await.unwrap();
        assert_eq!(
            client.get_review_status(&review.id).await.unwrap(),
            ReviewStatus::Completed
        );
        assert!(client.get_review_status("nope").await.is_err());
    }

    #[tokio::test]
    async fn unknown_community_is_an_error() {
        let client = MockCommunityClient::new();
        assert!(client.submit_for_review("missing", "x").await.is_err());
    }
}
