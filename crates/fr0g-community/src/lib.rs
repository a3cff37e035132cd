pub mod client;
pub mod error;
pub mod mock;
pub mod types;

pub use client::{CommunityClient, HttpCommunityClient};
pub use error::CommunityError;
pub use mock::MockCommunityClient;
pub use types::{Community, CommunityReview, Consensus, PersonaReview, ReviewStatus};
