pub mod chat;
pub mod delivery;
pub mod error;
pub mod ratelimit;
pub mod retry;
pub mod sms;

pub use chat::ChatBridgeClient;
pub use delivery::{DeliveryState, DeliveryTracker, MessageStatus};
pub use error::ClientError;
pub use ratelimit::{SlidingWindowLimiter, TokenBucket};
pub use retry::RetryPolicy;
pub use sms::SmsClient;
