pub mod client;
pub mod discovery;
pub mod error;
pub mod types;

pub use client::{EndpointSource, RegistryClient};
pub use discovery::DiscoveryCache;
pub use error::RegistryError;
pub use types::{HealthCheck, ServiceInfo};
