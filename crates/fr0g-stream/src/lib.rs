pub mod duplex;
pub mod envelope;
pub mod error;

pub use duplex::{StreamClient, StreamHandle};
pub use envelope::{Envelope, PayloadKind};
pub use error::StreamError;
