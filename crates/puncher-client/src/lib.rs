pub mod client;
pub mod types;

pub use client::{connect, drive, ClientError, Connection};
pub use types::{ClientConfig, RetryPolicy};
