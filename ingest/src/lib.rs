pub mod client;
pub mod concurrency;
pub mod error;
pub mod fetcher;
pub mod filter;
pub mod grouping;
mod macros;
pub mod metrics;
pub mod mutation;
pub mod ordering;
pub mod pipeline;
pub mod retry;
pub mod session;
pub mod stats;
pub mod store;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
pub mod types;
pub mod workers;
