//! Concurrency primitives for coordinating ingestion workers.
//!
//! One fetch worker runs per scope; all workers share a single shutdown
//! channel so that cancellation reaches every suspension point without a
//! shared mutable flag.

pub mod shutdown;
