//! Retry and backoff policy for chunk transfers.
//!
//! Chunk workers consult the policy after each failed attempt; the policy
//! alone decides whether another attempt happens and how long to wait.

mod policy;

pub use policy::{RetryDecision, RetryPolicy};
