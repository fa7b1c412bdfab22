//! Agentcycle: autonomous agent cycle scheduler with a self-improvement
//! pipeline.
//!
//! Agents tick on role-based intervals through a fixed rotation of cycle
//! types. Every fourth cycle analyzes a remote repository and opens one
//! branch per enhancement proposal.

pub mod analysis;
pub mod clock;
pub mod config;
pub mod credentials;
pub mod error;
pub mod executor;
pub mod github;
pub mod pipeline;
pub mod registry;
pub mod reports;
pub mod scheduler;
pub mod types;
