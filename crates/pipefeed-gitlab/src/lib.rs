//! GitLab gateway for pipefeed
//!
//! Implements [`pipefeed_core::Gateway`] for one GitLab project over the v4
//! REST API, authenticating with a `PRIVATE-TOKEN` header.

mod client;
mod config;
mod wire;

pub use client::GitLabGateway;
pub use config::GitLabConfig;
