//! Agent Flow Client
//!
//! Talks to the agent server: account endpoints, authenticated requests with
//! transparent credential renewal, and server-push agent streams.

pub mod auth;
pub mod client;
pub mod config;
pub mod error;
pub mod executor;
pub mod models;
pub mod stream;
pub mod transport;

pub use client::AgentFlowClient;
pub use config::ClientConfig;
pub use error::ClientError;
