//! Toolscout: connection manager for Model Context Protocol servers.
//!
//! Given a batch of server configurations, toolscout connects to every
//! server concurrently (child processes over stdio, or HTTP event streams),
//! asks each one for its tools, merges the results into one namespace and
//! closes every connection it opened. One failing server never hides the
//! results of the others.
//!
//! # Architecture
//!
//! Toolscout follows hexagonal architecture principles:
//!
//! - **Domain**: server specifications, tools and per-server outcomes
//! - **Ports**: the transport factory and session traits
//! - **Adapters**: stdio and SSE transports, plus a scripted test transport
//! - **Services**: the capability probe and the connection manager
//!
//! # Modules
//!
//! - [`discovery`]: the check cycle and everything it is built from
//! - [`http`]: the `POST /api/mcp/check` boundary
//! - [`config`]: environment-driven service configuration

pub mod config;
pub mod discovery;
pub mod http;
