//! MCP server discovery: connect to configured servers, list their tools and
//! merge them into one namespace.
//!
//! The module follows hexagonal architecture:
//!
//! - Domain types in [`domain`]
//! - Port contracts in [`ports`]
//! - Transport adapters in [`adapters`]
//! - The probe and the connection manager in [`services`]

pub mod adapters;
pub mod domain;
pub mod ports;
pub mod services;
