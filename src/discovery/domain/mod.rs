//! Domain model for server discovery.
//!
//! The discovery domain models server specifications, the tools servers
//! declare, per-server outcomes and their aggregation into one namespace.
//! Transport and runtime concerns remain outside this boundary.

pub mod config;

mod aggregate;
mod error;
mod ids;
mod outcome;
mod spec;
mod tool;

pub use aggregate::{AggregatedResult, FlattenedTools, ToolCollision, aggregate};
pub use config::{InputFormatError, ServerConfig, SpecBatch};
pub use error::{InvalidSpecError, InvalidToolError};
pub use ids::{CheckCycleId, ServerName};
pub use outcome::{FailurePhase, ServerOutcome};
pub use spec::{EventStreamSpec, ServerSpec, SubprocessSpec, TransportKind, TransportSpec};
pub use tool::{ToolDescriptor, ToolSet};
