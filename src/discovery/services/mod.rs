//! Application services for probing servers and running check cycles.

mod manager;
mod probe;

pub use manager::{CheckOptions, ConnectionManager};
pub use probe::{CapabilityProbe, ProbeError};
