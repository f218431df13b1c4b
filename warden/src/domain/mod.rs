//! Core data model: component state, probe results and status snapshots.

pub mod component;
pub mod probe_result;
pub mod status;

pub use component::{ComponentState, Lifecycle};
pub use probe_result::ProbeResult;
pub use status::{OverallStatus, StatusSnapshot};
