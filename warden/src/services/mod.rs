//! Service wiring.

mod container;

pub use container::{Warden, WardenBuilder};
