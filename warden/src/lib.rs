//! warden: a self-healing health supervisor.
//!
//! Probes every monitored component on a fixed tick, restarts components
//! that keep failing, rate-limits operator alerts and sends a daily digest.
//! The [`Warden`] container wires it all together; the binary adds a CLI on
//! top.

pub mod clock;
pub mod config;
pub mod digest;
pub mod domain;
pub mod error;
pub mod logging;
pub mod notification;
pub mod policy;
pub mod probe;
pub mod restart;
pub mod scheduler;
pub mod services;
pub mod state;
pub mod utils;

#[doc(hidden)]
pub mod testing;

pub use error::{Error, Result};
pub use services::{Warden, WardenBuilder};
