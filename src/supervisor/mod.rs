// src/supervisor/mod.rs

//! Long-lived process supervision.
//!
//! - [`registry`] tracks live background/daemon processes plus the
//!   process-wide "exiting" flag.
//! - [`timer`] runs a command on every tick.
//! - [`daemon`] keeps a command running, restarting it under a retry policy.
//! - [`shutdown`] drains the registry when a termination signal arrives.

pub mod daemon;
pub mod registry;
pub mod shutdown;
pub mod timer;

pub use daemon::{run_daemon, DaemonExit, RetryTracker};
pub use registry::{ProcessRegistry, RunningProcess};
pub use shutdown::{DrainReport, ShutdownCoordinator};
pub use timer::run_timer;
