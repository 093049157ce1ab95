//! kubecheck-cluster — everything that talks to the cluster CLI.
//!
//! The [`CommandRunner`] trait is the only way probes touch the cluster;
//! [`ScratchManager`] and [`DiagnosticsCollector`] are built on it.

pub mod diagnostics;
#[cfg(any(test, feature = "test-util"))]
pub mod fake;
pub mod runner;
pub mod scratch;

pub use diagnostics::DiagnosticsCollector;
pub use runner::{CliRunner, CommandError, CommandFuture, CommandOutput, CommandRunner};
pub use scratch::{ScratchEntry, ScratchManager, ScratchResource};
