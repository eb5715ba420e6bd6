//! Container execution layer
//!
//! This module contains the engine seam registry operations run through,
//! plus helpers for rendering the commands they run.

#[cfg(test)]
pub(crate) mod fake;
mod shell;
mod traits;

pub use shell::{ShellArg, ShellScript};
pub use traits::{CacheMount, ContainerEngine, ContainerSpec, ExecOutput, FileMount, HealthStatus};
