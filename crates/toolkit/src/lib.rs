//! Shared helpers for plugins that wrap external tools: locating the
//! installation, invoking the command line with bounds, launching
//! detached applications, and talking to a plugin-owned sidecar process.
//!
//! These are composable collaborators injected into plugins, not a base
//! class; a plugin takes the pieces it needs.

pub mod launch;
pub mod locator;
pub mod runner;
pub mod sidecar;

pub use {
    launch::{LaunchedApp, launch_detached, open_detached},
    locator::ToolLocator,
    runner::{RunOpts, RunOutput, json_lines, run, run_ok},
    sidecar::{SidecarChannel, SidecarProcess, SidecarSpec},
};
