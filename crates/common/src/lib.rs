//! Shared types used across all benchlink crates: the closed capability
//! vocabulary and the plugin-facing error taxonomy.

pub mod capability;
pub mod plugin_error;

pub use {
    capability::{Capability, CapabilitySet, UnknownCapability},
    plugin_error::PluginError,
};
