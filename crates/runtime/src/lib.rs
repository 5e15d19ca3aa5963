//! The plugin runtime: manifest loading, the lifecycle state machine, the
//! contract every plugin implements, and the manager that owns instances
//! and routes control-plane messages to them.

pub mod bundled;
pub mod contract;
pub mod error;
pub mod lifecycle;
pub mod manager;
pub mod manifest;
pub mod registry;

pub use {
    contract::{Plugin, PluginContext},
    error::{Error, Result},
    lifecycle::LifecyclePhase,
    manager::{PluginManager, PluginStatusReport},
    manifest::PluginManifest,
    registry::FactoryRegistry,
};
