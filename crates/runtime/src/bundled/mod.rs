//! Plugins that ship with the companion binary.
//!
//! Concrete third-party integrations live outside this repository; the
//! bundled plugins cover the two local capability domains every workshop
//! install needs and double as reference implementations of the contract.

pub mod app_launcher;
pub mod container_tool;

use crate::{manifest::PluginManifest, registry::FactoryRegistry};

/// Register every bundled factory.
pub fn register_all(registry: &mut FactoryRegistry) {
    registry.register(container_tool::ENTRY_POINT, || {
        Box::new(container_tool::ContainerToolPlugin::new())
    });
    registry.register(app_launcher::ENTRY_POINT, || {
        Box::new(app_launcher::AppLauncherPlugin::new())
    });
}

/// Manifests for the bundled plugins, in load order.
#[must_use]
pub fn manifests() -> Vec<PluginManifest> {
    vec![container_tool::manifest(), app_launcher::manifest()]
}
