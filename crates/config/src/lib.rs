//! Configuration: typed schema, file discovery, and the per-plugin
//! configuration store.

pub mod loader;
pub mod plugin_store;
pub mod schema;

pub use {
    loader::{config_dir, data_dir, discover_and_load, load_config, save_config},
    plugin_store::PluginConfigStore,
    schema::{BenchlinkConfig, BridgeConfig, PermissionsConfig, PluginEntry},
};
