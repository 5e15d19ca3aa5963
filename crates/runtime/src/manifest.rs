//! Plugin manifests: declarative identity and permission ceiling, fixed
//! at load time.

use std::{collections::HashMap, path::{Path, PathBuf}};

use {
    benchlink_common::{CapabilitySet, capability::parse_capability_list},
    serde::{Deserialize, Serialize},
};

use crate::error::{Error, Result};

/// A plugin's manifest. Immutable after load.
///
/// Field names follow the wire/manifest convention of the web
/// application (`entryPoint`, `platformPaths`, `defaultConfig`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginManifest {
    pub id: String,
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub description: String,
    /// Which registered factory constructs the plugin.
    pub entry_point: String,
    /// Declared permission ceiling; must parse into the closed vocabulary.
    pub permissions: Vec<String>,
    /// Candidate install paths per platform (`linux`, `macos`, `windows`).
    #[serde(default)]
    pub platform_paths: HashMap<String, Vec<PathBuf>>,
    /// Defaults merged under persisted per-plugin overrides.
    #[serde(default = "empty_object")]
    pub default_config: serde_json::Value,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn empty_object() -> serde_json::Value {
    serde_json::Value::Object(serde_json::Map::new())
}

fn default_true() -> bool {
    true
}

impl PluginManifest {
    /// Validate required fields and parse the permission ceiling.
    ///
    /// A permission string outside the closed vocabulary is fatal here,
    /// before the plugin is ever constructed.
    pub fn validate(&self) -> Result<CapabilitySet> {
        for (field, value) in [
            ("id", &self.id),
            ("name", &self.name),
            ("version", &self.version),
            ("entryPoint", &self.entry_point),
        ] {
            if value.trim().is_empty() {
                return Err(Error::InvalidManifest {
                    plugin_id: self.id.clone(),
                    reason: format!("required field `{field}` is empty"),
                });
            }
        }

        parse_capability_list(&self.permissions).map_err(|source| Error::UnknownCapability {
            plugin_id: self.id.clone(),
            source,
        })
    }

    /// Load a manifest file (TOML or JSON by extension).
    pub fn load(path: &Path) -> Result<Self> {
        let plugin_id = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let raw = std::fs::read_to_string(path)?;

        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("toml");
        let manifest: Self = match ext {
            "toml" => toml::from_str(&raw).map_err(|e| Error::InvalidManifest {
                plugin_id: plugin_id.clone(),
                reason: e.to_string(),
            })?,
            "json" => serde_json::from_str(&raw).map_err(|e| Error::InvalidManifest {
                plugin_id: plugin_id.clone(),
                reason: e.to_string(),
            })?,
            other => {
                return Err(Error::InvalidManifest {
                    plugin_id,
                    reason: format!("unsupported manifest format: .{other}"),
                });
            },
        };
        Ok(manifest)
    }

    /// Discover `*.toml` / `*.json` manifests in a directory. Missing
    /// directory means no external plugins, not an error.
    pub fn discover(dir: &Path) -> Result<Vec<Self>> {
        let mut manifests = Vec::new();
        if !dir.is_dir() {
            return Ok(manifests);
        }
        let mut entries: Vec<PathBuf> = std::fs::read_dir(dir)?
            .filter_map(|e| e.ok().map(|e| e.path()))
            .filter(|p| {
                matches!(
                    p.extension().and_then(|e| e.to_str()),
                    Some("toml" | "json")
                )
            })
            .collect();
        entries.sort();
        for path in entries {
            manifests.push(Self::load(&path)?);
        }
        Ok(manifests)
    }
}
