//! Entry-point resolution: manifests name a factory, factories construct
//! plugins.

use std::collections::HashMap;

use crate::contract::Plugin;

type Factory = Box<dyn Fn() -> Box<dyn Plugin> + Send + Sync>;

/// Registry of plugin factories keyed by entry-point string.
///
/// "Entry point resolvable" in manifest validation means: registered
/// here. Bundled plugins register under `bundled:<id>`.
#[derive(Default)]
pub struct FactoryRegistry {
    factories: HashMap<String, Factory>,
}

impl FactoryRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&mut self, entry_point: impl Into<String>, factory: F)
    where
        F: Fn() -> Box<dyn Plugin> + Send + Sync + 'static,
    {
        self.factories.insert(entry_point.into(), Box::new(factory));
    }

    #[must_use]
    pub fn contains(&self, entry_point: &str) -> bool {
        self.factories.contains_key(entry_point)
    }

    /// Construct a fresh plugin for `entry_point`, if registered.
    #[must_use]
    pub fn construct(&self, entry_point: &str) -> Option<Box<dyn Plugin>> {
        self.factories.get(entry_point).map(|f| f())
    }

    /// All registered entry points, sorted.
    #[must_use]
    pub fn entry_points(&self) -> Vec<&str> {
        let mut points: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        points.sort_unstable();
        points
    }
}
