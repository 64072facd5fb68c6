//! Plugin registry: a single, process-wide, immutable set of active plugins.
//!
//! Built once at startup from an explicit list rather than discovered
//! through global mutable state populated as a side effect of declaring
//! plugin types.

use crate::plugin::Plugin;
use std::collections::HashMap;
use std::sync::Arc;

/// Immutable, process-wide registry of active plugins.
pub struct PluginRegistry {
    plugins: Vec<Arc<dyn Plugin>>,
    by_name: HashMap<String, usize>,
}

impl PluginRegistry {
    /// Build a registry from an explicit list, in registration order.
    ///
    /// # Panics
    /// Panics on duplicate plugin names — that's a programmer error in how
    /// the registry was assembled, not a runtime condition to recover from.
    pub fn new(plugins: Vec<Arc<dyn Plugin>>) -> Self {
        let mut by_name = HashMap::with_capacity(plugins.len());
        for (index, plugin) in plugins.iter().enumerate() {
            if by_name.insert(plugin.name().to_string(), index).is_some() {
                panic!("duplicate plugin name registered: {}", plugin.name());
            }
        }
        PluginRegistry { plugins, by_name }
    }

    /// All registered plugins, in registration order.
    pub fn all(&self) -> impl Iterator<Item = &Arc<dyn Plugin>> {
        self.plugins.iter()
    }

    pub fn by_name(&self, name: &str) -> Option<&Arc<dyn Plugin>> {
        self.by_name.get(name).map(|&index| &self.plugins[index])
    }

    /// Plugins eligible by cadence this tick: fast plugins always, slow
    /// plugins only when `include_slow` is set. This is the cadence filter
    /// only — the caller still has to `prepare()` each of these before
    /// deciding whether it's actually part of the tick's batch.
    pub fn active(&self, include_slow: bool) -> impl Iterator<Item = &Arc<dyn Plugin>> {
        self.plugins
            .iter()
            .filter(move |plugin| include_slow || !plugin.is_slow())
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }
}
