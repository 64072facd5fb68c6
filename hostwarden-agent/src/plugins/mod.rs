//! Demo plugins shipped with the agent binary, and the registry they're
//! wired into. A real deployment would add site-specific plugins here
//! alongside these; the registry itself has no knowledge of which plugins
//! exist beyond what's handed to [`build_registry`].

mod meta;
mod uptime;

use hostwarden_core::{Plugin, PluginRegistry};
use std::sync::Arc;

pub fn build_registry() -> PluginRegistry {
    let plugins: Vec<Arc<dyn Plugin>> = vec![Arc::new(meta::MetaPlugin::new()), Arc::new(uptime::UptimePlugin::new())];
    PluginRegistry::new(plugins)
}
