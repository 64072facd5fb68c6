//! `meta` plugin: hostname and agent version. Cheap, always-on, the
//! canonical first-run collection.

use async_trait::async_trait;
use hostwarden_core::{FieldType, Item, Plugin, PluginSpec, PrepareFailure, Settings, Snapshot, Value};
use std::collections::BTreeMap;

pub struct MetaPlugin {
    spec: PluginSpec,
}

impl MetaPlugin {
    pub fn new() -> Self {
        let mut fields = BTreeMap::new();
        fields.insert("value".to_string(), FieldType::Text);
        MetaPlugin {
            spec: ("key".to_string(), fields),
        }
    }
}

impl Default for MetaPlugin {
    fn default() -> Self {
        MetaPlugin::new()
    }
}

fn read_hostname() -> String {
    std::fs::read_to_string("/proc/sys/kernel/hostname")
        .map(|s| s.trim().to_string())
        .or_else(|_| std::env::var("HOSTNAME"))
        .unwrap_or_else(|_| "unknown".to_string())
}

#[async_trait]
impl Plugin for MetaPlugin {
    fn name(&self) -> &str {
        "meta"
    }

    fn spec(&self) -> &PluginSpec {
        &self.spec
    }

    async fn prepare(&self, _settings: &Settings) -> Result<(), PrepareFailure> {
        Ok(())
    }

    async fn collect(&self, _settings: &Settings) -> anyhow::Result<Snapshot> {
        let mut hostname_item = Item::new();
        hostname_item.insert("value".to_string(), Value::Text(read_hostname()));

        let mut version_item = Item::new();
        version_item.insert("value".to_string(), Value::Text(env!("CARGO_PKG_VERSION").to_string()));

        let mut snapshot = Snapshot::new();
        snapshot.insert("hostname".to_string(), hostname_item);
        snapshot.insert("agent_version".to_string(), version_item);
        Ok(snapshot)
    }
}
