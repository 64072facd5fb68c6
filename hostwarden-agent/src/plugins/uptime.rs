//! `uptime` plugin: seconds since boot, read from `/proc/uptime`. Marked
//! `diff_updates = false` deliberately, as a worked example of a plugin that
//! always wants the full item on change rather than a field-level diff —
//! the value itself being a diff isn't interesting to a server consumer.

use async_trait::async_trait;
use hostwarden_core::{FieldType, Item, Plugin, PluginSpec, PrepareFailure, Settings, Snapshot, Value};
use std::collections::BTreeMap;

pub struct UptimePlugin {
    spec: PluginSpec,
}

impl UptimePlugin {
    pub fn new() -> Self {
        let mut fields = BTreeMap::new();
        fields.insert("seconds".to_string(), FieldType::Int);
        UptimePlugin {
            spec: ("key".to_string(), fields),
        }
    }
}

impl Default for UptimePlugin {
    fn default() -> Self {
        UptimePlugin::new()
    }
}

fn read_uptime_seconds() -> anyhow::Result<i64> {
    let raw = std::fs::read_to_string("/proc/uptime")?;
    let first_field = raw
        .split_whitespace()
        .next()
        .ok_or_else(|| anyhow::anyhow!("/proc/uptime was empty"))?;
    let seconds: f64 = first_field.parse()?;
    Ok(seconds as i64)
}

#[async_trait]
impl Plugin for UptimePlugin {
    fn name(&self) -> &str {
        "uptime"
    }

    fn spec(&self) -> &PluginSpec {
        &self.spec
    }

    fn diff_updates(&self) -> bool {
        false
    }

    async fn prepare(&self, _settings: &Settings) -> Result<(), PrepareFailure> {
        if !std::path::Path::new("/proc/uptime").exists() {
            return Err(PrepareFailure("/proc/uptime not available on this platform".to_string()));
        }
        Ok(())
    }

    async fn collect(&self, _settings: &Settings) -> anyhow::Result<Snapshot> {
        let seconds = read_uptime_seconds()?;
        let mut item = Item::new();
        item.insert("seconds".to_string(), Value::Int(seconds));
        let mut snapshot = Snapshot::new();
        snapshot.insert("system".to_string(), item);
        Ok(snapshot)
    }
}
