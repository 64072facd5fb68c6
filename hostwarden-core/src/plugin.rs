//! Plugin contract: what every probe the agent runs must implement.
//!
//! A plugin is a named probe: cheap `prepare()` readiness check, expensive
//! `collect()` observation, structural `validate_state()`, and a pair of
//! server-side hint methods the agent only ever passes through opaquely
//! (`should_apply_change`/`get_action_for_change`; never invoked by this
//! crate itself — reserved for a future wire revision).

use crate::diff::Change;
use crate::settings::Settings;
use crate::value::{validate_item, FieldType, Value};
use async_trait::async_trait;
use std::collections::BTreeMap;

/// A mapping from string field names to values, matching a plugin's spec.
pub type Item = BTreeMap<String, Value>;

/// A mapping from item key to [`Item`], produced by one plugin invocation.
pub type Snapshot = BTreeMap<String, Item>;

/// `(key_field_name, field_name -> type)`, as declared by a plugin.
pub type PluginSpec = (String, BTreeMap<String, FieldType>);

/// Reason a plugin declined to run this tick. Non-fatal: the plugin is
/// silently excluded from the tick and logged at `info`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrepareFailure(pub String);

impl std::fmt::Display for PrepareFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A named probe observing some facet of the local host.
#[async_trait]
pub trait Plugin: Send + Sync {
    /// Stable snake_case identifier. Never changes across the plugin's
    /// lifetime; used as the key in every wire batch.
    fn name(&self) -> &str;

    /// Declared item shape items must validate against.
    fn spec(&self) -> &PluginSpec;

    /// If false, `updated` changes always carry the full new item rather
    /// than just the fields that changed.
    fn diff_updates(&self) -> bool {
        true
    }

    /// If true, this plugin is only attempted on the slow sub-cadence.
    fn is_slow(&self) -> bool {
        false
    }

    /// Cheap readiness check, run on every tick before collection.
    async fn prepare(&self, settings: &Settings) -> Result<(), PrepareFailure>;

    /// The expensive observation. May fail; failures are captured by the
    /// isolated runner, never propagated raw.
    async fn collect(&self, settings: &Settings) -> anyhow::Result<Snapshot>;

    /// Structural validation of a freshly collected snapshot against
    /// [`Self::spec`]. A spec violation is treated as a collection failure.
    fn validate_state(&self, snapshot: &Snapshot) -> anyhow::Result<()> {
        let (_, field_spec) = self.spec();
        for (key, item) in snapshot {
            let report = validate_item(field_spec, item)
                .map_err(|violation| anyhow::anyhow!("{}: {violation}", self.name()))?;
            for missing in &report.missing_fields {
                tracing::warn!(plugin = self.name(), key, missing, "item missing spec field");
            }
        }
        Ok(())
    }

    /// Opaque server-side hint, never evaluated by this agent — just
    /// attached to outgoing data if a future wire revision needs it.
    fn should_apply_change(&self, _change: &Change) -> bool {
        true
    }

    /// Opaque server-side hint, as above.
    fn get_action_for_change(&self, _change: &Change) -> Option<String> {
        None
    }

    /// Out-of-band events accumulated since the last tick (e.g. by a
    /// background log-following task). Drained non-blockingly; an empty
    /// result means no `EVENTS` payload is emitted this tick.
    fn drain_events(&self) -> Vec<serde_json::Value> {
        Vec::new()
    }
}
