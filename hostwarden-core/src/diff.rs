//! State diff engine: computes the minimal structural delta between two
//! snapshots of one plugin's collected state.

use crate::plugin::{Plugin, Snapshot};
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeKind {
    Added,
    Updated,
    Deleted,
}

/// `(old, new)` for one field that differs between two items. `None` means
/// the field was absent on that side: an `added` change has `old == None`
/// for every field, a `deleted` change has `new == None`.
pub type FieldDiff = BTreeMap<String, (Option<Value>, Option<Value>)>;

/// A single structural delta between two snapshots for one item key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Change {
    pub plugin: String,
    pub kind: ChangeKind,
    pub key: String,
    pub field_diff: FieldDiff,
}

impl Change {
    pub fn new(plugin: impl Into<String>, kind: ChangeKind, key: impl Into<String>, field_diff: FieldDiff) -> Self {
        Change {
            plugin: plugin.into(),
            kind,
            key: key.into(),
            field_diff,
        }
    }

    /// Accepts a flat `field -> value` map for `Added`/`Deleted` changes —
    /// as an older or external producer might still emit — and rewrites it
    /// into the `(old, new)` tuple form this engine otherwise always
    /// produces directly.
    pub fn from_legacy_fields(
        plugin: impl Into<String>,
        kind: ChangeKind,
        key: impl Into<String>,
        fields: BTreeMap<String, Value>,
    ) -> Self {
        let field_diff = match kind {
            ChangeKind::Added => fields
                .into_iter()
                .map(|(field, value)| (field, (None, Some(value))))
                .collect(),
            ChangeKind::Deleted => fields
                .into_iter()
                .map(|(field, value)| (field, (Some(value), None)))
                .collect(),
            ChangeKind::Updated => {
                tracing::warn!("from_legacy_fields called with Updated; fields dropped as old values");
                fields
                    .into_iter()
                    .map(|(field, value)| (field, (None, Some(value))))
                    .collect()
            }
        };
        Change::new(plugin, kind, key, field_diff)
    }
}

/// Diff two snapshots for one plugin: keys gone since `previous_snapshot`
/// are `Deleted`, keys new in `new_snapshot` are `Added`, and keys present
/// in both get a field-level `Updated` diff (or nothing, if unchanged).
pub fn get_state_diff(plugin: &dyn Plugin, new_snapshot: &Snapshot, previous_snapshot: &Snapshot) -> Vec<Change> {
    let mut changes = Vec::new();

    // 1. Keys present before but gone now: deleted, every old field -> (old, null).
    for (key, previous_item) in previous_snapshot {
        if !new_snapshot.contains_key(key) {
            let field_diff = previous_item
                .iter()
                .map(|(field, value)| (field.clone(), (Some(value.clone()), None)))
                .collect();
            changes.push(Change::new(plugin.name(), ChangeKind::Deleted, key.clone(), field_diff));
        }
    }

    // 2 & 3. Keys present now.
    for (key, item) in new_snapshot {
        match previous_snapshot.get(key) {
            None => {
                let field_diff = item
                    .iter()
                    .map(|(field, value)| (field.clone(), (None, Some(value.clone()))))
                    .collect();
                changes.push(Change::new(plugin.name(), ChangeKind::Added, key.clone(), field_diff));
            }
            Some(previous_item) => {
                let all_keys = item.keys().chain(previous_item.keys()).cloned().collect::<std::collections::BTreeSet<_>>();

                let changed_fields: FieldDiff = all_keys
                    .into_iter()
                    .filter_map(|field| {
                        let old = previous_item.get(&field);
                        let new = item.get(&field);
                        if old == new {
                            None
                        } else {
                            Some((field, (old.cloned(), new.cloned())))
                        }
                    })
                    .collect();

                if changed_fields.is_empty() {
                    continue;
                }

                let field_diff = if plugin.diff_updates() {
                    changed_fields
                } else {
                    // Plugin opts out of diffs: ship the full new item,
                    // still paired with whatever the old value was.
                    item.iter()
                        .map(|(field, value)| (field.clone(), (previous_item.get(field).cloned(), Some(value.clone()))))
                        .collect()
                };

                changes.push(Change::new(plugin.name(), ChangeKind::Updated, key.clone(), field_diff));
            }
        }
    }

    changes
}

/// Apply a list of changes to a snapshot, reconstructing the new state.
/// Used by the diff round-trip property test; not part of the production
/// data path (the loop always diffs against its own collected snapshot).
pub fn apply_changes(base: &Snapshot, changes: &[Change]) -> Snapshot {
    let mut result = base.clone();

    for change in changes {
        match change.kind {
            ChangeKind::Deleted => {
                result.remove(&change.key);
            }
            ChangeKind::Added | ChangeKind::Updated => {
                let item = result.entry(change.key.clone()).or_default();
                for (field, (_, new)) in &change.field_diff {
                    match new {
                        Some(value) => {
                            item.insert(field.clone(), value.clone());
                        }
                        None => {
                            item.remove(field);
                        }
                    }
                }
            }
        }
    }

    result
}
