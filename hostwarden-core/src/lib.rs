//! Core engine for the hostwarden monitoring agent: plugin contract and
//! registry, isolated runner, state diff engine, remote client, and backoff
//! driver. The collection loop that ties these together lives in the
//! `hostwarden-agent` binary crate.

pub mod backoff;
pub mod diff;
pub mod error;
pub mod plugin;
pub mod registry;
pub mod remote;
pub mod runner;
pub mod settings;
pub mod value;

pub use diff::{get_state_diff, Change, ChangeKind};
pub use error::{ApiError, ConfigError, ErrorRecord};
pub use plugin::{Item, Plugin, PluginSpec, PrepareFailure, Snapshot};
pub use registry::PluginRegistry;
pub use remote::{RemoteClient, StatusPayload, UploadBatch};
pub use runner::{run_plugin, PluginOutcome};
pub use settings::Settings;
pub use value::{FieldType, Value};
