//! Isolated plugin runner.
//!
//! Every plugin invocation is spawned as its own Tokio task so a panicking
//! or wedged plugin can never take the collection loop down with it. A
//! per-plugin timeout bounds how long a tick will wait for one probe.

use crate::error::ErrorRecord;
use crate::plugin::{Plugin, Snapshot};
use crate::settings::Settings;
use std::sync::Arc;
use std::time::Duration;

/// Outcome of running a single plugin for one tick.
#[derive(Debug, Clone)]
pub enum PluginOutcome {
    Success(Snapshot),
    Failure(ErrorRecord),
}

impl PluginOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, PluginOutcome::Success(_))
    }
}

/// Run `plugin.collect()` then `plugin.validate_state()` on a dedicated
/// task, bounded by `timeout`.
///
/// `prepare()` is not called here: it's a cheap readiness check the loop
/// makes directly before deciding whether a plugin is even part of this
/// tick's batch, not something that needs crash/timeout containment.
pub async fn run_plugin(plugin: Arc<dyn Plugin>, settings: Arc<Settings>, timeout: Duration) -> PluginOutcome {
    let name = plugin.name().to_string();
    let task = tokio::spawn(async move {
        let snapshot = plugin
            .collect(&settings)
            .await
            .map_err(|err| ErrorRecord::new("CollectionError", err.to_string()).with_traceback(format!("{err:?}")))?;

        plugin
            .validate_state(&snapshot)
            .map_err(|err| ErrorRecord::new("SpecViolation", err.to_string()))?;

        Ok(snapshot)
    });

    match tokio::time::timeout(timeout, task).await {
        Ok(Ok(Ok(snapshot))) => PluginOutcome::Success(snapshot),
        Ok(Ok(Err(record))) => PluginOutcome::Failure(record),
        Ok(Err(join_error)) => {
            if join_error.is_panic() {
                PluginOutcome::Failure(ErrorRecord::from_panic(join_error.into_panic().as_ref()))
            } else {
                PluginOutcome::Failure(ErrorRecord::new("Cancelled", format!("plugin `{name}` task was cancelled")))
            }
        }
        Err(_elapsed) => PluginOutcome::Failure(ErrorRecord::timeout(timeout.as_secs())),
    }
}
