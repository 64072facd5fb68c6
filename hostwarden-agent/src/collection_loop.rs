//! Collection loop: wires the plugin registry, isolated runner, diff engine,
//! remote client, and backoff driver together on a fixed cadence, with a
//! slow-plugin sub-cadence and signal-driven shutdown.

use arc_swap::ArcSwap;
use hostwarden_core::{
    get_state_diff, run_plugin, Plugin, PluginOutcome, PluginRegistry, RemoteClient, Settings, Snapshot, StatusPayload,
    UploadBatch,
};
use std::collections::HashMap;
use std::sync::Arc;

/// What the loop remembers about a plugin's last outcome, driving whether
/// the next successful collection is tagged `SYNC` or `DIFF`: a collection
/// that follows a failure is always a full `SYNC`, never a `DIFF` against
/// stale state.
enum PreviousOutcome {
    Synced(Snapshot),
    Failed,
}

pub struct CollectionLoop {
    registry: PluginRegistry,
    remote: RemoteClient,
    settings: ArcSwap<Settings>,
    previous: HashMap<String, PreviousOutcome>,
    tick_count: u64,
}

impl CollectionLoop {
    pub fn new(registry: PluginRegistry, remote: RemoteClient, settings: Settings) -> Self {
        CollectionLoop {
            registry,
            remote,
            settings: ArcSwap::from_pointee(settings),
            previous: HashMap::new(),
            tick_count: 0,
        }
    }

    fn settings(&self) -> Arc<Settings> {
        self.settings.load_full()
    }

    fn apply_patch(&self, patch: Option<HashMap<String, String>>) {
        let Some(patch) = patch else { return };
        if patch.is_empty() {
            return;
        }
        let mut next = (*self.settings()).clone();
        let changed = next.apply_patch(&patch);
        if !changed.is_empty() {
            tracing::info!(?changed, "applied settings patch from server");
            self.settings.store(Arc::new(next));
        }
    }

    fn server_id(&self) -> String {
        self.settings()
            .server_id
            .clone()
            .expect("server_id is validated as present at config load")
    }

    /// Enumerate plugins, prepare and collect an initial snapshot from each,
    /// and push an initial sync batch containing only the plugins that
    /// returned successfully.
    ///
    /// Waits for the collector to answer a ping before doing anything else —
    /// `server_id` itself comes from local config, not from a registration
    /// call made here.
    pub async fn init(&mut self) -> anyhow::Result<()> {
        let server_id = self.server_id();
        let settings = self.settings();

        hostwarden_core::backoff::with_backoff(settings.max_backoff(), || self.remote.ping(&server_id)).await;

        let mut sync_batch: HashMap<String, Snapshot> = HashMap::new();

        for plugin in self.registry.active(true) {
            if let Err(decline) = plugin.prepare(&settings).await {
                tracing::info!(plugin = plugin.name(), reason = %decline.0, "plugin declined to prepare, excluded from initial sync");
                continue;
            }

            let outcome = run_plugin(plugin.clone(), settings.clone(), settings.plugin_timeout()).await;
            match outcome {
                PluginOutcome::Success(snapshot) => {
                    sync_batch.insert(plugin.name().to_string(), snapshot.clone());
                    self.previous.insert(plugin.name().to_string(), PreviousOutcome::Synced(snapshot));
                }
                PluginOutcome::Failure(record) => {
                    tracing::warn!(plugin = plugin.name(), %record, "initial collection failed");
                    self.previous.insert(plugin.name().to_string(), PreviousOutcome::Failed);
                }
            }
        }

        let patch =
            hostwarden_core::backoff::with_backoff(settings.max_backoff(), || self.remote.sync(&server_id, &sync_batch)).await;
        self.apply_patch(patch);

        Ok(())
    }

    /// One steady-state tick: select the active plugin set, re-`prepare()`
    /// each, run what's still ready, build and upload the batch, apply any
    /// returned settings patch.
    ///
    /// A plugin that declines to prepare is excluded from the tick entirely:
    /// no payload is sent for it and its last known state is left alone, so
    /// a later successful collection diffs against what it actually saw
    /// last rather than being forced into a spurious full sync.
    pub async fn tick(&mut self) -> anyhow::Result<()> {
        let settings = self.settings();
        let server_id = self.server_id();
        let include_slow = settings.slow_tick_every > 0 && self.tick_count % settings.slow_tick_every as u64 == 0;
        self.tick_count += 1;

        let mut batch: UploadBatch = HashMap::new();

        let active: Vec<Arc<dyn Plugin>> = self.registry.active(include_slow).cloned().collect();
        for plugin in active {
            if let Err(decline) = plugin.prepare(&settings).await {
                tracing::info!(plugin = plugin.name(), reason = %decline.0, "plugin declined to prepare, excluded from this tick");
                continue;
            }

            let outcome = run_plugin(plugin.clone(), settings.clone(), settings.plugin_timeout()).await;
            let name = plugin.name().to_string();

            let payload = match outcome {
                PluginOutcome::Success(snapshot) => {
                    let payload = match self.previous.get(&name) {
                        Some(PreviousOutcome::Synced(previous_snapshot)) => {
                            let changes = get_state_diff(plugin.as_ref(), &snapshot, previous_snapshot);
                            if changes.is_empty() {
                                None
                            } else {
                                Some(StatusPayload::Diff(changes))
                            }
                        }
                        Some(PreviousOutcome::Failed) | None => Some(StatusPayload::Sync(snapshot.clone())),
                    };
                    self.previous.insert(name.clone(), PreviousOutcome::Synced(snapshot));
                    payload
                }
                PluginOutcome::Failure(record) => {
                    self.previous.insert(name.clone(), PreviousOutcome::Failed);
                    Some(StatusPayload::Error(record))
                }
            };

            if let Some(payload) = payload {
                batch.entry(name.clone()).or_default().push(payload);
            }

            let events = plugin.drain_events();
            if !events.is_empty() {
                batch.entry(name).or_default().push(StatusPayload::Events(events));
            }
        }

        if batch.is_empty() {
            return Ok(());
        }

        let patch =
            hostwarden_core::backoff::with_backoff(settings.max_backoff(), || self.remote.upload_changes(&server_id, &batch)).await;
        self.apply_patch(patch);

        Ok(())
    }

    /// Best-effort notice that this agent is shutting down, sent once with
    /// no retry.
    pub async fn notify_shutdown(&self) {
        let server_id = self.server_id();
        if let Err(err) = self.remote.shutdown_notice(&server_id).await {
            err.log();
        }
    }

    pub fn tick_interval(&self) -> std::time::Duration {
        self.settings().tick_interval()
    }
}

/// Wait for a termination signal on Unix platforms; on other platforms this
/// future never resolves, since this agent only targets Unix hosts.
#[cfg(unix)]
pub async fn wait_for_shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut term = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
    let mut int = signal(SignalKind::interrupt()).expect("failed to install SIGINT handler");

    tokio::select! {
        _ = term.recv() => tracing::info!("received SIGTERM"),
        _ = int.recv() => tracing::info!("received SIGINT"),
    }
}

#[cfg(not(unix))]
pub async fn wait_for_shutdown_signal() {
    std::future::pending::<()>().await;
}
