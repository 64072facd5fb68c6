//! End-to-end scenario tests against a mocked collector API, one per
//! literal fixture in the testable-properties section of the design this
//! loop implements.

use async_trait::async_trait;
use hostwarden_agent::collection_loop::CollectionLoop;
use hostwarden_core::{FieldType, Item, Plugin, PluginSpec, PrepareFailure, RemoteClient, Settings, Snapshot, Value};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const SERVER_ID: &str = "srv-test";

/// Returns a fixed hostname item every tick, for the first-run and
/// steady-state fixtures.
struct FixedMetaPlugin {
    spec: PluginSpec,
    hostname: String,
}

#[async_trait]
impl Plugin for FixedMetaPlugin {
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
        let mut item = Item::new();
        item.insert("value".to_string(), Value::Text(self.hostname.clone()));
        let mut snapshot = Snapshot::new();
        snapshot.insert("hostname".to_string(), item);
        Ok(snapshot)
    }
}

fn meta_spec() -> PluginSpec {
    let mut fields = BTreeMap::new();
    fields.insert("value".to_string(), FieldType::Text);
    ("key".to_string(), fields)
}

fn settings_for(server: &MockServer) -> Settings {
    let mut settings = Settings::default();
    settings.api_url = server.uri();
    settings.api_key = Some("test-key".to_string());
    settings.server_id = Some(SERVER_ID.to_string());
    settings
}

fn remote_for(settings: &Settings) -> RemoteClient {
    RemoteClient::new(settings.api_url.clone(), settings.api_key.clone(), "test-host", "0.1.0")
}

async fn mount_happy_path(server: &MockServer, collect_interval_patch: Option<&str>) {
    Mock::given(method("GET"))
        .and(path(format!("/server/{SERVER_ID}/ping")))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "ping": "pong" })))
        .mount(server)
        .await;

    let sync_body = match collect_interval_patch {
        Some(value) => serde_json::json!({ "settings": { "collect_interval_s": value } }),
        None => serde_json::json!({}),
    };
    Mock::given(method("POST"))
        .and(path(format!("/server/{SERVER_ID}/sync")))
        .respond_with(ResponseTemplate::new(200).set_body_json(sync_body))
        .mount(server)
        .await;

    Mock::given(method("POST"))
        .and(path(format!("/server/{SERVER_ID}/state")))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
        .mount(server)
        .await;
}

#[tokio::test]
async fn first_run_sync_applies_server_settings() {
    let server = MockServer::start().await;
    mount_happy_path(&server, Some("30")).await;

    let registry = hostwarden_core::PluginRegistry::new(vec![Arc::new(FixedMetaPlugin {
        spec: meta_spec(),
        hostname: "h1".to_string(),
    })]);
    let settings = settings_for(&server);
    let remote = remote_for(&settings);

    let mut loop_ = CollectionLoop::new(registry, remote, settings);
    loop_.init().await.expect("init should succeed against the mock server");

    assert_eq!(loop_.tick_interval(), std::time::Duration::from_secs(30));

    let requests = server.received_requests().await.unwrap();
    let sync_request = requests
        .iter()
        .find(|r| r.url.path() == format!("/server/{SERVER_ID}/sync"))
        .expect("one sync call during init");
    let body: serde_json::Value = sync_request.body_json().unwrap();
    assert_eq!(body["hostname"], "test-host");
    assert!(body["states"].get("meta").is_some());
}

#[tokio::test]
async fn steady_state_diff_reports_only_changed_field() {
    let server = MockServer::start().await;
    mount_happy_path(&server, None).await;

    let counter = Arc::new(AtomicUsize::new(0));

    struct TogglingPlugin {
        spec: PluginSpec,
        counter: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Plugin for TogglingPlugin {
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
            let n = self.counter.fetch_add(1, Ordering::SeqCst);
            let hostname = if n == 0 { "h1" } else { "h2" };
            let mut item = Item::new();
            item.insert("value".to_string(), Value::Text(hostname.to_string()));
            let mut snapshot = Snapshot::new();
            snapshot.insert("hostname".to_string(), item);
            Ok(snapshot)
        }
    }

    let registry = hostwarden_core::PluginRegistry::new(vec![Arc::new(TogglingPlugin {
        spec: meta_spec(),
        counter: counter.clone(),
    })]);
    let settings = settings_for(&server);
    let remote = remote_for(&settings);

    let mut loop_ = CollectionLoop::new(registry, remote, settings);
    loop_.init().await.unwrap();
    loop_.tick().await.unwrap();

    // Captured by the /state mock's request log: the second call's batch
    // should carry a DIFF, not a SYNC, since the plugin never failed.
    let requests = server.received_requests().await.unwrap();
    let state_request = requests
        .iter()
        .filter(|r| r.url.path() == format!("/server/{SERVER_ID}/state"))
        .last()
        .expect("one state call after the second tick");
    let body: serde_json::Value = state_request.body_json().unwrap();
    let meta_entries = body.get("meta").unwrap().as_array().unwrap();
    assert_eq!(meta_entries[0][0], "DIFF");
}

#[tokio::test]
async fn error_then_success_triggers_sync_not_diff() {
    let server = MockServer::start().await;
    mount_happy_path(&server, None).await;

    let counter = Arc::new(AtomicUsize::new(0));

    struct FlakyPlugin {
        spec: PluginSpec,
        counter: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Plugin for FlakyPlugin {
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
            let n = self.counter.fetch_add(1, Ordering::SeqCst);
            if n == 0 {
                anyhow::bail!("transient collection error");
            }
            let mut item = Item::new();
            item.insert("value".to_string(), Value::Text("h1".to_string()));
            let mut snapshot = Snapshot::new();
            snapshot.insert("hostname".to_string(), item);
            Ok(snapshot)
        }
    }

    let registry = hostwarden_core::PluginRegistry::new(vec![Arc::new(FlakyPlugin {
        spec: meta_spec(),
        counter: counter.clone(),
    })]);
    let settings = settings_for(&server);
    let remote = remote_for(&settings);

    let mut loop_ = CollectionLoop::new(registry, remote, settings);
    loop_.init().await.unwrap();
    // init's own collection attempt consumes counter value 0 (failure);
    // the first tick() call consumes value 1 (success) and must SYNC.
    loop_.tick().await.unwrap();

    let requests = server.received_requests().await.unwrap();
    let state_request = requests
        .iter()
        .filter(|r| r.url.path() == format!("/server/{SERVER_ID}/state"))
        .last()
        .expect("one state call after the tick");
    let body: serde_json::Value = state_request.body_json().unwrap();
    let meta_entries = body.get("meta").unwrap().as_array().unwrap();
    assert_eq!(meta_entries[0][0], "SYNC");
}

#[tokio::test]
async fn declined_prepare_excludes_plugin_without_marking_it_failed() {
    let server = MockServer::start().await;
    mount_happy_path(&server, None).await;

    struct DecliningPlugin {
        spec: PluginSpec,
    }

    #[async_trait]
    impl Plugin for DecliningPlugin {
        fn name(&self) -> &str {
            "meta"
        }
        fn spec(&self) -> &PluginSpec {
            &self.spec
        }
        async fn prepare(&self, _settings: &Settings) -> Result<(), PrepareFailure> {
            Err(PrepareFailure("not ready yet".to_string()))
        }
        async fn collect(&self, _settings: &Settings) -> anyhow::Result<Snapshot> {
            panic!("collect should never be reached for a plugin that declined to prepare");
        }
    }

    let registry = hostwarden_core::PluginRegistry::new(vec![Arc::new(DecliningPlugin { spec: meta_spec() })]);
    let settings = settings_for(&server);
    let remote = remote_for(&settings);

    let mut loop_ = CollectionLoop::new(registry, remote, settings);
    loop_.init().await.unwrap();
    loop_.tick().await.unwrap();

    // No /state call at all: the batch was empty both times, since the
    // only plugin never got past prepare().
    let requests = server.received_requests().await.unwrap();
    assert!(requests.iter().all(|r| r.url.path() != format!("/server/{SERVER_ID}/state")));
}

#[tokio::test]
async fn graceful_shutdown_posts_once() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(format!("/server/{SERVER_ID}/shutdown")))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let settings = settings_for(&server);
    let remote = remote_for(&settings);
    let registry = hostwarden_core::PluginRegistry::new(vec![]);
    let loop_ = CollectionLoop::new(registry, remote, settings);

    loop_.notify_shutdown().await;
}
