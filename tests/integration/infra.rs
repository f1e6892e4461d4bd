use std::sync::Arc;

use anyhow::{Context, Result};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use patrol_api::ApiState;
use patrol_core::codec::{CodecSecret, EntityType, IdCodec};
use patrol_core::config::{MessagingSettings, StorageBackend};
use patrol_services::{
    BroadcastNotifier, Directory, MemoryDirectory, MemoryMessageStore, MessageRepository,
};

// ── Server ────────────────────────────────────────────────────────────────────

/// One in-process API server. Shut down on drop.
pub struct TestServer {
    pub base: String,
    pub codec: Arc<IdCodec>,
    pub notifier: BroadcastNotifier,
    client: reqwest::Client,
    shutdown: Option<oneshot::Sender<()>>,
    _handle: JoinHandle<()>,
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

/// Server over fresh in-memory stores with default limits.
pub async fn spawn_server() -> Result<TestServer> {
    spawn_server_with(
        Arc::new(MemoryDirectory::new()),
        Arc::new(MemoryMessageStore::new()),
        StorageBackend::Memory,
        MessagingSettings::default(),
    )
    .await
}

pub async fn spawn_server_with(
    directory: Arc<dyn Directory>,
    messages: Arc<dyn MessageRepository>,
    backend: StorageBackend,
    settings: MessagingSettings,
) -> Result<TestServer> {
    let codec = Arc::new(IdCodec::new(&CodecSecret::generate()));
    let notifier = BroadcastNotifier::new(settings.notification_buffer);
    let state = ApiState::new(
        codec.clone(),
        directory,
        messages,
        Arc::new(notifier.clone()),
        settings,
        backend,
    );

    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let (tx, rx) = oneshot::channel::<()>();
    let handle = tokio::spawn(async move {
        let signal = async move {
            rx.await.ok();
        };
        if let Err(e) = patrol_api::serve_on(listener, state, signal).await {
            eprintln!("test server failed: {e}");
        }
    });

    Ok(TestServer {
        base: format!("http://{addr}/api"),
        codec,
        notifier,
        client: reqwest::Client::new(),
        shutdown: Some(tx),
        _handle: handle,
    })
}

// ── HTTP helpers ──────────────────────────────────────────────────────────────

impl TestServer {
    async fn send(&self, req: reqwest::RequestBuilder) -> Result<(u16, Value)> {
        let resp = req.send().await.context("request failed")?;
        let status = resp.status().as_u16();
        let body = resp.json::<Value>().await.context("response is not JSON")?;
        Ok((status, body))
    }

    pub async fn get(&self, path: &str) -> Result<(u16, Value)> {
        self.send(self.client.get(format!("{}{path}", self.base))).await
    }

    pub async fn post(&self, path: &str, body: Value) -> Result<(u16, Value)> {
        self.send(self.client.post(format!("{}{path}", self.base)).json(&body))
            .await
    }

    pub async fn patch(&self, path: &str, body: Value) -> Result<(u16, Value)> {
        self.send(self.client.patch(format!("{}{path}", self.base)).json(&body))
            .await
    }

    pub async fn delete(&self, path: &str) -> Result<(u16, Value)> {
        self.send(self.client.delete(format!("{}{path}", self.base)))
            .await
    }

    /// POST raw bytes with a JSON content type.
    pub async fn post_raw(&self, path: &str, body: &'static str) -> Result<(u16, Value)> {
        self.send(
            self.client
                .post(format!("{}{path}", self.base))
                .header("content-type", "application/json")
                .body(body),
        )
        .await
    }

    /// POST and require a success envelope; returns `data`.
    pub async fn post_ok(&self, path: &str, body: Value) -> Result<Value> {
        let (status, resp) = self.post(path, body).await?;
        anyhow::ensure!(status == 200, "POST {path} -> {status}: {resp}");
        anyhow::ensure!(resp["status"] == "success", "POST {path}: {resp}");
        Ok(resp["data"].clone())
    }

    pub async fn get_ok(&self, path: &str) -> Result<Value> {
        let (status, resp) = self.get(path).await?;
        anyhow::ensure!(status == 200, "GET {path} -> {status}: {resp}");
        Ok(resp["data"].clone())
    }

    /// A token the server will accept as the right type but that names no row.
    pub fn token(&self, entity: EntityType, id: u64) -> String {
        self.codec.encode(entity, id).unwrap()
    }

    /// Numeric id behind a token. Tokens are re-sealed on every response, so
    /// two tokens for one row only compare equal after decoding.
    pub fn id_of(&self, token: &Value, entity: EntityType) -> u64 {
        let token = token.as_str().expect("token is not a string");
        self.codec.decode(token, entity).expect("token does not decode")
    }

    pub fn assert_same_id(&self, a: &Value, b: &Value, entity: EntityType) {
        assert_eq!(
            self.id_of(a, entity),
            self.id_of(b, entity),
            "{a} and {b} name different {entity}s"
        );
    }
}

// ── Fixtures ──────────────────────────────────────────────────────────────────

/// Opaque ids of a seeded order: one client, `agents` assigned, one outsider.
pub struct Seed {
    pub client: String,
    pub agents: Vec<String>,
    pub outsider: String,
    pub order: String,
}

pub async fn register(server: &TestServer, name: &str, role: &str) -> Result<String> {
    let data = server
        .post_ok("/users", json!({ "name": name, "role": role }))
        .await?;
    Ok(data["id"].as_str().context("user id missing")?.to_string())
}

pub async fn seed(server: &TestServer, agents: usize) -> Result<Seed> {
    let client = register(server, "Résidence Les Tilleuls", "client").await?;
    let order = server
        .post_ok("/orders", json!({ "client_id": client }))
        .await?["id"]
        .as_str()
        .context("order id missing")?
        .to_string();

    let mut agent_ids = Vec::new();
    for i in 0..agents {
        let agent = register(server, &format!("Agent {i}"), "agent").await?;
        server
            .post_ok(
                &format!("/orders/{order}/assignments"),
                json!({ "agent_id": agent, "latitude": 48.8606, "longitude": 2.3376 }),
            )
            .await?;
        agent_ids.push(agent);
    }

    let outsider = register(server, "Unassigned", "agent").await?;
    Ok(Seed {
        client,
        agents: agent_ids,
        outsider,
        order,
    })
}

pub fn error_fields(body: &Value) -> Vec<String> {
    body["violations"]
        .as_array()
        .map(|v| {
            v.iter()
                .filter_map(|x| x["field"].as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}
