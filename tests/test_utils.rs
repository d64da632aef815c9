// Shared helpers; each test binary uses a subset.
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use futures_util::{SinkExt, StreamExt};
use sqlx::postgres::PgPoolOptions;
use tether_server::{
    auth::AuthManager,
    config::Config,
    context::AppContext,
    delivery::DeliveryCoordinator,
    message::{ClientMessage, ServerMessage},
    registry::ConnectionRegistry,
    store::MemoryStore,
};
use tokio::net::TcpListener;
use tokio_tungstenite::{connect_async, tungstenite::Message as WsMessage, WebSocketStream};
use uuid::Uuid;

pub struct TestApp {
    pub address: String,
    pub store: Arc<MemoryStore>,
    pub auth: Arc<AuthManager>,
    pub registry: Arc<ConnectionRegistry>,
}

pub fn test_config() -> Config {
    Config {
        // never connected: the in-memory store backs all test traffic
        database_url: "postgres://localhost:5432/tether_unused".to_string(),
        jwt_secret: "0123456789abcdef0123456789abcdef".to_string(),
        jwt_issuer: "tether-test".to_string(),
        port: 0,
        http_port: 0,
        access_token_ttl_hours: 1,
        refresh_token_ttl_days: 7,
        cors_origin: "http://localhost:5173".to_string(),
    }
}

fn test_context() -> (AppContext, TestApp) {
    let config = Arc::new(test_config());
    let db_pool = Arc::new(
        PgPoolOptions::new()
            .connect_lazy(&config.database_url)
            .expect("lazy pool"),
    );
    let store = Arc::new(MemoryStore::new());
    let registry = Arc::new(ConnectionRegistry::new());
    let delivery = Arc::new(DeliveryCoordinator::new(store.clone(), registry.clone()));
    let auth = Arc::new(AuthManager::new(&config));

    let ctx = AppContext::new(
        db_pool,
        store.clone(),
        registry.clone(),
        delivery,
        auth.clone(),
        config,
    );
    let app = TestApp {
        address: String::new(),
        store,
        auth,
        registry,
    };
    (ctx, app)
}

/// Spawn the websocket server on an ephemeral port, backed by an in-memory
/// store.
pub async fn spawn_app() -> TestApp {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = format!("127.0.0.1:{}", listener.local_addr().unwrap().port());

    let (ctx, mut app) = test_context();
    tokio::spawn(tether_server::run_websocket_server(ctx, listener));

    app.address = address;
    app
}

/// Spawn the REST server on an ephemeral port, backed by an in-memory store.
pub async fn spawn_rest_app() -> TestApp {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = format!("127.0.0.1:{}", listener.local_addr().unwrap().port());

    let (ctx, mut app) = test_context();
    tokio::spawn(async move {
        tether_server::run_rest_server(ctx, listener).await.unwrap();
    });

    app.address = address;
    app
}

impl TestApp {
    pub fn token_for(&self, user_id: Uuid) -> String {
        self.auth.create_token(&user_id).unwrap().0
    }
}

pub struct TestClient {
    pub ws: WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>,
}

impl TestClient {
    pub async fn connect(server_addr: &str) -> Result<Self> {
        let url = format!("ws://{}", server_addr);
        let (ws, _) = connect_async(&url).await?;
        Ok(Self { ws })
    }

    pub async fn send(&mut self, message: &ClientMessage) -> Result<()> {
        let json = serde_json::to_string(message)?;
        self.ws.send(WsMessage::Text(json)).await?;
        Ok(())
    }

    /// Next server event, or `None` when the connection closed. Bounded so a
    /// missing event fails the test instead of hanging it.
    pub async fn recv(&mut self) -> Result<Option<ServerMessage>> {
        let frame = tokio::time::timeout(Duration::from_secs(5), self.ws.next())
            .await
            .map_err(|_| anyhow::anyhow!("timed out waiting for server event"))?;
        match frame {
            Some(Ok(WsMessage::Text(text))) => Ok(Some(serde_json::from_str(&text)?)),
            Some(Ok(WsMessage::Close(_))) | None => Ok(None),
            Some(Ok(other)) => Err(anyhow::anyhow!("unexpected frame: {:?}", other)),
            Some(Err(_)) => Ok(None),
        }
    }

    /// Asserts that no event arrives within a short window.
    pub async fn expect_silence(&mut self) {
        let frame = tokio::time::timeout(Duration::from_millis(300), self.ws.next()).await;
        assert!(frame.is_err(), "expected no server event, got {:?}", frame);
    }

    /// Authenticate this connection and assert success.
    pub async fn authenticate(&mut self, token: &str) -> Result<()> {
        self.send(&ClientMessage::Connect {
            session_token: token.to_string(),
        })
        .await?;
        match self.recv().await? {
            Some(ServerMessage::ConnectSuccess { .. }) => Ok(()),
            other => Err(anyhow::anyhow!("handshake failed: {:?}", other)),
        }
    }

    pub async fn send_text(&mut self, receiver_id: Uuid, text: &str) -> Result<()> {
        self.send(&ClientMessage::Send {
            receiver_id: receiver_id.to_string(),
            text: text.to_string(),
        })
        .await
    }

    /// Expect a `delivered` event and return its message.
    pub async fn expect_delivered(&mut self) -> tether_server::message::Message {
        match self.recv().await.unwrap() {
            Some(ServerMessage::Delivered { message }) => message,
            other => panic!("expected delivered event, got {:?}", other),
        }
    }
}

/// Connect and authenticate in one step.
pub async fn connect_as(app: &TestApp, user_id: Uuid) -> TestClient {
    let mut client = TestClient::connect(&app.address).await.unwrap();
    client.authenticate(&app.token_for(user_id)).await.unwrap();
    client
}
