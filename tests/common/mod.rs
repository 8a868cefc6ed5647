#![allow(dead_code)]

use bibledive::configuration::{get_configuration, DatabaseSettings, Settings};
use bibledive::middleware::JwtVerifier;
use bibledive::services::CompletionClient;
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use sqlx::{Connection, Executor, PgConnection, PgPool};
use std::sync::Arc;
use std::time::Duration;
use tokio_tungstenite::tungstenite::Message;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub struct TestApp {
    pub address: String,
    pub ws_address: String,
    pub db_pool: PgPool,
    pub llm: MockServer,
    pub verifier: JwtVerifier,
}

/// Spawns the server against a fresh database with the LLM API mocked by
/// `wiremock`. `None` when Postgres is unreachable.
pub async fn spawn_app() -> Option<TestApp> {
    let llm = MockServer::start().await;
    let mut configuration = get_configuration().expect("Failed to get configuration");
    configuration.openai.base_url = llm.uri();
    configuration.openai.api_key = "test-key".to_string();

    let (listener, pool, configuration) = prepare(configuration).await?;
    let port = listener.local_addr().unwrap().port();
    let verifier = JwtVerifier::new(&configuration.auth.access_secret);

    let server = bibledive::startup::run(listener, pool.clone(), configuration)
        .await
        .expect("Failed to bind address.");
    let _ = tokio::spawn(server);

    Some(TestApp {
        address: format!("http://127.0.0.1:{}", port),
        ws_address: format!("ws://127.0.0.1:{}/ws", port),
        db_pool: pool,
        llm,
        verifier,
    })
}

/// Like [`spawn_app`] with a caller-supplied completion client.
pub async fn spawn_app_with_completion(completion: Arc<dyn CompletionClient>) -> Option<TestApp> {
    let llm = MockServer::start().await;
    let configuration = get_configuration().expect("Failed to get configuration");

    let (listener, pool, configuration) = prepare(configuration).await?;
    let port = listener.local_addr().unwrap().port();
    let verifier = JwtVerifier::new(&configuration.auth.access_secret);

    let server = bibledive::startup::run_with_completion(
        listener,
        pool.clone(),
        configuration,
        completion,
    )
    .expect("Failed to bind address.");
    let _ = tokio::spawn(server);

    Some(TestApp {
        address: format!("http://127.0.0.1:{}", port),
        ws_address: format!("ws://127.0.0.1:{}/ws", port),
        db_pool: pool,
        llm,
        verifier,
    })
}

async fn prepare(
    mut configuration: Settings,
) -> Option<(std::net::TcpListener, PgPool, Settings)> {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("Failed to bind random port");
    configuration.database.database_name = uuid::Uuid::new_v4().to_string();

    match configure_database(&configuration.database).await {
        Ok(pool) => Some((listener, pool, configuration)),
        Err(err) => {
            eprintln!("Skipping tests: failed to connect to postgres: {}", err);
            None
        }
    }
}

pub async fn configure_database(config: &DatabaseSettings) -> Result<PgPool, sqlx::Error> {
    let mut connection = PgConnection::connect(&config.connection_string_without_db()).await?;

    connection
        .execute(format!(r#"CREATE DATABASE "{}""#, config.database_name).as_str())
        .await?;

    let connection_pool = PgPool::connect(&config.connection_string()).await?;

    sqlx::migrate!("./migrations").run(&connection_pool).await?;

    Ok(connection_pool)
}

/// Standalone pool on a fresh database, for adapter-level tests.
pub async fn database() -> Option<PgPool> {
    let mut configuration = get_configuration().expect("Failed to get configuration");
    configuration.database.database_name = uuid::Uuid::new_v4().to_string();
    match configure_database(&configuration.database).await {
        Ok(pool) => Some(pool),
        Err(err) => {
            eprintln!("Skipping tests: failed to connect to postgres: {}", err);
            None
        }
    }
}

/// SSE body of a streaming chat completion yielding `pieces`.
pub fn sse_body(pieces: &[&str]) -> String {
    let mut body = String::new();
    for piece in pieces {
        let chunk = json!({"choices": [{"index": 0, "delta": {"content": piece}}]});
        body.push_str(&format!("data: {}\n\n", chunk));
    }
    body.push_str("data: [DONE]\n\n");
    body
}

pub async fn mock_chat_stream(llm: &MockServer, pieces: &[&str]) {
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/event-stream")
                .set_body_string(sse_body(pieces)),
        )
        .mount(llm)
        .await;
}

pub type Socket =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

impl TestApp {
    pub fn token(&self, user_id: i32) -> String {
        self.verifier.sign(user_id, 3600).expect("Failed to sign token")
    }

    pub async fn connect(&self, user_id: i32) -> Socket {
        let url = format!("{}?token={}", self.ws_address, self.token(user_id));
        let (socket, _) = tokio_tungstenite::connect_async(url)
            .await
            .expect("Failed to open WebSocket");
        socket
    }

    pub async fn register(&self, username: &str, password: &str) -> reqwest::Response {
        reqwest::Client::new()
            .post(&format!("{}/user", &self.address))
            .json(&json!({
                "username": username,
                "email": format!("{}@example.org", username),
                "password": password,
            }))
            .send()
            .await
            .expect("Failed to execute request.")
    }
}

pub async fn send_action(socket: &mut Socket, jwt: &str, action: &str, data: Value) {
    let frame = json!({"action": action, "jwt": jwt, "data": data}).to_string();
    socket
        .send(Message::Text(frame))
        .await
        .expect("Failed to send frame");
}

/// Next text frame as JSON, skipping control frames.
pub async fn next_event(socket: &mut Socket) -> Value {
    loop {
        let message = tokio::time::timeout(Duration::from_secs(10), socket.next())
            .await
            .expect("Timed out waiting for a frame")
            .expect("Socket closed")
            .expect("Socket error");
        if let Message::Text(text) = message {
            return serde_json::from_str(&text).expect("Frame is not JSON");
        }
    }
}
