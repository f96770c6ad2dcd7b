//! # Server Setup
//!
//! Server initialization, route registration, and HTTP server startup.
//!
//! Builds the connection pool, runs migrations, wires the chat session with
//! its injected collaborators (store pool, response generator, delivery
//! bus), and serves the Axum router.

// region: --- Imports
use crate::chat::{ChatSession, DeliveryBus, OllamaClient, ReplyGenerator};
use crate::handlers;
use crate::middleware::{log_requests, stamp_req};
use axum::{
    routing::{get, post},
    Router,
};
use lib_core::{create_pool, Config, DbPool};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::info;
// endregion: --- Imports

// region: --- AppState
/// Application state shared across all routes.
#[derive(Clone)]
pub struct AppState {
    pub db: DbPool,
    pub config: Config,
    pub bus: Arc<DeliveryBus>,
    pub ollama: Arc<OllamaClient>,
    pub session: Arc<ChatSession>,
}

impl axum::extract::FromRef<AppState> for DbPool {
    fn from_ref(state: &AppState) -> Self {
        state.db.clone()
    }
}

impl axum::extract::FromRef<AppState> for Config {
    fn from_ref(state: &AppState) -> Self {
        state.config.clone()
    }
}

impl axum::extract::FromRef<AppState> for Arc<DeliveryBus> {
    fn from_ref(state: &AppState) -> Self {
        state.bus.clone()
    }
}

impl axum::extract::FromRef<AppState> for Arc<OllamaClient> {
    fn from_ref(state: &AppState) -> Self {
        state.ollama.clone()
    }
}

impl axum::extract::FromRef<AppState> for Arc<ChatSession> {
    fn from_ref(state: &AppState) -> Self {
        state.session.clone()
    }
}
// endregion: --- AppState

// region: --- Server Configuration
/// Server configuration.
pub struct ServerConfig {
    /// Bind address (e.g., "127.0.0.1:3000")
    pub bind_address: String,
    /// Allowed CORS origins
    pub allowed_origins: Vec<String>,
    /// Database migrations path
    pub migrations_path: &'static str,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:3000".to_string(),
            allowed_origins: vec![
                "http://localhost:5173".to_string(),
                "http://127.0.0.1:5173".to_string(),
            ],
            migrations_path: "./migrations",
        }
    }
}
// endregion: --- Server Configuration

// region: --- Server Setup
/// Initialize and start the HTTP server.
///
/// # Errors
///
/// Returns an error if configuration loading, database setup, migrations,
/// or binding the listener fails. A missing model service is not an error:
/// generation degrades to the fallback reply until it is reachable.
pub async fn start_server(server_config: ServerConfig) -> anyhow::Result<()> {
    init_tracing();

    dotenvy::dotenv().ok();

    info!("Loading configuration...");
    let config = Config::from_env().map_err(|e| anyhow::anyhow!(e))?;
    config.validate().map_err(|e| anyhow::anyhow!(e))?;

    // Ensure the data directory exists for a file-backed SQLite database.
    if let Some(db_path) = config.database_url.strip_prefix("sqlite:") {
        if let Some(parent) = std::path::Path::new(db_path).parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
                info!("Created database directory: {:?}", parent);
            }
        }
    }

    info!("Connecting to database...");
    let pool = create_pool(&config.database_url).await?;

    info!("Running database migrations from: {}", server_config.migrations_path);
    let migrator =
        sqlx::migrate::Migrator::new(std::path::Path::new(server_config.migrations_path)).await?;
    migrator.run(&pool).await?;
    info!("Migrations complete");

    let bus = Arc::new(DeliveryBus::new());
    let ollama = Arc::new(OllamaClient::new(
        &config.ollama_url,
        config.ollama_timeout_secs,
    ));
    let generator: Arc<dyn ReplyGenerator> = ollama.clone();
    let session = Arc::new(ChatSession::new(pool.clone(), generator, bus.clone()));

    let state = AppState {
        db: pool,
        config,
        bus,
        ollama,
        session,
    };

    let app = create_router(state, server_config.allowed_origins.clone());

    let listener = tokio::net::TcpListener::bind(&server_config.bind_address).await?;

    info!("SERVER READY: http://{}", server_config.bind_address);
    log_server_info();

    axum::serve(listener, app).await?;
    Ok(())
}

fn init_tracing() {
    let log_level = std::env::var("LOG_LEVEL")
        .unwrap_or_else(|_| "info".to_string())
        .to_lowercase();

    let filter = match log_level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => {
            tracing_subscriber::EnvFilter::new(log_level)
        }
        _ => tracing_subscriber::EnvFilter::new("info"),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .ok();
}

/// Create the main application router with all routes.
fn create_router(state: AppState, allowed_origins: Vec<String>) -> Router {
    use axum::http::{HeaderValue, Method};

    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();

    let cors = CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([
            axum::http::header::CONTENT_TYPE,
            axum::http::header::AUTHORIZATION,
            axum::http::header::HeaderName::from_static("subscribe"),
            axum::http::header::HeaderName::from_static("since"),
        ]);

    Router::new()
        .route("/api/auth/signup", post(handlers::auth::signup))
        .route("/api/auth/login", post(handlers::auth::login))
        .route("/api/ai/models", get(handlers::models::list_models))
        .route(
            "/api/ai/chats",
            post(handlers::chats::create_chat).get(handlers::chats::list_chats),
        )
        .route(
            "/api/ai/chats/{chat_id}",
            get(handlers::chats::get_chat).delete(handlers::chats::delete_chat),
        )
        .route(
            "/api/ai/chats/{chat_id}/messages",
            post(handlers::chats::send_message),
        )
        .route("/health", get(|| async { "OK" }))
        .fallback(|| async { (axum::http::StatusCode::NOT_FOUND, "Route not found") })
        .with_state(state)
        .layer(axum::middleware::from_fn(stamp_req))
        .layer(axum::middleware::from_fn(log_requests))
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .layer(cors)
}

/// Log the routes the server exposes.
fn log_server_info() {
    info!("AUTH:");
    info!("   • POST /api/auth/signup");
    info!("   • POST /api/auth/login");
    info!("MODELS:");
    info!("   • GET  /api/ai/models");
    info!("CHATS:");
    info!("   • POST   /api/ai/chats");
    info!("   • GET    /api/ai/chats");
    info!("   • GET    /api/ai/chats/{{id}}          (with `subscribe` header: SSE stream)");
    info!("   • POST   /api/ai/chats/{{id}}/messages");
    info!("   • DELETE /api/ai/chats/{{id}}");
    info!("HEALTH:");
    info!("   • GET  /health");
}
// endregion: --- Server Setup

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::generate::{GeneratedReply, HistoryMessage};
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use lib_core::dto::{AuthResponse, ChatResponse, CreateChatResponse, SendMessageResponse};
    use sqlx::sqlite::SqlitePoolOptions;
    use tower::ServiceExt;

    struct EchoGenerator;

    #[async_trait]
    impl ReplyGenerator for EchoGenerator {
        async fn generate(&self, _model: &str, history: &[HistoryMessage]) -> GeneratedReply {
            let last = history.last().map(|m| m.content.as_str()).unwrap_or("");
            GeneratedReply {
                content: format!("echo: {}", last),
                upstream_error: None,
            }
        }
    }

    async fn setup_test_db() -> DbPool {
        let pool = SqlitePoolOptions::new()
            // One connection: a pooled in-memory SQLite gives every
            // connection its own database.
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("Failed to create test database");

        sqlx::raw_sql(
            r#"
            CREATE TABLE users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                username TEXT NOT NULL UNIQUE,
                email TEXT NOT NULL UNIQUE,
                password_hash TEXT NOT NULL,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
            );
            CREATE TABLE chats (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL REFERENCES users(id),
                title TEXT NOT NULL,
                model TEXT NOT NULL DEFAULT 'llama2',
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
            );
            CREATE TABLE messages (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                chat_id INTEGER NOT NULL REFERENCES chats(id) ON DELETE CASCADE,
                seq INTEGER NOT NULL,
                sender_id INTEGER NOT NULL,
                role TEXT NOT NULL CHECK (role IN ('user', 'assistant')),
                content TEXT NOT NULL,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                UNIQUE (chat_id, seq)
            );
            "#,
        )
        .execute(&pool)
        .await
        .expect("Failed to create schema");

        pool
    }

    fn test_config() -> Config {
        Config {
            database_url: "sqlite::memory:".to_string(),
            jwt_secret: "test-secret-key-must-be-at-least-32-characters!".to_string(),
            jwt_expiration_hours: 24,
            ollama_url: "http://127.0.0.1:1".to_string(),
            ollama_timeout_secs: 1,
        }
    }

    async fn test_app() -> Router {
        let pool = setup_test_db().await;
        let config = test_config();
        let bus = Arc::new(DeliveryBus::new());
        let ollama = Arc::new(OllamaClient::new(&config.ollama_url, 1));
        let generator: Arc<dyn ReplyGenerator> = Arc::new(EchoGenerator);
        let session = Arc::new(ChatSession::new(pool.clone(), generator, bus.clone()));

        let state = AppState {
            db: pool,
            config,
            bus,
            ollama,
            session,
        };

        create_router(state, vec![])
    }

    async fn json_body<T: serde::de::DeserializeOwned>(response: axum::response::Response) -> T {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).expect("response should deserialize")
    }

    async fn signup(app: &Router, username: &str) -> AuthResponse {
        let body = serde_json::json!({
            "username": username,
            "email": format!("{}@example.com", username),
            "password": "TestPassword123!",
        });

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/auth/signup")
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::CREATED);
        json_body(response).await
    }

    async fn create_chat(app: &Router, token: &str) -> CreateChatResponse {
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/ai/chats")
                    .header("content-type", "application/json")
                    .header("authorization", format!("Bearer {}", token))
                    .body(Body::from(r#"{"title": "Test chat", "model": "llama2"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::CREATED);
        json_body(response).await
    }

    #[tokio::test]
    async fn test_send_message_round_trip() {
        let app = test_app().await;
        let auth = signup(&app, "alice").await;
        let chat = create_chat(&app, &auth.token).await;

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(format!("/api/ai/chats/{}/messages", chat.chat.id))
                    .header("content-type", "application/json")
                    .header("authorization", format!("Bearer {}", auth.token))
                    .body(Body::from(r#"{"content": "hello"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let sent: SendMessageResponse = json_body(response).await;
        assert_eq!(sent.user_message.content, "hello");
        assert_eq!(sent.assistant_message.content, "echo: hello");

        // The poll read path returns both messages in order.
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri(format!("/api/ai/chats/{}", chat.chat.id))
                    .header("authorization", format!("Bearer {}", auth.token))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let read: ChatResponse = json_body(response).await;
        assert_eq!(read.chat.messages.len(), 2);
        assert_eq!(read.chat.messages[0].content, "hello");
        assert_eq!(read.chat.messages[1].seq, 1);
    }

    #[tokio::test]
    async fn test_subscribe_header_switches_to_event_stream() {
        let app = test_app().await;
        let auth = signup(&app, "alice").await;
        let chat = create_chat(&app, &auth.token).await;

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri(format!("/api/ai/chats/{}", chat.chat.id))
                    .header("authorization", format!("Bearer {}", auth.token))
                    .header("subscribe", "true")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let content_type = response
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");
        assert!(content_type.starts_with("text/event-stream"));
    }

    #[tokio::test]
    async fn test_subscribe_to_foreign_chat_is_forbidden() {
        let app = test_app().await;
        let alice = signup(&app, "alice").await;
        let bob = signup(&app, "bob").await;
        let chat = create_chat(&app, &alice.token).await;

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri(format!("/api/ai/chats/{}", chat.chat.id))
                    .header("authorization", format!("Bearer {}", bob.token))
                    .header("subscribe", "true")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        // Whereas the plain read hides the chat's existence entirely.
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri(format!("/api/ai/chats/{}", chat.chat.id))
                    .header("authorization", format!("Bearer {}", bob.token))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_requests_without_token_are_unauthorized() {
        let app = test_app().await;

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/api/ai/chats")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_delete_chat_removes_it() {
        let app = test_app().await;
        let auth = signup(&app, "alice").await;
        let chat = create_chat(&app, &auth.token).await;

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("DELETE")
                    .uri(format!("/api/ai/chats/{}", chat.chat.id))
                    .header("authorization", format!("Bearer {}", auth.token))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri(format!("/api/ai/chats/{}", chat.chat.id))
                    .header("authorization", format!("Bearer {}", auth.token))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
