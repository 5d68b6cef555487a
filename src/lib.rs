//! # curio: an item-catalog backend
//!
//! `curio` is a small catalog service where users own items and label them
//! with shared tags. It is built to live behind either a JWT-issuing identity
//! layer or a trusted SSO reverse proxy, and exposes the same data over two
//! transports: a RESTful API and a GraphQL endpoint.
//!
//! ## Architecture
//!
//! The application is built on [Axum](https://github.com/tokio-rs/axum) for
//! the HTTP layer and uses PostgreSQL (via sqlx) for all persistence.
//!
//! ### Request Flow
//!
//! Every request - REST or GraphQL - follows the same chain:
//!
//! 1. The **principal resolver** ([`auth::resolver`]) reconciles the
//!    configured credential sources (bearer JWT, trusted forwarded headers,
//!    local development fallback) into one request-scoped
//!    [`Principal`](auth::Principal). First-seen external identities are
//!    provisioned atomically by [`auth::provisioning`].
//! 2. The **authorization gate** ([`auth::gate`]) decides access from the
//!    principal's activity flag, role, and resource ownership. There is one
//!    gate implementation for both transports; permission logic duplicated
//!    per transport drifts, so it is deliberately not duplicated here.
//! 3. GraphQL documents additionally pass the **query-safety guard**
//!    ([`graphql::guard`]) before any resolver runs: depth and selection
//!    budgets are enforced on the parsed AST with fragments expanded.
//! 4. Resolvers fetch relations through **per-request loaders**
//!    ([`graphql::loaders`]) so nested selections cost one batched query per
//!    relation instead of one per row.
//!
//! The store declares its own referential integrity: deleting a user
//! cascades to their items, and deleting either side of an item/tag
//! assignment removes only the join rows (see `migrations/`).
//!
//! ## Quick Start
//!
//! ```no_run
//! use clap::Parser;
//! use curio::{Application, Config};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let args = curio::config::Args::parse();
//!     let config = Config::load(&args)?;
//!
//!     curio::telemetry::init_telemetry()?;
//!
//!     let app = Application::new(config).await?;
//!     app.serve(async {
//!         tokio::signal::ctrl_c().await.expect("Failed to listen for Ctrl+C");
//!     })
//!     .await?;
//!
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod auth;
pub mod config;
pub mod db;
pub mod errors;
pub mod graphql;
mod openapi;
pub mod telemetry;
mod types;

#[cfg(test)]
pub mod test_utils;

use crate::{
    auth::password,
    db::handlers::{Repository, Users},
    db::models::users::UserCreateDBRequest,
    errors::Error,
    graphql::CurioSchema,
    openapi::ApiDoc,
};
use axum::{
    http::HeaderValue,
    routing::{get, post},
    Router,
};
use bon::Builder;
pub use config::Config;
use sqlx::PgPool;
use tokio::net::TcpListener;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::{info, instrument, Level};
use utoipa::OpenApi;
use utoipa_scalar::{Scalar, Servable};

pub use types::{ItemId, TagId, UserId};

/// Application state shared across all request handlers.
///
/// Contains the connection pool, the loaded configuration, and the GraphQL
/// schema (which is cheap to clone and carries the query-safety limits).
/// Everything request-scoped - the resolved principal, the loader batch
/// cache - is created per request and passed explicitly, never stored here.
#[derive(Clone, Builder)]
pub struct AppState {
    pub db: PgPool,
    pub config: Config,
    pub schema: CurioSchema,
}

/// Get the curio database migrator
pub fn migrator() -> sqlx::migrate::Migrator {
    sqlx::migrate!("./migrations")
}

/// Create the initial admin user if it doesn't exist.
///
/// Idempotent: creates the user on first startup, or updates the password of
/// the existing row when one is supplied. When no password is configured the
/// row is marked as system-provisioned so the credential invariant holds.
#[instrument(skip_all)]
pub async fn create_initial_admin_user(email: &str, password: Option<&str>, db: &PgPool) -> Result<UserId, Error> {
    let password_hash = password.map(password::hash_string).transpose()?;

    let mut tx = db.begin().await.map_err(|e| Error::Database(e.into()))?;
    let mut users = Users::new(&mut tx);

    if let Some(existing) = users.get_user_by_email(email).await? {
        if let Some(hash) = password_hash {
            users
                .update(
                    existing.id,
                    &db::models::users::UserUpdateDBRequest {
                        hashed_password: Some(hash),
                        ..Default::default()
                    },
                )
                .await?;
        }
        tx.commit().await.map_err(|e| Error::Database(e.into()))?;
        return Ok(existing.id);
    }

    let system_provisioned = password_hash.is_none();
    let created = users
        .create(&UserCreateDBRequest {
            email: email.to_string(),
            username: Some(email.to_string()),
            full_name: None,
            is_active: true,
            is_admin: true,
            hashed_password: password_hash,
            oauth_provider: system_provisioned.then(|| "system".to_string()),
            external_id: system_provisioned.then(|| email.to_string()),
        })
        .await?;

    tx.commit().await.map_err(|e| Error::Database(e.into()))?;
    info!("Created initial admin user {}", email);
    Ok(created.id)
}

/// Create CORS layer from configuration
fn create_cors_layer(config: &Config) -> anyhow::Result<CorsLayer> {
    let cors_config = &config.auth.security.cors;

    let origin = if cors_config.allowed_origins.iter().any(|o| o == "*") {
        AllowOrigin::any()
    } else {
        let mut origins = Vec::new();
        for origin in &cors_config.allowed_origins {
            origins.push(origin.parse::<HeaderValue>()?);
        }
        AllowOrigin::list(origins)
    };

    let mut cors = CorsLayer::new()
        .allow_origin(origin)
        .allow_credentials(cors_config.allow_credentials);

    if let Some(max_age) = cors_config.max_age {
        cors = cors.max_age(std::time::Duration::from_secs(max_age));
    }

    Ok(cors)
}

/// Build the main application router with all endpoints and middleware.
///
/// - REST API under `/api/v1`
/// - GraphQL endpoint at `/graphql`
/// - Health check at `/healthz`
/// - OpenAPI document and Scalar UI at `/docs`
#[instrument(skip_all)]
pub fn build_router(state: &AppState) -> anyhow::Result<Router> {
    let api_routes = Router::new()
        // Items (owned resources)
        .route(
            "/items",
            get(api::handlers::items::list_items).post(api::handlers::items::create_item),
        )
        .route(
            "/items/{id}",
            get(api::handlers::items::get_item)
                .put(api::handlers::items::update_item)
                .delete(api::handlers::items::delete_item),
        )
        .route("/items/{id}/tags", get(api::handlers::items::list_item_tags))
        .route(
            "/items/{id}/tags/{tag_id}",
            axum::routing::put(api::handlers::items::assign_tag).delete(api::handlers::items::unassign_tag),
        )
        // Tags
        .route("/tags", get(api::handlers::tags::list_tags).post(api::handlers::tags::create_tag))
        .route("/tags/{id}", axum::routing::delete(api::handlers::tags::delete_tag))
        // Users
        .route("/users", get(api::handlers::users::list_users))
        .route("/users/me", get(api::handlers::users::me))
        .route(
            "/users/{id}",
            get(api::handlers::users::get_user)
                .patch(api::handlers::users::update_user)
                .delete(api::handlers::users::delete_user),
        );

    let router = Router::new()
        .route("/healthz", get(|| async { "OK" }))
        .route("/graphql", post(graphql::graphql_handler))
        .nest("/api/v1", api_routes)
        .merge(Scalar::with_url("/docs", ApiDoc::openapi()))
        .with_state(state.clone());

    let cors_layer = create_cors_layer(&state.config)?;

    let router = router.layer(cors_layer).layer(
        TraceLayer::new_for_http()
            .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
            .on_request(DefaultOnRequest::new().level(Level::INFO))
            .on_response(DefaultOnResponse::new().level(Level::INFO)),
    );

    Ok(router)
}

/// Main application struct that owns all resources and lifecycle.
///
/// 1. **Create**: [`Application::new`] connects the pool, runs migrations,
///    and bootstraps the initial admin user
/// 2. **Serve**: [`Application::serve`] binds to a TCP port and handles
///    requests until the shutdown future resolves
pub struct Application {
    router: Router,
    config: Config,
    pool: PgPool,
}

impl Application {
    /// Create a new application instance with all resources initialized
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(config.database.max_connections)
            .acquire_timeout(std::time::Duration::from_secs(config.database.acquire_timeout_secs))
            .connect(&config.database.url)
            .await?;

        Self::new_with_pool(config, pool).await
    }

    /// Create an application over an existing pool (used by tests).
    pub async fn new_with_pool(config: Config, pool: PgPool) -> anyhow::Result<Self> {
        migrator().run(&pool).await?;

        create_initial_admin_user(&config.admin_email, config.admin_password.as_deref(), &pool)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to create initial admin user: {e}"))?;

        let schema = graphql::build_schema(&config, pool.clone());
        let state = AppState::builder().db(pool.clone()).config(config.clone()).schema(schema).build();
        let router = build_router(&state)?;

        Ok(Self { router, config, pool })
    }

    /// Convert application into a test server (for tests)
    #[cfg(test)]
    pub fn into_test_server(self) -> axum_test::TestServer {
        axum_test::TestServer::new(self.router).expect("Failed to create test server")
    }

    /// Start serving the application
    pub async fn serve<F>(self, shutdown: F) -> anyhow::Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let bind_addr = self.config.bind_address();
        let listener = TcpListener::bind(&bind_addr).await?;
        info!("curio listening on http://{}", bind_addr);

        axum::serve(listener, self.router)
            .with_graceful_shutdown(shutdown)
            .await?;

        info!("Closing database connections...");
        self.pool.close().await;

        Ok(())
    }
}

#[cfg(test)]
mod test {
    use crate::test_utils::*;
    use serde_json::json;
    use sqlx::PgPool;

    #[sqlx::test]
    #[test_log::test]
    async fn test_healthz(pool: PgPool) {
        let server = create_test_app(pool).await;
        let response = server.get("/healthz").await;
        response.assert_status_ok();
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_rest_requires_authentication(pool: PgPool) {
        let server = create_test_app(pool).await;
        let response = server.get("/api/v1/items").await;
        assert_eq!(response.status_code().as_u16(), 401);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_ownership_scenario_across_rest(pool: PgPool) {
        // User A (non-admin) requesting User B's item -> 403; an admin -> 200;
        // an inactive User A requesting their own item -> 403.
        let server = create_test_app(pool.clone()).await;
        let config = create_test_config();

        let user_a = create_test_user(&pool, false).await;
        let user_b = create_test_user(&pool, false).await;
        let admin = create_test_user(&pool, true).await;
        let item_b = create_test_item(&pool, user_b.id, "globe").await;

        let path = format!("/api/v1/items/{}", item_b.id);

        let response = server
            .get(&path)
            .add_header("authorization", format!("Bearer {}", make_token(&user_a, &config)))
            .await;
        assert_eq!(response.status_code().as_u16(), 403);

        let response = server
            .get(&path)
            .add_header("authorization", format!("Bearer {}", make_token(&admin, &config)))
            .await;
        assert_eq!(response.status_code().as_u16(), 200);

        // Deactivate A, then have them fetch their own item
        let item_a = create_test_item(&pool, user_a.id, "lamp").await;
        deactivate_user(&pool, user_a.id).await;

        let response = server
            .get(&format!("/api/v1/items/{}", item_a.id))
            .add_header("authorization", format!("Bearer {}", make_token(&user_a, &config)))
            .await;
        assert_eq!(response.status_code().as_u16(), 403);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_item_crud_roundtrip(pool: PgPool) {
        let server = create_test_app(pool.clone()).await;
        let config = create_test_config();
        let user = create_test_user(&pool, false).await;
        let auth = format!("Bearer {}", make_token(&user, &config));

        let created = server
            .post("/api/v1/items")
            .add_header("authorization", auth.clone())
            .json(&json!({"title": "sextant", "description": "brass"}))
            .await;
        assert_eq!(created.status_code().as_u16(), 201);
        let item: serde_json::Value = created.json();
        assert_eq!(item["owner_id"], json!(user.id));

        let listed = server.get("/api/v1/items").add_header("authorization", auth.clone()).await;
        listed.assert_status_ok();
        let body: serde_json::Value = listed.json();
        assert_eq!(body["count"], json!(1));

        let item_path = format!("/api/v1/items/{}", item["id"].as_str().unwrap());
        let updated = server
            .put(&item_path)
            .add_header("authorization", auth.clone())
            .json(&json!({"title": "astrolabe"}))
            .await;
        updated.assert_status_ok();
        let updated_body: serde_json::Value = updated.json();
        assert_eq!(updated_body["title"], json!("astrolabe"));
        assert_eq!(updated_body["description"], json!("brass"));

        let deleted = server.delete(&item_path).add_header("authorization", auth.clone()).await;
        assert_eq!(deleted.status_code().as_u16(), 204);

        let gone = server.get(&item_path).add_header("authorization", auth).await;
        assert_eq!(gone.status_code().as_u16(), 404);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_forwarded_headers_authenticate_and_provision(pool: PgPool) {
        let server = create_test_app(pool.clone()).await;

        let response = server
            .get("/api/v1/users/me")
            .add_header("x-forwarded-email", "proxyuser@example.com")
            .add_header("x-forwarded-user", "proxyuser")
            .await;
        response.assert_status_ok();
        let body: serde_json::Value = response.json();
        assert_eq!(body["email"], json!("proxyuser@example.com"));
        assert_eq!(body["is_admin"], json!(false));
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_tag_assignment_flow(pool: PgPool) {
        let server = create_test_app(pool.clone()).await;
        let config = create_test_config();
        let user = create_test_user(&pool, false).await;
        let auth = format!("Bearer {}", make_token(&user, &config));
        let item = create_test_item(&pool, user.id, "orrery").await;

        let tag_created = server
            .post("/api/v1/tags")
            .add_header("authorization", auth.clone())
            .json(&json!({"name": "antique"}))
            .await;
        assert_eq!(tag_created.status_code().as_u16(), 201);
        let tag: serde_json::Value = tag_created.json();
        let tag_id = tag["id"].as_str().unwrap();

        let assigned = server
            .put(&format!("/api/v1/items/{}/tags/{}", item.id, tag_id))
            .add_header("authorization", auth.clone())
            .await;
        assert_eq!(assigned.status_code().as_u16(), 204);

        let tags = server
            .get(&format!("/api/v1/items/{}/tags", item.id))
            .add_header("authorization", auth.clone())
            .await;
        tags.assert_status_ok();
        let tags_body: serde_json::Value = tags.json();
        assert_eq!(tags_body[0]["name"], json!("antique"));

        // Deleting the item removes the assignment but not the tag
        let deleted = server
            .delete(&format!("/api/v1/items/{}", item.id))
            .add_header("authorization", auth.clone())
            .await;
        assert_eq!(deleted.status_code().as_u16(), 204);

        let all_tags = server.get("/api/v1/tags").add_header("authorization", auth).await;
        all_tags.assert_status_ok();
        let all_tags_body: serde_json::Value = all_tags.json();
        assert_eq!(all_tags_body.as_array().unwrap().len(), 1);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_non_admin_cannot_toggle_roles(pool: PgPool) {
        let server = create_test_app(pool.clone()).await;
        let config = create_test_config();
        let user = create_test_user(&pool, false).await;
        let auth = format!("Bearer {}", make_token(&user, &config));

        let response = server
            .patch(&format!("/api/v1/users/{}", user.id))
            .add_header("authorization", auth)
            .json(&json!({"is_admin": true}))
            .await;
        assert_eq!(response.status_code().as_u16(), 403);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_graphql_envelope_over_http(pool: PgPool) {
        let server = create_test_app(pool.clone()).await;
        let config = create_test_config();
        let user = create_test_user(&pool, false).await;
        create_test_item(&pool, user.id, "lamp").await;
        let auth = format!("Bearer {}", make_token(&user, &config));

        let response = server
            .post("/graphql")
            .add_header("authorization", auth)
            .json(&json!({"query": "{ items { title owner { email } } }"}))
            .await;
        response.assert_status_ok();
        let body: serde_json::Value = response.json();
        assert!(body.get("errors").is_none(), "{body}");
        assert_eq!(body["data"]["items"][0]["title"], json!("lamp"));
        assert_eq!(body["data"]["items"][0]["owner"]["email"], json!(user.email));
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_graphql_rejection_has_null_data(pool: PgPool) {
        let server = create_test_app(pool.clone()).await;
        let config = create_test_config();
        let user = create_test_user(&pool, false).await;
        let auth = format!("Bearer {}", make_token(&user, &config));

        // Depth 12 against the configured max of 10
        let deep = "{ items { owner { items { owner { items { owner { items { owner { items { owner { items { id } } } } } } } } } } } }";
        let response = server
            .post("/graphql")
            .add_header("authorization", auth)
            .json(&json!({"query": deep}))
            .await;
        response.assert_status_ok();
        let body: serde_json::Value = response.json();
        assert_eq!(body["data"], json!(null), "no partial data on rejection");
        assert!(body["errors"][0]["message"].as_str().unwrap().contains("too complex"));
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_initial_admin_user_bootstrap_is_idempotent(pool: PgPool) {
        let config = create_test_config();

        let first = super::create_initial_admin_user(&config.admin_email, Some("hunter2"), &pool)
            .await
            .unwrap();
        let second = super::create_initial_admin_user(&config.admin_email, Some("hunter3"), &pool)
            .await
            .unwrap();
        assert_eq!(first, second);

        let mut conn = pool.acquire().await.unwrap();
        let mut users = crate::db::handlers::Users::new(&mut conn);
        let admin = users.get_user_by_email(&config.admin_email).await.unwrap().unwrap();
        assert!(admin.is_admin);
        assert!(crate::auth::password::verify_string("hunter3", admin.hashed_password.as_deref().unwrap()).unwrap());
    }
}
