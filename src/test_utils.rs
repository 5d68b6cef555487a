//! Test utilities shared by unit and integration tests.

use axum_test::TestServer;
use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    auth::token,
    config::{AuthConfig, AuthMode, Config},
    db::{
        handlers::{Items, Repository, Users},
        models::{
            items::{ItemCreateDBRequest, ItemDBResponse},
            users::{UserCreateDBRequest, UserDBResponse, UserUpdateDBRequest},
        },
    },
    AppState,
};

/// A config suitable for tests: hybrid auth with a fixed secret, local
/// environment, default graphql limits.
pub fn create_test_config() -> Config {
    Config {
        host: "127.0.0.1".to_string(),
        port: 0,
        admin_email: "admin@test.local".to_string(),
        admin_password: Some("test-admin-password".to_string()),
        secret_key: Some("test-secret-key-for-testing-only".to_string()),
        auth: AuthConfig {
            mode: AuthMode::Hybrid,
            ..Default::default()
        },
        ..Default::default()
    }
}

/// Build an [`AppState`] over an existing pool without running migrations
/// (`#[sqlx::test]` already applied them) or bootstrap.
pub async fn create_test_state(pool: PgPool, config: Config) -> AppState {
    let schema = crate::graphql::build_schema(&config, pool.clone());
    AppState::builder().db(pool).config(config).schema(schema).build()
}

/// Spin up the whole application over the test pool.
pub async fn create_test_app(pool: PgPool) -> TestServer {
    let config = create_test_config();
    let app = crate::Application::new_with_pool(config, pool)
        .await
        .expect("Failed to create application");
    app.into_test_server()
}

/// Create a user with a unique email. `is_admin` controls the role flag.
pub async fn create_test_user(pool: &PgPool, is_admin: bool) -> UserDBResponse {
    let suffix = Uuid::new_v4().simple().to_string();
    let mut conn = pool.acquire().await.unwrap();
    let mut users = Users::new(&mut conn);

    users
        .create(&UserCreateDBRequest {
            email: format!("user-{suffix}@example.com"),
            username: Some(format!("user-{suffix}")),
            full_name: None,
            is_active: true,
            is_admin,
            hashed_password: Some("$argon2id$test-only-hash".to_string()),
            oauth_provider: None,
            external_id: None,
        })
        .await
        .expect("Failed to create test user")
}

/// Create an item owned by the given user.
pub async fn create_test_item(pool: &PgPool, owner_id: crate::types::UserId, title: &str) -> ItemDBResponse {
    let mut conn = pool.acquire().await.unwrap();
    let mut items = Items::new(&mut conn);

    items
        .create(&ItemCreateDBRequest {
            title: title.to_string(),
            description: None,
            owner_id,
        })
        .await
        .expect("Failed to create test item")
}

/// Flip a user's active flag off.
pub async fn deactivate_user(pool: &PgPool, user_id: crate::types::UserId) {
    let mut conn = pool.acquire().await.unwrap();
    let mut users = Users::new(&mut conn);
    users
        .update(
            user_id,
            &UserUpdateDBRequest {
                is_active: Some(false),
                ..Default::default()
            },
        )
        .await
        .expect("Failed to deactivate test user");
}

/// Mint a bearer token for a user with the test secret.
pub fn make_token(user: &UserDBResponse, config: &Config) -> String {
    token::create_token(user.id, &user.email, config).expect("Failed to create test token")
}
