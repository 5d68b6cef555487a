//! First-login provisioning for externally authenticated identities.
//!
//! Forwarded-header (and local-fallback) identities have no signup step: the
//! first request that carries an unseen identity creates its user row. Two
//! such requests can race, so creation is an atomic insert-or-nothing with a
//! re-read on conflict - the unique constraints on `users.email` and
//! `users.username` are the arbiter, not an application-level lock. At most
//! one row ever exists per external identity, and the race is absorbed here
//! without surfacing to the caller.

use sqlx::PgConnection;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::{
    db::{
        errors::DbError,
        handlers::Users,
        models::users::UserDBResponse,
    },
    errors::{Error, Result},
};

/// Identity claims extracted from forwarded headers.
#[derive(Debug, Clone)]
pub struct ForwardedClaims {
    pub email: String,
    pub username: String,
    pub full_name: Option<String>,
    pub provider: String,
}

/// Resolve the claims to exactly one user row, creating it on first login.
///
/// Matching order is email first, then username. Every successful resolution
/// stamps `last_login`. Role flags are never derived from claims: new rows are
/// always non-admin, and existing rows keep whatever an administrator set.
///
/// `allow_email_linking` governs the hybrid-mode edge where the claimed email
/// belongs to a password-only account: linking the external identity onto
/// that row is refused unless explicitly enabled, because an unverified email
/// claim would otherwise take the account over.
#[instrument(skip(conn, claims), fields(email = %claims.email), err)]
pub async fn ensure_user(conn: &mut PgConnection, claims: &ForwardedClaims, allow_email_linking: bool) -> Result<UserDBResponse> {
    let mut users = Users::new(conn);

    if let Some(user) = users.get_user_by_email(&claims.email).await.map_err(Error::Database)? {
        return adopt_existing(&mut users, user, claims, allow_email_linking).await;
    }

    if let Some(user) = users.get_user_by_username(&claims.username).await.map_err(Error::Database)? {
        // Username matched under a different email: the provider re-issued
        // the address. Keep the row, refresh the email (original behavior).
        debug!(user_id = %user.id, "refreshing email for username-matched identity");
        let refreshed = refresh_email(&mut users, user.id, &claims.email).await?;
        users.touch_last_login(refreshed.id).await.map_err(Error::Database)?;
        return Ok(refreshed);
    }

    // First login: attempt the insert. DO NOTHING on any unique conflict so a
    // concurrent first login for the same identity cannot fail or duplicate.
    match insert_new(&mut users, claims).await {
        Ok(Some(user)) => {
            debug!(user_id = %user.id, "provisioned new user from external identity");
            Ok(user)
        }
        Ok(None) | Err(Error::Database(DbError::UniqueViolation { .. })) => {
            // Lost the race: the row exists now, re-read it.
            let existing = users
                .get_user_by_email(&claims.email)
                .await
                .map_err(Error::Database)?;
            let existing = match existing {
                Some(user) => Some(user),
                None => users.get_user_by_username(&claims.username).await.map_err(Error::Database)?,
            };
            let user = existing.ok_or_else(|| Error::Internal {
                operation: "re-read user after provisioning conflict".to_string(),
            })?;
            adopt_existing(&mut users, user, claims, allow_email_linking).await
        }
        Err(e) => Err(e),
    }
}

/// An existing row matched the claims: apply the linking policy and stamp the login.
async fn adopt_existing<'c>(
    users: &mut Users<'c>,
    user: UserDBResponse,
    claims: &ForwardedClaims,
    allow_email_linking: bool,
) -> Result<UserDBResponse> {
    let user = if user.oauth_provider.is_none() && user.hashed_password.is_some() {
        if !allow_email_linking {
            warn!(
                user_id = %user.id,
                "refusing to link forwarded identity to password-only account (allow_email_linking is off)"
            );
            return Err(Error::Unauthenticated {
                message: Some("This email is registered with password authentication".to_string()),
            });
        }
        link_external_identity(users, user.id, claims).await?
    } else {
        user
    };

    users.touch_last_login(user.id).await.map_err(Error::Database)?;
    Ok(user)
}

async fn insert_new<'c>(users: &mut Users<'c>, claims: &ForwardedClaims) -> Result<Option<UserDBResponse>> {
    let user = sqlx::query_as::<_, UserDBResponse>(
        r#"
        INSERT INTO users (id, email, username, full_name, is_active, is_admin, oauth_provider, external_id)
        VALUES ($1, $2, $3, $4, TRUE, FALSE, $5, $6)
        ON CONFLICT DO NOTHING
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(&claims.email)
    .bind(&claims.username)
    .bind(&claims.full_name)
    .bind(&claims.provider)
    .bind(&claims.username)
    .fetch_optional(users.connection())
    .await
    .map_err(|e| Error::Database(DbError::from(e)))?;

    Ok(user)
}

async fn refresh_email<'c>(users: &mut Users<'c>, id: Uuid, email: &str) -> Result<UserDBResponse> {
    let user = sqlx::query_as::<_, UserDBResponse>(
        "UPDATE users SET email = $2, updated_at = NOW() WHERE id = $1 RETURNING *",
    )
    .bind(id)
    .bind(email)
    .fetch_one(users.connection())
    .await
    .map_err(|e| Error::Database(DbError::from(e)))?;

    Ok(user)
}

/// Attach the external identity to a password account (explicit opt-in path).
/// The password stays; the row becomes a hybrid account.
async fn link_external_identity<'c>(users: &mut Users<'c>, id: Uuid, claims: &ForwardedClaims) -> Result<UserDBResponse> {
    debug!(user_id = %id, provider = %claims.provider, "linking external identity to existing account");
    let user = sqlx::query_as::<_, UserDBResponse>(
        r#"
        UPDATE users SET oauth_provider = $2, external_id = $3, updated_at = NOW()
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(&claims.provider)
    .bind(&claims.username)
    .fetch_one(users.connection())
    .await
    .map_err(|e| Error::Database(DbError::from(e)))?;

    Ok(user)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::handlers::Repository;
    use crate::db::models::users::UserCreateDBRequest;
    use sqlx::PgPool;

    fn claims(email: &str, username: &str) -> ForwardedClaims {
        ForwardedClaims {
            email: email.to_string(),
            username: username.to_string(),
            full_name: Some(format!("{username} Example")),
            provider: "oauth2-proxy".to_string(),
        }
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_first_login_creates_user(pool: PgPool) {
        let mut conn = pool.acquire().await.unwrap();

        let user = ensure_user(&mut conn, &claims("new@example.com", "new"), false).await.unwrap();
        assert_eq!(user.email, "new@example.com");
        assert_eq!(user.username.as_deref(), Some("new"));
        assert_eq!(user.oauth_provider.as_deref(), Some("oauth2-proxy"));
        assert_eq!(user.external_id.as_deref(), Some("new"));
        assert!(user.is_active);
        // Claims never grant roles
        assert!(!user.is_admin);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_second_login_reuses_row_and_touches_last_login(pool: PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let c = claims("repeat@example.com", "repeat");

        let first = ensure_user(&mut conn, &c, false).await.unwrap();
        let second = ensure_user(&mut conn, &c, false).await.unwrap();

        assert_eq!(first.id, second.id);

        let mut users = Users::new(&mut conn);
        assert_eq!(users.count().await.unwrap(), 1);

        let reread = users.get_by_id(first.id).await.unwrap().unwrap();
        assert!(reread.last_login >= first.last_login);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_concurrent_first_logins_create_one_row(pool: PgPool) {
        // Fifty concurrent first logins for one unseen identity must
        // produce exactly one stored row.
        let c = claims("racer@example.com", "racer");

        let mut handles = Vec::new();
        for _ in 0..50 {
            let pool = pool.clone();
            let c = c.clone();
            handles.push(tokio::spawn(async move {
                let mut conn = pool.acquire().await.unwrap();
                ensure_user(&mut conn, &c, false).await
            }));
        }

        let mut ids = Vec::new();
        for handle in handles {
            let user = handle.await.unwrap().expect("provisioning race must be absorbed");
            ids.push(user.id);
        }

        ids.dedup();
        assert_eq!(ids.len(), 1, "all racers must resolve to the same row");

        let mut conn = pool.acquire().await.unwrap();
        let mut users = Users::new(&mut conn);
        assert_eq!(users.count().await.unwrap(), 1);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_username_match_refreshes_email(pool: PgPool) {
        let mut conn = pool.acquire().await.unwrap();

        let original = ensure_user(&mut conn, &claims("old@example.com", "stable"), false).await.unwrap();
        let updated = ensure_user(&mut conn, &claims("new-address@example.com", "stable"), false)
            .await
            .unwrap();

        assert_eq!(original.id, updated.id);
        assert_eq!(updated.email, "new-address@example.com");

        let mut users = Users::new(&mut conn);
        assert_eq!(users.count().await.unwrap(), 1);
    }

    async fn seed_password_account(pool: &PgPool, email: &str) -> UserDBResponse {
        let mut conn = pool.acquire().await.unwrap();
        let mut users = Users::new(&mut conn);
        users
            .create(&UserCreateDBRequest {
                email: email.to_string(),
                username: None,
                full_name: None,
                is_active: true,
                is_admin: false,
                hashed_password: Some("$argon2id$fake-hash".to_string()),
                oauth_provider: None,
                external_id: None,
            })
            .await
            .unwrap()
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_linking_to_password_account_refused_by_default(pool: PgPool) {
        seed_password_account(&pool, "linked@example.com").await;

        let mut conn = pool.acquire().await.unwrap();
        let err = ensure_user(&mut conn, &claims("linked@example.com", "linked"), false)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Unauthenticated { .. }));

        // The password account is untouched
        let mut users = Users::new(&mut conn);
        let row = users.get_user_by_email("linked@example.com").await.unwrap().unwrap();
        assert!(row.oauth_provider.is_none());
        assert!(row.hashed_password.is_some());
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_linking_opt_in_creates_hybrid_account(pool: PgPool) {
        let seeded = seed_password_account(&pool, "hybrid@example.com").await;

        let mut conn = pool.acquire().await.unwrap();
        let user = ensure_user(&mut conn, &claims("hybrid@example.com", "hybrid"), true)
            .await
            .unwrap();

        assert_eq!(user.id, seeded.id);
        // Both credentials now present on the one row
        assert_eq!(user.oauth_provider.as_deref(), Some("oauth2-proxy"));
        assert!(user.hashed_password.is_some());
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_claims_never_touch_admin_flag(pool: PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let mut users = Users::new(&mut conn);
        let admin = users
            .create(&UserCreateDBRequest {
                email: "boss@example.com".to_string(),
                username: Some("boss".to_string()),
                full_name: None,
                is_active: true,
                is_admin: true,
                hashed_password: None,
                oauth_provider: Some("oauth2-proxy".to_string()),
                external_id: Some("boss".to_string()),
            })
            .await
            .unwrap();
        drop(users);

        let user = ensure_user(&mut conn, &claims("boss@example.com", "boss"), false).await.unwrap();
        assert_eq!(user.id, admin.id);
        // Existing elevation is preserved; it was never claim-derived
        assert!(user.is_admin);
    }
}
