//! Per-request relation loaders.
//!
//! Each loader coalesces every `load` call issued during one slice of
//! resolution into a single keyed query (`WHERE .. = ANY($1)`), and caches
//! resolved keys for the remainder of the request. A fresh [`Loaders`] set is
//! attached to every GraphQL request and dropped with it - sharing one across
//! requests would leak authorization-scoped data between principals, so the
//! loaders are deliberately request data, not schema data.
//!
//! Keys with no matching row resolve to an absent value, not an error.

use std::collections::HashMap;
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use async_graphql::dataloader::{DataLoader, HashMapCache, Loader};
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::db::{
    errors::DbError,
    models::{items::ItemDBResponse, tags::TagDBResponse, users::UserDBResponse},
};
use crate::types::{ItemId, UserId};

/// Loads users by id (the `Item.owner` relation).
pub struct UserLoader {
    pool: PgPool,
    fetches: Arc<AtomicUsize>,
}

impl UserLoader {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            fetches: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Counter of batched fetches issued, shared with the loader after it
    /// moves into a `DataLoader`. Tests assert on it.
    pub fn fetch_counter(&self) -> Arc<AtomicUsize> {
        self.fetches.clone()
    }
}

impl Loader<UserId> for UserLoader {
    type Value = UserDBResponse;
    type Error = Arc<DbError>;

    async fn load(&self, keys: &[UserId]) -> Result<HashMap<UserId, Self::Value>, Self::Error> {
        self.fetches.fetch_add(1, Ordering::SeqCst);

        let users = sqlx::query_as::<_, UserDBResponse>("SELECT * FROM users WHERE id = ANY($1)")
            .bind(keys)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| Arc::new(DbError::from(e)))?;

        Ok(users.into_iter().map(|u| (u.id, u)).collect())
    }
}

/// Loads a user's items in one grouped query (the `User.items` relation).
pub struct OwnedItemsLoader {
    pool: PgPool,
    fetches: Arc<AtomicUsize>,
}

impl OwnedItemsLoader {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            fetches: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn fetch_counter(&self) -> Arc<AtomicUsize> {
        self.fetches.clone()
    }
}

impl Loader<UserId> for OwnedItemsLoader {
    type Value = Vec<ItemDBResponse>;
    type Error = Arc<DbError>;

    async fn load(&self, keys: &[UserId]) -> Result<HashMap<UserId, Self::Value>, Self::Error> {
        self.fetches.fetch_add(1, Ordering::SeqCst);

        let items = sqlx::query_as::<_, ItemDBResponse>(
            "SELECT * FROM items WHERE owner_id = ANY($1) ORDER BY created_at DESC",
        )
        .bind(keys)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| Arc::new(DbError::from(e)))?;

        let mut grouped: HashMap<UserId, Vec<ItemDBResponse>> = HashMap::new();
        for item in items {
            grouped.entry(item.owner_id).or_default().push(item);
        }
        Ok(grouped)
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
struct TagLinkRow {
    item_id: ItemId,
    id: crate::types::TagId,
    name: String,
    created_at: DateTime<Utc>,
}

/// Loads the tags assigned to each item (the `Item.tags` relation).
pub struct ItemTagsLoader {
    pool: PgPool,
    fetches: Arc<AtomicUsize>,
}

impl ItemTagsLoader {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            fetches: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn fetch_counter(&self) -> Arc<AtomicUsize> {
        self.fetches.clone()
    }
}

impl Loader<ItemId> for ItemTagsLoader {
    type Value = Vec<TagDBResponse>;
    type Error = Arc<DbError>;

    async fn load(&self, keys: &[ItemId]) -> Result<HashMap<ItemId, Self::Value>, Self::Error> {
        self.fetches.fetch_add(1, Ordering::SeqCst);

        let rows = sqlx::query_as::<_, TagLinkRow>(
            r#"
            SELECT it.item_id, t.id, t.name, t.created_at
            FROM tags t
            JOIN item_tags it ON it.tag_id = t.id
            WHERE it.item_id = ANY($1)
            ORDER BY t.name
            "#,
        )
        .bind(keys)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| Arc::new(DbError::from(e)))?;

        let mut grouped: HashMap<ItemId, Vec<TagDBResponse>> = HashMap::new();
        for row in rows {
            grouped.entry(row.item_id).or_default().push(TagDBResponse {
                id: row.id,
                name: row.name,
                created_at: row.created_at,
            });
        }
        Ok(grouped)
    }
}

/// The full loader set for one request.
pub struct Loaders {
    pub users: DataLoader<UserLoader, HashMapCache>,
    pub items_by_owner: DataLoader<OwnedItemsLoader, HashMapCache>,
    pub tags_by_item: DataLoader<ItemTagsLoader, HashMapCache>,
}

impl Loaders {
    pub fn new(pool: &PgPool) -> Self {
        Self {
            users: DataLoader::with_cache(UserLoader::new(pool.clone()), tokio::spawn, HashMapCache::default()),
            items_by_owner: DataLoader::with_cache(OwnedItemsLoader::new(pool.clone()), tokio::spawn, HashMapCache::default()),
            tags_by_item: DataLoader::with_cache(ItemTagsLoader::new(pool.clone()), tokio::spawn, HashMapCache::default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{create_test_item, create_test_user};
    use futures::future::join_all;
    use sqlx::PgPool;
    use std::time::Duration;

    #[sqlx::test]
    #[test_log::test]
    async fn test_fifty_distinct_keys_issue_one_fetch(pool: PgPool) {
        let mut owner_ids = Vec::new();
        for _ in 0..50 {
            let user = create_test_user(&pool, false).await;
            owner_ids.push(user.id);
        }

        let loader = UserLoader::new(pool.clone());
        let counter = loader.fetch_counter();
        // A wider batching window than the default keeps the assertion exact
        let dataloader = DataLoader::with_cache(loader, tokio::spawn, HashMapCache::default())
            .delay(Duration::from_millis(20));

        let loads = owner_ids.iter().map(|id| dataloader.load_one(*id));
        let results = join_all(loads).await;

        for (id, result) in owner_ids.iter().zip(&results) {
            let user = result.as_ref().unwrap().as_ref().expect("user should resolve");
            assert_eq!(user.id, *id);
        }
        assert_eq!(counter.load(Ordering::SeqCst), 1, "50 keys must coalesce into one query");
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_repeated_key_served_from_cache(pool: PgPool) {
        let user = create_test_user(&pool, false).await;

        let loader = UserLoader::new(pool.clone());
        let counter = loader.fetch_counter();
        let dataloader = DataLoader::with_cache(loader, tokio::spawn, HashMapCache::default());

        let first = dataloader.load_one(user.id).await.unwrap().unwrap();
        let second = dataloader.load_one(user.id).await.unwrap().unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(counter.load(Ordering::SeqCst), 1, "second load must hit the request cache");
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_duplicate_keys_in_one_batch_fetch_once(pool: PgPool) {
        let user = create_test_user(&pool, false).await;

        let loader = UserLoader::new(pool.clone());
        let counter = loader.fetch_counter();
        let dataloader = DataLoader::with_cache(loader, tokio::spawn, HashMapCache::default())
            .delay(Duration::from_millis(20));

        let loads = (0..10).map(|_| dataloader.load_one(user.id));
        let results = join_all(loads).await;

        for result in results {
            assert_eq!(result.unwrap().unwrap().id, user.id);
        }
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_missing_key_resolves_to_none(pool: PgPool) {
        let loader = UserLoader::new(pool.clone());
        let dataloader = DataLoader::with_cache(loader, tokio::spawn, HashMapCache::default());

        let resolved = dataloader.load_one(uuid::Uuid::new_v4()).await.unwrap();
        assert!(resolved.is_none(), "absent rows are not an error");
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_owned_items_grouped_per_user(pool: PgPool) {
        let alice = create_test_user(&pool, false).await;
        let bob = create_test_user(&pool, false).await;
        create_test_item(&pool, alice.id, "lamp").await;
        create_test_item(&pool, alice.id, "globe").await;
        create_test_item(&pool, bob.id, "sextant").await;

        let loader = OwnedItemsLoader::new(pool.clone());
        let counter = loader.fetch_counter();
        let dataloader = DataLoader::with_cache(loader, tokio::spawn, HashMapCache::default())
            .delay(Duration::from_millis(20));

        let (alice_items, bob_items) = tokio::join!(dataloader.load_one(alice.id), dataloader.load_one(bob.id));

        assert_eq!(alice_items.unwrap().unwrap().len(), 2);
        assert_eq!(bob_items.unwrap().unwrap().len(), 1);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }
}
