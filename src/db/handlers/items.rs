//! Database repository for items and their tag assignments.

use crate::db::{
    errors::{DbError, Result},
    handlers::repository::Repository,
    models::{
        items::{ItemCreateDBRequest, ItemDBResponse, ItemUpdateDBRequest},
        tags::TagDBResponse,
    },
};
use crate::types::{abbrev_uuid, ItemId, TagId, UserId};
use sqlx::PgConnection;
use std::collections::HashMap;
use tracing::instrument;
use uuid::Uuid;

/// Filter for listing items. `owner` scopes the listing to a single user;
/// admins list with `owner: None`.
#[derive(Debug, Clone, Default)]
pub struct ItemFilter {
    pub owner: Option<UserId>,
    pub search: Option<String>,
    pub skip: i64,
    pub limit: i64,
}

impl ItemFilter {
    pub fn new(skip: i64, limit: i64) -> Self {
        Self {
            owner: None,
            search: None,
            skip,
            limit,
        }
    }

    pub fn owned_by(mut self, owner: UserId) -> Self {
        self.owner = Some(owner);
        self
    }

    pub fn search(mut self, term: impl Into<String>) -> Self {
        self.search = Some(term.into());
        self
    }
}

pub struct Items<'c> {
    db: &'c mut PgConnection,
}

#[async_trait::async_trait]
impl<'c> Repository for Items<'c> {
    type CreateRequest = ItemCreateDBRequest;
    type UpdateRequest = ItemUpdateDBRequest;
    type Response = ItemDBResponse;
    type Id = ItemId;
    type Filter = ItemFilter;

    #[instrument(skip(self, request), fields(title = %request.title), err)]
    async fn create(&mut self, request: &Self::CreateRequest) -> Result<Self::Response> {
        let item_id = Uuid::new_v4();

        let item = sqlx::query_as::<_, ItemDBResponse>(
            r#"
            INSERT INTO items (id, title, description, owner_id)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(item_id)
        .bind(&request.title)
        .bind(&request.description)
        .bind(request.owner_id)
        .fetch_one(&mut *self.db)
        .await?;

        Ok(item)
    }

    #[instrument(skip(self), fields(item_id = %abbrev_uuid(&id)), err)]
    async fn get_by_id(&mut self, id: Self::Id) -> Result<Option<Self::Response>> {
        let item = sqlx::query_as::<_, ItemDBResponse>("SELECT * FROM items WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *self.db)
            .await?;

        Ok(item)
    }

    #[instrument(skip(self, ids), fields(count = ids.len()), err)]
    async fn get_bulk(&mut self, ids: Vec<ItemId>) -> Result<HashMap<Self::Id, Self::Response>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        let items = sqlx::query_as::<_, ItemDBResponse>("SELECT * FROM items WHERE id = ANY($1)")
            .bind(&ids)
            .fetch_all(&mut *self.db)
            .await?;

        Ok(items.into_iter().map(|i| (i.id, i)).collect())
    }

    #[instrument(skip(self, filter), fields(limit = filter.limit, skip = filter.skip), err)]
    async fn list(&mut self, filter: &Self::Filter) -> Result<Vec<Self::Response>> {
        let pattern = filter.search.as_ref().map(|s| format!("%{s}%"));
        let items = sqlx::query_as::<_, ItemDBResponse>(
            r#"
            SELECT * FROM items
            WHERE ($1::uuid IS NULL OR owner_id = $1)
              AND ($2::text IS NULL OR title ILIKE $2 OR description ILIKE $2)
            ORDER BY created_at DESC
            LIMIT $3 OFFSET $4
            "#,
        )
        .bind(filter.owner)
        .bind(pattern)
        .bind(filter.limit)
        .bind(filter.skip)
        .fetch_all(&mut *self.db)
        .await?;

        Ok(items)
    }

    #[instrument(skip(self), fields(item_id = %abbrev_uuid(&id)), err)]
    async fn delete(&mut self, id: Self::Id) -> Result<bool> {
        // item_tags rows cascade with the item; tags themselves stay.
        let result = sqlx::query("DELETE FROM items WHERE id = $1")
            .bind(id)
            .execute(&mut *self.db)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self, request), fields(item_id = %abbrev_uuid(&id)), err)]
    async fn update(&mut self, id: Self::Id, request: &Self::UpdateRequest) -> Result<Self::Response> {
        let item = sqlx::query_as::<_, ItemDBResponse>(
            r#"
            UPDATE items SET
                title = COALESCE($2, title),
                description = COALESCE($3, description),
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(&request.title)
        .bind(&request.description)
        .fetch_optional(&mut *self.db)
        .await?
        .ok_or(DbError::NotFound)?;

        Ok(item)
    }
}

impl<'c> Items<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    /// Count items visible under the given filter (pagination totals).
    #[instrument(skip(self, filter), err)]
    pub async fn count(&mut self, filter: &ItemFilter) -> Result<i64> {
        let pattern = filter.search.as_ref().map(|s| format!("%{s}%"));
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM items
            WHERE ($1::uuid IS NULL OR owner_id = $1)
              AND ($2::text IS NULL OR title ILIKE $2 OR description ILIKE $2)
            "#,
        )
        .bind(filter.owner)
        .bind(pattern)
        .fetch_one(&mut *self.db)
        .await?;

        Ok(count)
    }

    /// Assign a tag to an item. Idempotent: assigning twice is not an error.
    #[instrument(skip(self), fields(item_id = %abbrev_uuid(&item_id), tag_id = %abbrev_uuid(&tag_id)), err)]
    pub async fn assign_tag(&mut self, item_id: ItemId, tag_id: TagId) -> Result<()> {
        sqlx::query(
            "INSERT INTO item_tags (item_id, tag_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
        )
        .bind(item_id)
        .bind(tag_id)
        .execute(&mut *self.db)
        .await?;

        Ok(())
    }

    /// Remove a tag assignment from an item. The tag row is untouched.
    #[instrument(skip(self), fields(item_id = %abbrev_uuid(&item_id), tag_id = %abbrev_uuid(&tag_id)), err)]
    pub async fn unassign_tag(&mut self, item_id: ItemId, tag_id: TagId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM item_tags WHERE item_id = $1 AND tag_id = $2")
            .bind(item_id)
            .bind(tag_id)
            .execute(&mut *self.db)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Tags assigned to one item.
    #[instrument(skip(self), fields(item_id = %abbrev_uuid(&item_id)), err)]
    pub async fn tags_for_item(&mut self, item_id: ItemId) -> Result<Vec<TagDBResponse>> {
        let tags = sqlx::query_as::<_, TagDBResponse>(
            r#"
            SELECT t.* FROM tags t
            JOIN item_tags it ON it.tag_id = t.id
            WHERE it.item_id = $1
            ORDER BY t.name
            "#,
        )
        .bind(item_id)
        .fetch_all(&mut *self.db)
        .await?;

        Ok(tags)
    }

    /// Count remaining join rows for an item (cascade verification).
    pub async fn tag_link_count(&mut self, item_id: ItemId) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM item_tags WHERE item_id = $1")
            .bind(item_id)
            .fetch_one(&mut *self.db)
            .await?;

        Ok(count)
    }
}
