//! Database models for items.

use crate::types::{ItemId, UserId};
use chrono::{DateTime, Utc};

/// Database request for creating a new item
#[derive(Debug, Clone)]
pub struct ItemCreateDBRequest {
    pub title: String,
    pub description: Option<String>,
    pub owner_id: UserId,
}

/// Database request for updating an item
#[derive(Debug, Clone, Default)]
pub struct ItemUpdateDBRequest {
    pub title: Option<String>,
    pub description: Option<String>,
}

/// Database response for an item
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ItemDBResponse {
    pub id: ItemId,
    pub title: String,
    pub description: Option<String>,
    pub owner_id: UserId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
