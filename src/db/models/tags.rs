//! Database models for tags.

use crate::types::TagId;
use chrono::{DateTime, Utc};

/// Database request for creating a new tag
#[derive(Debug, Clone)]
pub struct TagCreateDBRequest {
    pub name: String,
}

/// Database response for a tag
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct TagDBResponse {
    pub id: TagId,
    pub name: String,
    pub created_at: DateTime<Utc>,
}
