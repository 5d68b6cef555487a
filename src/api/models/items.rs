//! API models for items.

use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::db::models::items::ItemDBResponse;
use crate::types::{ItemId, UserId};

/// Item creation payload. The owner is always the authenticated caller.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ItemCreate {
    pub title: String,
    pub description: Option<String>,
}

/// Partial update for an item.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct ItemUpdate {
    pub title: Option<String>,
    pub description: Option<String>,
}

/// Item representation returned by the API.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ItemResponse {
    #[schema(value_type = uuid::Uuid)]
    pub id: ItemId,
    pub title: String,
    pub description: Option<String>,
    #[schema(value_type = uuid::Uuid)]
    pub owner_id: UserId,
}

impl From<ItemDBResponse> for ItemResponse {
    fn from(item: ItemDBResponse) -> Self {
        Self {
            id: item.id,
            title: item.title,
            description: item.description,
            owner_id: item.owner_id,
        }
    }
}

/// Paginated list of items.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ItemsResponse {
    pub data: Vec<ItemResponse>,
    pub count: i64,
}

/// Pagination and search parameters for item listings.
#[derive(Debug, Clone, Deserialize, IntoParams)]
pub struct ListItemsQuery {
    pub skip: Option<i64>,
    pub limit: Option<i64>,
    pub search: Option<String>,
}
