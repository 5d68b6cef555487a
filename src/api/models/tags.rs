//! API models for tags.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::db::models::tags::TagDBResponse;
use crate::types::TagId;

/// Tag creation payload.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TagCreate {
    pub name: String,
}

/// Tag representation returned by the API.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TagResponse {
    #[schema(value_type = uuid::Uuid)]
    pub id: TagId,
    pub name: String,
}

impl From<TagDBResponse> for TagResponse {
    fn from(tag: TagDBResponse) -> Self {
        Self {
            id: tag.id,
            name: tag.name,
        }
    }
}
