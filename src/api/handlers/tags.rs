//! REST handlers for tags.
//!
//! Tags are shared entities: any active user may create and list them, but
//! deleting one (which unassigns it everywhere) is an admin action.

use crate::{
    api::models::tags::{TagCreate, TagResponse},
    auth::{gate, Principal},
    db::{
        handlers::{tags::TagFilter, Repository, Tags},
        models::tags::TagCreateDBRequest,
    },
    errors::Error,
    types::TagId,
    AppState,
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};

// GET /tags - List tags
#[utoipa::path(
    get,
    path = "/tags",
    tag = "tags",
    summary = "List tags",
    responses(
        (status = 200, description = "All tags", body = [TagResponse]),
        (status = 401, description = "Unauthorized"),
    ),
)]
pub async fn list_tags(State(state): State<AppState>, principal: Principal) -> Result<Json<Vec<TagResponse>>, Error> {
    gate::require_active(&principal, "list", "tags")?;

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut tags = Tags::new(&mut conn);

    let data = tags.list(&TagFilter::new(0, 1000)).await?;
    Ok(Json(data.into_iter().map(TagResponse::from).collect()))
}

// POST /tags - Create a tag
#[utoipa::path(
    post,
    path = "/tags",
    tag = "tags",
    summary = "Create tag",
    responses(
        (status = 201, description = "Tag created", body = TagResponse),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden - inactive account"),
        (status = 409, description = "Tag name already exists"),
    ),
)]
pub async fn create_tag(
    State(state): State<AppState>,
    principal: Principal,
    Json(payload): Json<TagCreate>,
) -> Result<(StatusCode, Json<TagResponse>), Error> {
    gate::require_active(&principal, "create", "tag")?;

    let name = payload.name.trim().to_string();
    if name.is_empty() {
        return Err(Error::BadRequest {
            message: "Tag name cannot be empty".to_string(),
        });
    }

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut tags = Tags::new(&mut conn);

    let tag = tags.create(&TagCreateDBRequest { name }).await?;
    Ok((StatusCode::CREATED, Json(TagResponse::from(tag))))
}

// DELETE /tags/{id} - Delete a tag (admin only)
#[utoipa::path(
    delete,
    path = "/tags/{id}",
    tag = "tags",
    summary = "Delete tag",
    description = "Delete a tag. Its assignments are removed everywhere; items are untouched.",
    params(("id" = uuid::Uuid, Path, description = "Tag ID")),
    responses(
        (status = 204, description = "Tag deleted"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden - admin access required"),
        (status = 404, description = "Tag not found"),
    ),
)]
pub async fn delete_tag(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<TagId>,
) -> Result<StatusCode, Error> {
    gate::require_admin(&principal, "delete", "tag")?;

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut tags = Tags::new(&mut conn);

    if tags.delete(id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(Error::NotFound {
            resource: "Tag".to_string(),
            id: id.to_string(),
        })
    }
}
