//! REST handlers for items and their tag assignments.

use crate::{
    api::models::{
        items::{ItemCreate, ItemResponse, ItemUpdate, ItemsResponse, ListItemsQuery},
        tags::TagResponse,
    },
    auth::{gate, Principal},
    db::{
        errors::DbError,
        handlers::{items::ItemFilter, Items, Repository, Tags},
        models::items::{ItemCreateDBRequest, ItemDBResponse, ItemUpdateDBRequest},
    },
    errors::Error,
    types::{ItemId, TagId},
    AppState,
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};

/// Fetch an item or map its absence onto 404.
async fn fetch_item(items: &mut Items<'_>, id: ItemId) -> Result<ItemDBResponse, Error> {
    items.get_by_id(id).await?.ok_or_else(|| Error::NotFound {
        resource: "Item".to_string(),
        id: id.to_string(),
    })
}

// GET /items - List items visible to the caller
#[utoipa::path(
    get,
    path = "/items",
    tag = "items",
    summary = "List items",
    description = "List items owned by the caller; admins see every item",
    params(ListItemsQuery),
    responses(
        (status = 200, description = "List of items", body = ItemsResponse),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden - inactive account"),
    ),
)]
pub async fn list_items(
    State(state): State<AppState>,
    principal: Principal,
    Query(query): Query<ListItemsQuery>,
) -> Result<Json<ItemsResponse>, Error> {
    gate::require_active(&principal, "list", "items")?;

    let skip = query.skip.unwrap_or(0);
    let limit = query.limit.unwrap_or(100).min(1000);
    let mut filter = ItemFilter {
        owner: (!principal.is_admin).then_some(principal.user_id),
        search: None,
        skip,
        limit,
    };
    if let Some(term) = query.search {
        filter = filter.search(term);
    }

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut items = Items::new(&mut conn);

    let data = items.list(&filter).await?;
    let count = items.count(&filter).await?;

    Ok(Json(ItemsResponse {
        data: data.into_iter().map(ItemResponse::from).collect(),
        count,
    }))
}

// POST /items - Create an item owned by the caller
#[utoipa::path(
    post,
    path = "/items",
    tag = "items",
    summary = "Create item",
    responses(
        (status = 201, description = "Item created", body = ItemResponse),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden - inactive account"),
    ),
)]
pub async fn create_item(
    State(state): State<AppState>,
    principal: Principal,
    Json(payload): Json<ItemCreate>,
) -> Result<(StatusCode, Json<ItemResponse>), Error> {
    gate::require_active(&principal, "create", "item")?;

    if payload.title.trim().is_empty() {
        return Err(Error::BadRequest {
            message: "Item title cannot be empty".to_string(),
        });
    }

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut items = Items::new(&mut conn);

    let item = items
        .create(&ItemCreateDBRequest {
            title: payload.title,
            description: payload.description,
            owner_id: principal.user_id,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(ItemResponse::from(item))))
}

// GET /items/{id} - Get a single item
#[utoipa::path(
    get,
    path = "/items/{id}",
    tag = "items",
    summary = "Get item",
    params(("id" = uuid::Uuid, Path, description = "Item ID")),
    responses(
        (status = 200, description = "Item", body = ItemResponse),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden - not the owner"),
        (status = 404, description = "Item not found"),
    ),
)]
pub async fn get_item(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<ItemId>,
) -> Result<Json<ItemResponse>, Error> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut items = Items::new(&mut conn);

    let item = fetch_item(&mut items, id).await?;
    gate::authorize(&principal, &item, "read", "item")?;

    Ok(Json(ItemResponse::from(item)))
}

// PUT /items/{id} - Update an item
#[utoipa::path(
    put,
    path = "/items/{id}",
    tag = "items",
    summary = "Update item",
    params(("id" = uuid::Uuid, Path, description = "Item ID")),
    responses(
        (status = 200, description = "Item updated", body = ItemResponse),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden - not the owner"),
        (status = 404, description = "Item not found"),
    ),
)]
pub async fn update_item(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<ItemId>,
    Json(payload): Json<ItemUpdate>,
) -> Result<Json<ItemResponse>, Error> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut items = Items::new(&mut conn);

    let item = fetch_item(&mut items, id).await?;
    gate::authorize(&principal, &item, "update", "item")?;

    let updated = items
        .update(
            id,
            &ItemUpdateDBRequest {
                title: payload.title,
                description: payload.description,
            },
        )
        .await?;

    Ok(Json(ItemResponse::from(updated)))
}

// DELETE /items/{id} - Delete an item
#[utoipa::path(
    delete,
    path = "/items/{id}",
    tag = "items",
    summary = "Delete item",
    description = "Delete an item. Its tag assignments are removed by the schema; tags are untouched.",
    params(("id" = uuid::Uuid, Path, description = "Item ID")),
    responses(
        (status = 204, description = "Item deleted"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden - not the owner"),
        (status = 404, description = "Item not found"),
    ),
)]
pub async fn delete_item(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<ItemId>,
) -> Result<StatusCode, Error> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut items = Items::new(&mut conn);

    let item = fetch_item(&mut items, id).await?;
    gate::authorize(&principal, &item, "delete", "item")?;

    match items.delete(id).await {
        Ok(_) => Ok(StatusCode::NO_CONTENT),
        // The join-table cascade makes this unreachable; seeing it means the
        // schema no longer declares the cascade.
        Err(DbError::ForeignKeyViolation { message, .. }) => Err(Error::IntegrityViolation {
            detail: format!("item delete left dependent rows behind: {message}"),
        }),
        Err(e) => Err(e.into()),
    }
}

// GET /items/{id}/tags - Tags assigned to an item
#[utoipa::path(
    get,
    path = "/items/{id}/tags",
    tag = "items",
    summary = "List item tags",
    params(("id" = uuid::Uuid, Path, description = "Item ID")),
    responses(
        (status = 200, description = "Tags assigned to the item", body = [TagResponse]),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden - not the owner"),
        (status = 404, description = "Item not found"),
    ),
)]
pub async fn list_item_tags(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<ItemId>,
) -> Result<Json<Vec<TagResponse>>, Error> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut items = Items::new(&mut conn);

    let item = fetch_item(&mut items, id).await?;
    gate::authorize(&principal, &item, "read", "item")?;

    let tags = items.tags_for_item(id).await?;
    Ok(Json(tags.into_iter().map(TagResponse::from).collect()))
}

// PUT /items/{id}/tags/{tag_id} - Assign a tag to an item
#[utoipa::path(
    put,
    path = "/items/{id}/tags/{tag_id}",
    tag = "items",
    summary = "Assign tag",
    params(
        ("id" = uuid::Uuid, Path, description = "Item ID"),
        ("tag_id" = uuid::Uuid, Path, description = "Tag ID"),
    ),
    responses(
        (status = 204, description = "Tag assigned"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden - not the owner"),
        (status = 404, description = "Item or tag not found"),
    ),
)]
pub async fn assign_tag(
    State(state): State<AppState>,
    principal: Principal,
    Path((id, tag_id)): Path<(ItemId, TagId)>,
) -> Result<StatusCode, Error> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;

    {
        let mut tags = Tags::new(&mut conn);
        tags.get_by_id(tag_id).await?.ok_or_else(|| Error::NotFound {
            resource: "Tag".to_string(),
            id: tag_id.to_string(),
        })?;
    }

    let mut items = Items::new(&mut conn);
    let item = fetch_item(&mut items, id).await?;
    gate::authorize(&principal, &item, "update", "item")?;

    items.assign_tag(id, tag_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// DELETE /items/{id}/tags/{tag_id} - Remove a tag assignment
#[utoipa::path(
    delete,
    path = "/items/{id}/tags/{tag_id}",
    tag = "items",
    summary = "Unassign tag",
    params(
        ("id" = uuid::Uuid, Path, description = "Item ID"),
        ("tag_id" = uuid::Uuid, Path, description = "Tag ID"),
    ),
    responses(
        (status = 204, description = "Tag unassigned"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden - not the owner"),
        (status = 404, description = "Item not found or tag not assigned"),
    ),
)]
pub async fn unassign_tag(
    State(state): State<AppState>,
    principal: Principal,
    Path((id, tag_id)): Path<(ItemId, TagId)>,
) -> Result<StatusCode, Error> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut items = Items::new(&mut conn);

    let item = fetch_item(&mut items, id).await?;
    gate::authorize(&principal, &item, "update", "item")?;

    if items.unassign_tag(id, tag_id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(Error::NotFound {
            resource: "Tag assignment".to_string(),
            id: tag_id.to_string(),
        })
    }
}
