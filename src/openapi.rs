//! OpenAPI documentation for the REST surface.

use utoipa::OpenApi;

use crate::api::models::{
    items::{ItemCreate, ItemResponse, ItemUpdate, ItemsResponse},
    tags::{TagCreate, TagResponse},
    users::{UserResponse, UserUpdate, UsersResponse},
};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "curio",
        description = "Item catalog API with proxy/JWT authentication and ownership-based authorization"
    ),
    paths(
        crate::api::handlers::items::list_items,
        crate::api::handlers::items::create_item,
        crate::api::handlers::items::get_item,
        crate::api::handlers::items::update_item,
        crate::api::handlers::items::delete_item,
        crate::api::handlers::items::list_item_tags,
        crate::api::handlers::items::assign_tag,
        crate::api::handlers::items::unassign_tag,
        crate::api::handlers::tags::list_tags,
        crate::api::handlers::tags::create_tag,
        crate::api::handlers::tags::delete_tag,
        crate::api::handlers::users::list_users,
        crate::api::handlers::users::me,
        crate::api::handlers::users::get_user,
        crate::api::handlers::users::update_user,
        crate::api::handlers::users::delete_user,
    ),
    components(schemas(
        ItemCreate,
        ItemUpdate,
        ItemResponse,
        ItemsResponse,
        TagCreate,
        TagResponse,
        UserResponse,
        UserUpdate,
        UsersResponse,
    )),
    tags(
        (name = "items", description = "Item management"),
        (name = "tags", description = "Tag management"),
        (name = "users", description = "User management"),
    )
)]
pub struct ApiDoc;
