//! GraphQL object types and their relation fields.
//!
//! Relation fields never query the store directly: they go through the
//! request's [`Loaders`](crate::graphql::loaders::Loaders), so resolving the
//! same relation across a list of parents costs one batched query.

use async_graphql::{ComplexObject, Context, Error as GqlError, Result as GqlResult, SimpleObject};
use chrono::{DateTime, Utc};

use crate::db::models::{items::ItemDBResponse, tags::TagDBResponse, users::UserDBResponse};
use crate::graphql::loaders::Loaders;
use crate::types::{ItemId, TagId, UserId};

/// GraphQL representation of a user.
#[derive(Debug, Clone, SimpleObject)]
#[graphql(complex, name = "User")]
pub struct UserType {
    pub id: UserId,
    pub email: String,
    pub username: Option<String>,
    pub full_name: Option<String>,
    pub is_active: bool,
    pub is_admin: bool,
    pub created_at: DateTime<Utc>,
    pub last_login: DateTime<Utc>,
}

#[ComplexObject]
impl UserType {
    /// Items owned by this user, batched per request.
    async fn items(&self, ctx: &Context<'_>) -> GqlResult<Vec<ItemType>> {
        let loaders = ctx.data_unchecked::<Loaders>();
        let items = loaders.items_by_owner.load_one(self.id).await?.unwrap_or_default();
        Ok(items.into_iter().map(ItemType::from).collect())
    }
}

impl From<UserDBResponse> for UserType {
    fn from(user: UserDBResponse) -> Self {
        Self {
            id: user.id,
            email: user.email,
            username: user.username,
            full_name: user.full_name,
            is_active: user.is_active,
            is_admin: user.is_admin,
            created_at: user.created_at,
            last_login: user.last_login,
        }
    }
}

/// GraphQL representation of an item.
#[derive(Debug, Clone, SimpleObject)]
#[graphql(complex, name = "Item")]
pub struct ItemType {
    pub id: ItemId,
    pub title: String,
    pub description: Option<String>,
    pub owner_id: UserId,
}

#[ComplexObject]
impl ItemType {
    /// The owning user, batched per request.
    async fn owner(&self, ctx: &Context<'_>) -> GqlResult<UserType> {
        let loaders = ctx.data_unchecked::<Loaders>();
        let user = loaders
            .users
            .load_one(self.owner_id)
            .await?
            .ok_or_else(|| GqlError::new("Owner not found"))?;
        Ok(UserType::from(user))
    }

    /// Tags assigned to this item, batched per request.
    async fn tags(&self, ctx: &Context<'_>) -> GqlResult<Vec<TagType>> {
        let loaders = ctx.data_unchecked::<Loaders>();
        let tags = loaders.tags_by_item.load_one(self.id).await?.unwrap_or_default();
        Ok(tags.into_iter().map(TagType::from).collect())
    }
}

impl From<ItemDBResponse> for ItemType {
    fn from(item: ItemDBResponse) -> Self {
        Self {
            id: item.id,
            title: item.title,
            description: item.description,
            owner_id: item.owner_id,
        }
    }
}

/// GraphQL representation of a tag.
#[derive(Debug, Clone, SimpleObject)]
#[graphql(name = "Tag")]
pub struct TagType {
    pub id: TagId,
    pub name: String,
}

impl From<TagDBResponse> for TagType {
    fn from(tag: TagDBResponse) -> Self {
        Self {
            id: tag.id,
            name: tag.name,
        }
    }
}
