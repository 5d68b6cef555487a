//! GraphQL schema: the query root and its resolvers.
//!
//! Authorization decisions inside resolvers go through the same
//! [`gate`](crate::auth::gate) as the REST handlers; denials surface as
//! top-level errors in the standard `{data, errors}` envelope.

use async_graphql::{Context, EmptyMutation, EmptySubscription, Error as GqlError, Object, Result as GqlResult, Schema};
use sqlx::PgPool;

use crate::{
    auth::{gate, Principal},
    config::Config,
    db::handlers::{items::ItemFilter, Items, Repository, Users},
    errors::Error,
    graphql::{
        guard::{QueryLimits, QuerySafetyGuard},
        types::{ItemType, UserType},
    },
    types::{ItemId, UserId},
};

pub type CurioSchema = Schema<QueryRoot, EmptyMutation, EmptySubscription>;

/// Build the schema with the safety guard installed. The connection pool is
/// schema data (shared, immutable); principal and loaders are per-request.
pub fn build_schema(config: &Config, pool: PgPool) -> CurioSchema {
    Schema::build(QueryRoot, EmptyMutation, EmptySubscription)
        .data(pool)
        .extension(QuerySafetyGuard::new(QueryLimits {
            max_depth: config.graphql.max_depth,
            max_tokens: config.graphql.max_tokens,
        }))
        .finish()
}

/// Map a service error onto the GraphQL envelope without leaking internals.
fn to_gql_error(err: Error) -> GqlError {
    GqlError::new(err.user_message())
}

fn principal<'a>(ctx: &Context<'a>) -> GqlResult<&'a Principal> {
    ctx.data_opt::<Principal>()
        .ok_or_else(|| to_gql_error(Error::Unauthenticated { message: None }))
}

pub struct QueryRoot;

#[Object]
impl QueryRoot {
    /// Items visible to the caller, with optional search and pagination.
    /// Admins see every item; everyone else sees only their own.
    async fn items(
        &self,
        ctx: &Context<'_>,
        #[graphql(default = 0)] skip: i64,
        #[graphql(default = 100)] limit: i64,
        search: Option<String>,
    ) -> GqlResult<Vec<ItemType>> {
        let principal = principal(ctx)?;
        gate::require_active(principal, "list", "items").map_err(to_gql_error)?;

        let filter = visible_items_filter(principal, skip, limit.min(1000), search);

        let pool = ctx.data_unchecked::<PgPool>();
        let mut conn = pool.acquire().await.map_err(|e| to_gql_error(Error::Database(e.into())))?;
        let mut items = Items::new(&mut conn);
        let rows = items.list(&filter).await.map_err(|e| to_gql_error(e.into()))?;

        Ok(rows.into_iter().map(ItemType::from).collect())
    }

    /// Total number of items visible to the caller (for pagination).
    async fn items_count(&self, ctx: &Context<'_>, search: Option<String>) -> GqlResult<i64> {
        let principal = principal(ctx)?;
        gate::require_active(principal, "count", "items").map_err(to_gql_error)?;

        let filter = visible_items_filter(principal, 0, 0, search);

        let pool = ctx.data_unchecked::<PgPool>();
        let mut conn = pool.acquire().await.map_err(|e| to_gql_error(Error::Database(e.into())))?;
        let mut items = Items::new(&mut conn);
        items.count(&filter).await.map_err(|e| to_gql_error(e.into()))
    }

    /// A single item by ID. Requires ownership or an admin role.
    async fn item(&self, ctx: &Context<'_>, id: ItemId) -> GqlResult<Option<ItemType>> {
        let principal = principal(ctx)?;

        let pool = ctx.data_unchecked::<PgPool>();
        let mut conn = pool.acquire().await.map_err(|e| to_gql_error(Error::Database(e.into())))?;
        let mut items = Items::new(&mut conn);

        let Some(item) = items.get_by_id(id).await.map_err(|e| to_gql_error(e.into()))? else {
            return Ok(None);
        };

        gate::authorize(principal, &item, "read", "item").map_err(to_gql_error)?;
        Ok(Some(ItemType::from(item)))
    }

    /// All users (admin only).
    async fn users(
        &self,
        ctx: &Context<'_>,
        #[graphql(default = 0)] skip: i64,
        #[graphql(default = 100)] limit: i64,
    ) -> GqlResult<Vec<UserType>> {
        let principal = principal(ctx)?;
        gate::require_admin(principal, "list", "users").map_err(to_gql_error)?;

        let pool = ctx.data_unchecked::<PgPool>();
        let mut conn = pool.acquire().await.map_err(|e| to_gql_error(Error::Database(e.into())))?;
        let mut users = Users::new(&mut conn);
        let rows = users
            .list(&crate::db::handlers::users::UserFilter::new(skip, limit.min(1000)))
            .await
            .map_err(|e| to_gql_error(e.into()))?;

        Ok(rows.into_iter().map(UserType::from).collect())
    }

    /// A single user by ID: self, or any user for admins.
    async fn user(&self, ctx: &Context<'_>, id: UserId) -> GqlResult<Option<UserType>> {
        let principal = principal(ctx)?;

        let pool = ctx.data_unchecked::<PgPool>();
        let mut conn = pool.acquire().await.map_err(|e| to_gql_error(Error::Database(e.into())))?;
        let mut users = Users::new(&mut conn);

        let Some(user) = users.get_by_id(id).await.map_err(|e| to_gql_error(e.into()))? else {
            return Ok(None);
        };

        gate::authorize(principal, &user, "read", "user").map_err(to_gql_error)?;
        Ok(Some(UserType::from(user)))
    }

    /// The current authenticated user, if any.
    async fn me(&self, ctx: &Context<'_>) -> GqlResult<Option<UserType>> {
        let Some(principal) = ctx.data_opt::<Principal>() else {
            return Ok(None);
        };

        let loaders = ctx.data_unchecked::<crate::graphql::loaders::Loaders>();
        let user = loaders.users.load_one(principal.user_id).await?;
        Ok(user.map(UserType::from))
    }
}

fn visible_items_filter(principal: &Principal, skip: i64, limit: i64, search: Option<String>) -> ItemFilter {
    let mut filter = ItemFilter {
        owner: (!principal.is_admin).then_some(principal.user_id),
        search: None,
        skip,
        limit,
    };
    if let Some(term) = search {
        filter = filter.search(term);
    }
    filter
}
