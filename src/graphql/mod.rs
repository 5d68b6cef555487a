//! GraphQL transport.
//!
//! A single POST endpoint accepting `{query, variables, operationName}` and
//! returning the standard `{data, errors}` envelope. Before execution the
//! request passes the same principal resolution as REST; the document then
//! passes the [`guard`] before any resolver runs. Each request gets its own
//! [`loaders::Loaders`] set for batched relation resolution.
//!
//! - [`guard`]: static pre-execution depth/size analysis
//! - [`loaders`]: per-request batched relation loaders
//! - [`schema`]: query root and resolvers
//! - [`types`]: GraphQL object types

pub mod guard;
pub mod loaders;
pub mod schema;
pub mod types;

pub use schema::{build_schema, CurioSchema};

use async_graphql_axum::{GraphQLRequest, GraphQLResponse};
use axum::extract::State;

use crate::{auth::Principal, graphql::loaders::Loaders, AppState};

/// Execute a GraphQL request.
///
/// The principal is optional here: unauthenticated documents still execute,
/// and resolvers that need an identity surface `Unauthenticated` as a
/// top-level error. Infrastructure failures during resolution reject the
/// request before execution.
pub async fn graphql_handler(
    State(state): State<AppState>,
    principal: Option<Principal>,
    request: GraphQLRequest,
) -> GraphQLResponse {
    let mut request = request.into_inner().data(Loaders::new(&state.db));
    if let Some(principal) = principal {
        request = request.data(principal);
    }

    state.schema.execute(request).await.into()
}
