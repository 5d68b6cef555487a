//! REST API layer.
//!
//! Handlers extract the [`Principal`](crate::auth::Principal) via the shared
//! resolver and consult the same authorization gate as the GraphQL
//! resolvers.

pub mod handlers;
pub mod models;
