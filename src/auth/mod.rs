//! Authentication and authorization.
//!
//! Every inbound request - REST or GraphQL - passes through the same chain:
//! the resolver turns raw credentials into a [`principal::Principal`] (or
//! `Unauthenticated`), provisioning upserts first-seen external identities,
//! and the gate decides whether the principal may act on a resource.
//!
//! # Credential sources
//!
//! Three sources are supported, selected by `auth.mode` in the configuration:
//!
//! 1. **Bearer JWT** - `Authorization: Bearer <token>`, HS256-signed with the
//!    shared `secret_key`, subject claim carrying the user id.
//! 2. **Forwarded headers** - a fixed allow-list of identity headers set by a
//!    trusted reverse proxy (oauth2-proxy style). Only valid immediately
//!    behind that proxy hop.
//! 3. **Local fallback** - a fixed development identity used when no
//!    credentials are present, permitted only in the `local` environment.
//!
//! Hybrid mode tries the JWT first and falls back to forwarded headers.
//!
//! # Separation of resolution and authorization
//!
//! The resolver never rejects an inactive account: "who is this" and "may
//! they act" are separate questions, and the [`gate`] answers the second one
//! first thing, for both transports, from one implementation.
//!
//! # Modules
//!
//! - [`principal`]: the request-scoped identity type
//! - [`resolver`]: credential extraction and mode dispatch
//! - [`provisioning`]: first-login upsert for external identities
//! - [`gate`]: ownership/role access decisions
//! - [`token`]: JWT creation and verification
//! - [`password`]: Argon2 password hashing

pub mod gate;
pub mod password;
pub mod principal;
pub mod provisioning;
pub mod resolver;
pub mod token;

pub use principal::{AuthMethod, Principal};
