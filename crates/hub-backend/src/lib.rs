//! Scoped client for the managed auth + datastore backend.
//!
//! ## Overview
//!
//! A [`Backend`] is built once at startup from a [`BackendConfig`] and owns
//! the shared transports. For every inbound request the caller builds a
//! cookie adapter for that request and asks for a [`BackendClient`]:
//!
//! ```text
//!   request cookies ──> CookieAdapter ──> create_client(&backend, adapter)
//!                                               │
//!                       ┌───────────────────────┴───────────────┐
//!                       │ client.auth()         client.from("x") │
//!                       │   └─ AuthApi            └─ Datastore   │
//!                       │      (RestAuth |           (RestDatastore |
//!                       │       MemoryAuth)           MemoryDatastore)
//!                       └────────────────────────────────────────┘
//! ```
//!
//! ## Module Map
//!
//! | Module    | Responsibility                                             |
//! |-----------|------------------------------------------------------------|
//! | `config`  | endpoint URL / anon key with placeholder fallbacks          |
//! | `cookies` | adapter traits, guarded `SessionCookies`, `RequestCookies`  |
//! | `session` | `Session` / `User`, cookie encoding and chunking            |
//! | `client`  | `Backend`, `create_client`, `BackendClient`                 |
//! | `auth`    | `AuthApi` trait and the `Auth` sub-interface                |
//! | `query`   | `Query`, `QueryBuilder`, `Datastore` trait                  |
//! | `rest`    | HTTPS transports                                            |
//! | `memory`  | in-process transports                                       |
//!
//! Cookie writes that the current request phase refuses are reported as
//! [`CookieWrite::Skipped`] and logged; they never fail a call.

pub mod auth;
pub mod client;
pub mod config;
pub mod cookies;
pub mod error;
pub mod memory;
pub mod query;
pub mod rest;
pub mod session;

pub use auth::{Auth, AuthApi, OAuthRedirect};
pub use client::{Backend, BackendClient, create_client};
pub use config::BackendConfig;
pub use cookies::{
    Cookie, CookieAdapter, CookieBatch, CookieContext, CookieMethods, CookieOptions, CookieWrite,
    RequestCookies, SameSite, SessionCookies,
};
pub use error::{BackendError, CookieError};
pub use memory::{MemoryAuth, MemoryDatastore};
pub use query::{Datastore, Query, QueryBuilder, QueryResponse};
pub use reqwest::Url;
pub use rest::{RestAuth, RestDatastore};
pub use session::{Session, User};
