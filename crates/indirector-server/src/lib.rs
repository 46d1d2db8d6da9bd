//! Indirector Server
//!
//! Exposes registered indirections over HTTP. Every request is parsed,
//! authorized, scoped to an environment and content-negotiated before the
//! indirection is called.
//!
//! ## URL grammars
//!
//! - `GET /health` - Liveness check
//! - `/{category}/v3/{indirection}/{key}?environment=...` - v3; category is
//!   `puppet-ca` for certificate authority models, `puppet` otherwise
//! - `GET /v2.0/environments` - Known environments
//! - `/{environment}/{indirection}/{key}` - legacy v1
//!
//! ## Verbs
//!
//! | Verb | Operation |
//! |------|-----------|
//! | GET | find, or search for plural names |
//! | POST | find, body merged into the options |
//! | PUT | save |
//! | DELETE | destroy |
//! | HEAD | head |

pub mod api;
pub mod auth;
pub mod environments;
pub mod identity;

pub use api::create_router;
pub use api::error::ApiError;
pub use api::handlers::AppState;
pub use auth::{AllowAll, Authorizer, RuleAuthorizer};
pub use environments::{DirectoryEnvironments, Environment, EnvironmentLoader, StaticEnvironments};
pub use identity::ClientIdentity;
