//! API request handlers

pub mod environments;
pub mod indirected;

use axum::{
    body::Bytes,
    extract::{ConnectInfo, State},
    http::{HeaderMap, Method as Verb, Uri},
    response::Response,
};
use indirector_core::settings::ClientIdentityConfig;
use indirector_core::{unescape_segment, PluralizationRules, Registry, Result, Settings};
use indirector_termini::builtin_factories;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;

use crate::api::error::ApiError;
use crate::api::routes::{self, Route};
use crate::auth::{Authorizer, RuleAuthorizer};
use crate::environments::{loader_for, EnvironmentLoader};
use crate::identity::ClientIdentity;

/// Application state shared across handlers
pub struct AppState {
    /// Every registered indirection
    pub registry: Arc<Registry>,
    /// Checked before any terminus is touched
    pub authorizer: Arc<dyn Authorizer>,
    pub environments: Arc<dyn EnvironmentLoader>,
    /// Plural URL names
    pub rules: PluralizationRules,
    /// Headers carrying the verified client certificate
    pub client_identity: ClientIdentityConfig,
}

impl AppState {
    /// State for the standard models with the built-in termini
    ///
    /// Without configured auth rules the standard rule set applies.
    pub fn from_settings(settings: Settings) -> Result<Self> {
        let authorizer = if settings.auth.is_empty() {
            RuleAuthorizer::standard()?
        } else {
            RuleAuthorizer::from_config(&settings.auth)?
        };
        let environments = loader_for(&settings);
        let client_identity = settings.client_identity.clone();
        let registry = Registry::with_standard_indirections(Arc::new(settings), builtin_factories())?;

        info!(
            indirections = registry.names().len(),
            auth_rules = authorizer.len(),
            "Application state ready"
        );

        Ok(Self {
            registry: Arc::new(registry),
            authorizer: Arc::new(authorizer),
            environments,
            rules: PluralizationRules::default(),
            client_identity,
        })
    }
}

/// Query pairs, plus form or JSON body pairs for POST
fn request_pairs(verb: &Verb, uri: &Uri, headers: &HeaderMap, body: &Bytes) -> Result<Vec<(String, String)>> {
    let mut pairs: Vec<(String, String)> = uri
        .query()
        .map(|q| url::form_urlencoded::parse(q.as_bytes()).into_owned().collect())
        .unwrap_or_default();

    if verb == Verb::POST && !body.is_empty() {
        let content_type = headers
            .get(axum::http::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");
        if content_type.starts_with("application/json") {
            let value: serde_json::Value = serde_json::from_slice(body).map_err(|e| {
                indirector_core::IndirectorError::Validation(format!("Could not parse body: {}", e))
            })?;
            if let serde_json::Value::Object(map) = value {
                for (k, v) in map {
                    let v = match v {
                        serde_json::Value::String(s) => s,
                        other => other.to_string(),
                    };
                    pairs.push((k, v));
                }
            }
        } else {
            pairs.extend(url::form_urlencoded::parse(body).into_owned());
        }
    }
    Ok(pairs)
}

/// Entry point for every request that is not a fixed route
pub async fn dispatch(
    State(state): State<Arc<AppState>>,
    connect: Option<ConnectInfo<SocketAddr>>,
    verb: Verb,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> std::result::Result<Response, ApiError> {
    let ip = connect.map(|ConnectInfo(addr)| addr.ip());
    let client = ClientIdentity::from_headers(&headers, &state.client_identity, ip);

    let pairs = request_pairs(&verb, &uri, &headers, &body)?;
    let route = routes::parse(&verb, uri.path(), pairs, &state.rules)?;

    // Auth rules see the path as clients named it, with escapes decoded
    let path = unescape_segment(uri.path())?;

    match route {
        Route::Environments => environments::list(&state, &path, &client).await,
        Route::Indirected(route) => {
            indirected::handle(&state, route, &path, &client, &headers, body).await
        }
    }
}
