//! Environment listing (v2 API)

use axum::{response::IntoResponse, response::Response, Json};
use indirector_core::Method;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;

use super::AppState;
use crate::api::error::ApiError;
use crate::identity::ClientIdentity;

/// Settings reported per environment
#[derive(Debug, Serialize)]
pub struct EnvironmentSettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

#[derive(Debug, Serialize)]
pub struct EnvironmentEntry {
    pub settings: EnvironmentSettings,
}

/// Response of GET /v2.0/environments
#[derive(Debug, Serialize)]
pub struct ListEnvironmentsResponse {
    pub environments: BTreeMap<String, EnvironmentEntry>,
}

/// List every known environment
///
/// GET /v2.0/environments
pub async fn list(state: &AppState, path: &str, client: &ClientIdentity) -> Result<Response, ApiError> {
    state.authorizer.authorize(Method::Search, path, client)?;

    let environments = state
        .environments
        .list()
        .await
        .into_iter()
        .map(|env| {
            (
                env.name,
                EnvironmentEntry {
                    settings: EnvironmentSettings { path: env.path },
                },
            )
        })
        .collect();

    Ok(Json(ListEnvironmentsResponse { environments }).into_response())
}
