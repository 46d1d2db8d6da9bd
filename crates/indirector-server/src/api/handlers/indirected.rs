//! Indirected request handler
//!
//! Checks run in one order for every API version: syntax (done by the
//! router), authorization, indirection lookup and remote access, environment
//! resolution, then content negotiation. Only then is the indirection called.

use axum::{
    body::{Body, Bytes},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use indirector_core::{
    Format, IndirectorError, Indirection, Instance, Method, Outcome, Request,
};
use serde_json::Value;
use tracing::{debug, info};

use super::AppState;
use crate::api::error::ApiError;
use crate::api::negotiation::{request_format, response_format};
use crate::api::routes::IndirectedRoute;
use crate::identity::ClientIdentity;

fn header_str<'a>(headers: &'a HeaderMap, name: header::HeaderName) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn render(format: Format, bytes: Vec<u8>) -> Response {
    ([(header::CONTENT_TYPE, format.mime())], bytes).into_response()
}

/// Instance carried by a PUT body
fn body_instance(
    indirection: &Indirection,
    key: &str,
    headers: &HeaderMap,
    body: &Bytes,
) -> Result<Instance, ApiError> {
    let model = indirection.model();
    let format = request_format(header_str(headers, header::CONTENT_TYPE), model)?;
    let data = format.parse(body)?;
    Ok(model.instance_from(data, key)?)
}

pub async fn handle(
    state: &AppState,
    route: IndirectedRoute,
    path: &str,
    client: &ClientIdentity,
    headers: &HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    state.authorizer.authorize(route.method, path, client)?;

    let indirection = state.registry.get(&route.indirection).ok_or_else(|| {
        ApiError::NotFound(format!("Could not find indirection '{}'", route.indirection))
    })?;
    if !indirection.allow_remote_requests()? {
        return Err(ApiError::NotFound(format!("No handler for {}", route.indirection)));
    }

    if let Some(environment) = route.options.environment.as_deref() {
        if state.environments.get(environment).await.is_none() {
            return Err(ApiError::NotFound(format!(
                "Could not find environment '{}'",
                environment
            )));
        }
    }

    let format = response_format(header_str(headers, header::ACCEPT), indirection.model())?;

    let mut options = route.options;
    options.node = client.name.clone();
    options.ip = client.ip.map(|ip| ip.to_string());
    options.authenticated = client.is_authenticated();

    let instance = match route.method {
        Method::Save => Some(body_instance(&indirection, &route.key, headers, &body)?),
        _ => None,
    };
    let request = Request::new(
        route.indirection.clone(),
        route.method,
        route.key.clone(),
        options,
        instance,
    )?;

    debug!(
        request = %request.description(),
        client = %client.describe(),
        format = %format,
        "Dispatching request"
    );

    match indirection.dispatch(&request).await? {
        Outcome::Found(Some(instance)) => Ok(render(format, format.render(&instance.data)?)),
        Outcome::Found(None) => Err(ApiError::NotFound(format!(
            "Could not find {} {}",
            route.indirection, route.key
        ))),
        Outcome::Many(instances) => {
            let data: Vec<Value> = instances.into_iter().map(|i| i.data).collect();
            Ok(render(format, format.render_multiple(&data)?))
        }
        Outcome::Saved(instance) => {
            info!(indirection = %route.indirection, key = %instance.name, client = %client.describe(), "Saved instance");
            Ok(render(format, format.render(&instance.data)?))
        }
        Outcome::Destroyed(instance) => {
            let data = instance.map(|i| i.data).unwrap_or(Value::Null);
            Ok(render(format, format.render(&data)?))
        }
        Outcome::Exists(true) => Ok(Response::builder()
            .status(StatusCode::OK)
            .body(Body::empty())
            .map_err(|e| IndirectorError::terminus(format!("Could not build response: {}", e)))?),
        Outcome::Exists(false) => Err(ApiError::NotFound(format!(
            "Could not find {} {}",
            route.indirection, route.key
        ))),
    }
}
