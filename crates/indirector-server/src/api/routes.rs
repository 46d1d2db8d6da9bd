//! URL grammars
//!
//! Routes are tried in order: v3 (`/{category}/v3/{indirection}/{key}`), v2
//! (`/v2.0/environments`), then the legacy v1 form
//! (`/{environment}/{indirection}/{key}`). Everything here is syntax: no
//! terminus, authorizer or environment loader is consulted.

use axum::http::Method as Verb;
use indirector_core::naming::{
    category_for, is_valid_environment_name, is_valid_indirection_name, CA_CATEGORY,
    DEFAULT_CATEGORY,
};
use indirector_core::{unescape_segment, IndirectorError, Method, Options, PluralizationRules, Result};

/// Which URL grammar matched
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiVersion {
    V1,
    V3,
}

/// A request addressed to an indirection
#[derive(Debug, Clone, PartialEq)]
pub struct IndirectedRoute {
    pub version: ApiVersion,
    pub indirection: String,
    pub method: Method,
    pub key: String,
    pub options: Options,
}

/// Parsed request line
#[derive(Debug, Clone, PartialEq)]
pub enum Route {
    Indirected(IndirectedRoute),
    /// `GET /v2.0/environments`
    Environments,
}

/// Parse a request path plus its query/form pairs
pub fn parse(
    verb: &Verb,
    path: &str,
    pairs: Vec<(String, String)>,
    rules: &PluralizationRules,
) -> Result<Route> {
    if let Some(route) = parse_v3(verb, path, &pairs, rules)? {
        return Ok(Route::Indirected(route));
    }
    if let Some(route) = parse_v2(verb, path)? {
        return Ok(route);
    }
    if let Some(route) = parse_v1(verb, path, &pairs, rules)? {
        return Ok(Route::Indirected(route));
    }
    Err(IndirectorError::NotFound(format!("No route for {} {}", verb, path)))
}

fn parse_v3(
    verb: &Verb,
    path: &str,
    pairs: &[(String, String)],
    rules: &PluralizationRules,
) -> Result<Option<IndirectedRoute>> {
    let Some((category, rest)) = [DEFAULT_CATEGORY, CA_CATEGORY].iter().find_map(|category| {
        path.strip_prefix('/')
            .and_then(|p| p.strip_prefix(category))
            .and_then(|p| p.strip_prefix("/v3/"))
            .map(|rest| (*category, rest))
    }) else {
        return Ok(None);
    };

    let (name, raw_key) = rest.split_once('/').unwrap_or((rest, ""));
    let (indirection, method) = resolve_name(verb, name, rules)?;

    if category_for(&indirection) != category {
        return Err(IndirectorError::Validation(format!(
            "Indirection '{}' does not match url prefix '{}'",
            indirection, category
        )));
    }

    let key = route_key(raw_key, method)?;

    let options = Options::from_pairs(pairs.iter().cloned())?;
    match options.environment.as_deref() {
        Some(env) => check_environment(env)?,
        None if category != CA_CATEGORY => {
            return Err(IndirectorError::Validation(
                "An environment parameter must be specified".into(),
            ))
        }
        None => {}
    }

    Ok(Some(IndirectedRoute {
        version: ApiVersion::V3,
        indirection,
        method,
        key,
        options,
    }))
}

fn parse_v2(verb: &Verb, path: &str) -> Result<Option<Route>> {
    if path.trim_end_matches('/') != "/v2.0/environments" {
        return Ok(None);
    }
    if verb != Verb::GET {
        return Err(IndirectorError::MethodNotAllowed(format!(
            "{} is not supported on {}",
            verb, path
        )));
    }
    Ok(Some(Route::Environments))
}

fn parse_v1(
    verb: &Verb,
    path: &str,
    pairs: &[(String, String)],
    rules: &PluralizationRules,
) -> Result<Option<IndirectedRoute>> {
    let mut segments = path.trim_start_matches('/').splitn(3, '/');
    let (Some(environment), Some(name)) = (segments.next(), segments.next()) else {
        return Ok(None);
    };
    if environment.is_empty() || name.is_empty() {
        return Ok(None);
    }
    let raw_key = segments.next().unwrap_or("");

    check_environment(environment)?;
    let (indirection, method) = resolve_name(verb, name, rules)?;
    let key = route_key(raw_key, method)?;

    let mut options = Options::from_pairs(pairs.iter().cloned())?;
    options.environment = Some(environment.to_string());

    Ok(Some(IndirectedRoute {
        version: ApiVersion::V1,
        indirection,
        method,
        key,
        options,
    }))
}

/// Decoded key segment; only searches may leave it empty
fn route_key(raw: &str, method: Method) -> Result<String> {
    let key = unescape_segment(raw)?;
    if key.is_empty() && method != Method::Search {
        return Err(IndirectorError::Validation(format!(
            "A key is required for {} requests",
            method
        )));
    }
    Ok(key)
}

/// Indirection and operation for a URL name and verb
fn resolve_name(verb: &Verb, name: &str, rules: &PluralizationRules) -> Result<(String, Method)> {
    if !is_valid_indirection_name(name) {
        return Err(IndirectorError::Validation(format!(
            "The indirection name must be purely alphanumeric, not '{}'",
            name
        )));
    }
    let plural = rules.is_plural(name);
    let method = operation(verb, plural)?;
    Ok((rules.singularize(name), method))
}

/// Map an HTTP verb to an operation
pub fn operation(verb: &Verb, plural: bool) -> Result<Method> {
    let method = match *verb {
        Verb::GET if plural => return Ok(Method::Search),
        Verb::GET | Verb::POST => Method::Find,
        Verb::PUT => Method::Save,
        Verb::DELETE => Method::Destroy,
        Verb::HEAD => Method::Head,
        _ => {
            return Err(IndirectorError::MethodNotAllowed(format!(
                "No support for http method {}",
                verb
            )))
        }
    };
    if plural {
        return Err(IndirectorError::Validation(format!(
            "No support for plural {} operations",
            verb
        )));
    }
    Ok(method)
}

fn check_environment(name: &str) -> Result<()> {
    if is_valid_environment_name(name) {
        Ok(())
    } else {
        Err(IndirectorError::Validation(format!(
            "The environment must be purely alphanumeric, not '{}'",
            name
        )))
    }
}
