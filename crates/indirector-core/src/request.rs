//! Normalized operation descriptors

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::{IndirectorError, Result};
use crate::model::Instance;

/// Operations an indirection can dispatch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Method {
    Find,
    Search,
    Save,
    Destroy,
    Head,
}

impl Method {
    /// All methods, in declaration order
    pub const ALL: [Method; 5] = [
        Method::Find,
        Method::Search,
        Method::Save,
        Method::Destroy,
        Method::Head,
    ];

    /// Whether requests for this method need a non-empty key
    pub fn requires_key(&self) -> bool {
        !matches!(self, Method::Search)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Find => "find",
            Method::Search => "search",
            Method::Save => "save",
            Method::Destroy => "destroy",
            Method::Head => "head",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Method {
    type Err = IndirectorError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "find" => Ok(Method::Find),
            "search" => Ok(Method::Search),
            "save" => Ok(Method::Save),
            "destroy" => Ok(Method::Destroy),
            "head" => Ok(Method::Head),
            other => Err(IndirectorError::Validation(format!(
                "Unknown indirection method: {}",
                other
            ))),
        }
    }
}

/// Named request parameters
///
/// Well-known options have their own fields; everything else (search filters,
/// terminus-specific parameters) lands in `params`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Options {
    /// Environment the request is scoped to
    pub environment: Option<String>,
    /// Whether the caller presented a verified identity
    pub authenticated: bool,
    /// Caller's node name
    pub node: Option<String>,
    /// Caller's address
    pub ip: Option<String>,
    /// Skip reading from the cache terminus
    pub ignore_cache: bool,
    /// Only consult the cache terminus
    pub ignore_terminus: bool,
    /// Treat a remote 404 as an error instead of a miss
    pub fail_on_404: bool,
    /// Reject cached instances produced before this time
    pub fresh_after: Option<DateTime<Utc>>,
    /// Everything else, including search filters
    pub params: BTreeMap<String, String>,
}

impl Options {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_environment(mut self, environment: impl Into<String>) -> Self {
        self.environment = Some(environment.into());
        self
    }

    pub fn with_node(mut self, node: impl Into<String>) -> Self {
        self.node = Some(node.into());
        self
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    pub fn ignoring_cache(mut self) -> Self {
        self.ignore_cache = true;
        self
    }

    pub fn ignoring_terminus(mut self) -> Self {
        self.ignore_terminus = true;
        self
    }

    pub fn fresh_after(mut self, at: DateTime<Utc>) -> Self {
        self.fresh_after = Some(at);
        self
    }

    /// Build options from raw query/form pairs
    ///
    /// Well-known names are lifted into their fields; identity fields (`node`,
    /// `ip`, `authenticated`) are never taken from the wire and are dropped.
    pub fn from_pairs<I, K, V>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut options = Options::default();
        for (key, value) in pairs {
            let value = value.into();
            match key.as_ref() {
                "environment" => options.environment = Some(value),
                "ignore_cache" => options.ignore_cache = parse_flag("ignore_cache", &value)?,
                "ignore_terminus" => {
                    options.ignore_terminus = parse_flag("ignore_terminus", &value)?
                }
                "fail_on_404" => options.fail_on_404 = parse_flag("fail_on_404", &value)?,
                "fresh_after" => {
                    let at = crate::model::parse_time(&value).ok_or_else(|| {
                        IndirectorError::Validation(format!("Invalid fresh_after time: {}", value))
                    })?;
                    options.fresh_after = Some(at);
                }
                "node" | "ip" | "authenticated" => {}
                other => {
                    options.params.insert(other.to_string(), value);
                }
            }
        }
        Ok(options)
    }

    /// Options as ordered query pairs, skipping unset values
    ///
    /// Identity fields are local to this process and never leave it.
    pub fn to_pairs(&self) -> Vec<(String, String)> {
        let mut pairs = Vec::new();
        if let Some(env) = &self.environment {
            pairs.push(("environment".to_string(), env.clone()));
        }
        if self.ignore_cache {
            pairs.push(("ignore_cache".to_string(), "true".to_string()));
        }
        if self.ignore_terminus {
            pairs.push(("ignore_terminus".to_string(), "true".to_string()));
        }
        if self.fail_on_404 {
            pairs.push(("fail_on_404".to_string(), "true".to_string()));
        }
        if let Some(at) = self.fresh_after {
            pairs.push(("fresh_after".to_string(), at.to_rfc3339()));
        }
        for (k, v) in &self.params {
            pairs.push((k.clone(), v.clone()));
        }
        pairs
    }
}

fn parse_flag(name: &str, value: &str) -> Result<bool> {
    match value {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" | "" => Ok(false),
        other => Err(IndirectorError::Validation(format!(
            "Invalid value '{}' for {}",
            other, name
        ))),
    }
}

/// A single operation against one indirection
#[derive(Debug, Clone)]
pub struct Request {
    indirection: String,
    method: Method,
    key: String,
    options: Options,
    instance: Option<Instance>,
}

impl Request {
    /// Build a request, validating the key for the method
    ///
    /// Save requests may omit the key when the instance carries a name.
    pub fn new(
        indirection: impl Into<String>,
        method: Method,
        key: impl Into<String>,
        options: Options,
        instance: Option<Instance>,
    ) -> Result<Self> {
        let mut key = key.into();
        if key.is_empty() && method == Method::Save {
            if let Some(instance) = &instance {
                key = instance.name.clone();
            }
        }

        if method.requires_key() && key.is_empty() {
            return Err(IndirectorError::Validation(format!(
                "A key is required for {} requests",
                method
            )));
        }

        if method == Method::Save && instance.is_none() {
            return Err(IndirectorError::Validation(
                "Save requests need an instance".into(),
            ));
        }

        Ok(Self {
            indirection: indirection.into(),
            method,
            key,
            options,
            instance,
        })
    }

    /// Build a request from a method name
    pub fn parse(
        indirection: impl Into<String>,
        method: &str,
        key: impl Into<String>,
        options: Options,
        instance: Option<Instance>,
    ) -> Result<Self> {
        let method = method.parse()?;
        Self::new(indirection, method, key, options, instance)
    }

    pub fn indirection(&self) -> &str {
        &self.indirection
    }

    pub fn method(&self) -> Method {
        self.method
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    pub fn instance(&self) -> Option<&Instance> {
        self.instance.as_ref()
    }

    pub fn into_instance(self) -> Option<Instance> {
        self.instance
    }

    pub fn environment(&self) -> Option<&str> {
        self.options.environment.as_deref()
    }

    /// A request is plural when it may return many instances
    pub fn is_plural(&self) -> bool {
        self.method == Method::Search
    }

    /// A request is remote when it carries a caller identity or address
    pub fn is_remote(&self) -> bool {
        self.options.node.is_some() || self.options.ip.is_some()
    }

    /// Key escaped for use as a single URL path segment
    pub fn escaped_key(&self) -> String {
        escape_segment(&self.key)
    }

    /// Options encoded as a query string, without the leading `?`
    pub fn query_string(&self) -> String {
        url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(self.options.to_pairs())
            .finish()
    }

    /// Same request with a different method, reusing key and options
    pub fn derive(&self, method: Method, instance: Option<Instance>) -> Result<Self> {
        Self::new(
            self.indirection.clone(),
            method,
            self.key.clone(),
            self.options.clone(),
            instance,
        )
    }

    /// Human-readable description for logs
    pub fn description(&self) -> String {
        format!("{}/{}", self.indirection, self.key)
    }
}

/// Percent-escape a string for use as one URL path segment
///
/// Dot segments are escaped too, so the result never walks up a path.
pub fn escape_segment(value: &str) -> String {
    match value {
        "." => "%2E".to_string(),
        ".." => "%2E%2E".to_string(),
        _ => urlencoding::encode(value).into_owned(),
    }
}

/// Inverse of [`escape_segment`]
///
/// Only `%XX` sequences are decoded: `+`, `=` and `&` are literal in a path
/// segment.
pub fn unescape_segment(escaped: &str) -> Result<String> {
    urlencoding::decode(escaped)
        .map(|decoded| decoded.into_owned())
        .map_err(|_| {
            IndirectorError::Validation(format!("'{}' does not decode to UTF-8", escaped))
        })
}
