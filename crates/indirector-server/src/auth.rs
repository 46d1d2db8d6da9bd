//! Authorization of API requests
//!
//! Every request is checked before any terminus is touched. The rule-based
//! authorizer reads auth.conf-style rules from settings: the first rule whose
//! path, method and authentication state match decides, and a request no rule
//! matches is denied.

use indirector_core::settings::AuthRuleConfig;
use indirector_core::{IndirectorError, Method, Result};
use regex::Regex;
use std::collections::BTreeSet;
use std::fmt::Debug;
use tracing::debug;

use crate::identity::ClientIdentity;

/// Decides whether a client may perform an operation on a path
pub trait Authorizer: Send + Sync + Debug {
    /// `Ok(())` when allowed, an `Authorization` error otherwise
    fn authorize(&self, method: Method, path: &str, client: &ClientIdentity) -> Result<()>;
}

/// Allows everything; for development only
#[derive(Debug, Default, Clone, Copy)]
pub struct AllowAll;

impl Authorizer for AllowAll {
    fn authorize(&self, _method: Method, _path: &str, _client: &ClientIdentity) -> Result<()> {
        Ok(())
    }
}

#[derive(Debug, Clone)]
enum PathMatcher {
    Prefix(String),
    Regex(Regex),
}

impl PathMatcher {
    /// Captures of a match; the whole path is capture 0
    fn captures(&self, path: &str) -> Option<Vec<String>> {
        match self {
            PathMatcher::Prefix(prefix) => path.starts_with(prefix.as_str()).then(|| vec![path.to_string()]),
            PathMatcher::Regex(regex) => regex.captures(path).map(|caps| {
                caps.iter()
                    .map(|m| m.map(|m| m.as_str().to_string()).unwrap_or_default())
                    .collect()
            }),
        }
    }
}

#[derive(Debug, Clone)]
struct Rule {
    source: String,
    matcher: PathMatcher,
    methods: BTreeSet<Method>,
    allow: Vec<String>,
    authenticated: Option<bool>,
}

impl Rule {
    fn compile(config: &AuthRuleConfig) -> Result<Self> {
        let matcher = match config.path.strip_prefix('~') {
            Some(pattern) => {
                let regex = Regex::new(pattern.trim()).map_err(|e| {
                    IndirectorError::Validation(format!(
                        "Invalid auth rule pattern '{}': {}",
                        config.path, e
                    ))
                })?;
                PathMatcher::Regex(regex)
            }
            None => PathMatcher::Prefix(config.path.clone()),
        };
        let methods = config
            .methods
            .iter()
            .map(|m| m.parse())
            .collect::<Result<BTreeSet<Method>>>()?;
        Ok(Self {
            source: config.path.clone(),
            matcher,
            methods,
            allow: config.allow.clone(),
            authenticated: config.authenticated,
        })
    }

    fn applies(&self, method: Method, client: &ClientIdentity) -> bool {
        (self.methods.is_empty() || self.methods.contains(&method))
            && self
                .authenticated
                .map_or(true, |required| required == client.is_authenticated())
    }

    fn allows(&self, captures: &[String], client: &ClientIdentity) -> bool {
        self.allow.iter().any(|entry| {
            if entry == "*" {
                return true;
            }
            let Some(name) = client.name.as_deref() else {
                return false;
            };
            let pattern = substitute(entry, captures);
            match pattern.strip_prefix("*.") {
                Some(domain) => name.ends_with(&format!(".{}", domain)),
                None => pattern == name,
            }
        })
    }
}

/// Replace `$1`..`$9` with regex captures
fn substitute(entry: &str, captures: &[String]) -> String {
    let mut out = String::with_capacity(entry.len());
    let mut chars = entry.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '$' {
            if let Some(index) = chars.peek().and_then(|d| d.to_digit(10)) {
                chars.next();
                out.push_str(captures.get(index as usize).map(String::as_str).unwrap_or(""));
                continue;
            }
        }
        out.push(c);
    }
    out
}

/// Ordered auth.conf-style rules; default deny
#[derive(Debug, Clone, Default)]
pub struct RuleAuthorizer {
    rules: Vec<Rule>,
}

impl RuleAuthorizer {
    pub fn from_config(rules: &[AuthRuleConfig]) -> Result<Self> {
        Ok(Self {
            rules: rules.iter().map(Rule::compile).collect::<Result<_>>()?,
        })
    }

    /// Rules granting agents access to their own data and shared read-only
    /// endpoints, in the order the standard auth.conf lists them
    pub fn standard() -> Result<Self> {
        let rule = |path: &str, methods: &[&str], allow: &str, authenticated: Option<bool>| AuthRuleConfig {
            path: path.to_string(),
            methods: methods.iter().map(|m| m.to_string()).collect(),
            allow: vec![allow.to_string()],
            authenticated,
        };
        Self::from_config(&[
            rule("~ ^/puppet/v3/catalog/([^/]+)$", &["find"], "$1", Some(true)),
            rule("~ ^/puppet/v3/node/([^/]+)$", &["find"], "$1", Some(true)),
            rule("~ ^/puppet/v3/report/([^/]+)$", &["save"], "$1", Some(true)),
            rule("~ ^/puppet/v3/facts/([^/]+)$", &["save"], "$1", Some(true)),
            rule("/puppet-ca/v3/certificate/ca", &["find"], "*", None),
            rule("/puppet-ca/v3/certificate/", &["find"], "*", None),
            rule("/puppet-ca/v3/certificate_revocation_list/ca", &["find"], "*", None),
            rule("/puppet-ca/v3/certificate_request", &["find", "save"], "*", None),
            rule("/puppet/v3/status", &["find"], "*", None),
            rule("/v2.0/environments", &["search"], "*", Some(true)),
        ])
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl Authorizer for RuleAuthorizer {
    fn authorize(&self, method: Method, path: &str, client: &ClientIdentity) -> Result<()> {
        for rule in &self.rules {
            if !rule.applies(method, client) {
                continue;
            }
            let Some(captures) = rule.matcher.captures(path) else {
                continue;
            };
            if rule.allows(&captures, client) {
                debug!(rule = %rule.source, path = %path, client = %client.describe(), "Allowed request");
                return Ok(());
            }
            break;
        }
        Err(IndirectorError::Authorization(format!(
            "Forbidden request: {} access to {} [{}]",
            client.describe(),
            path,
            method
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn agent(name: &str) -> ClientIdentity {
        ClientIdentity::verified(name, None)
    }

    #[test]
    fn test_backreference_limits_agents_to_own_catalog() {
        let auth = RuleAuthorizer::standard().unwrap();
        assert!(auth
            .authorize(Method::Find, "/puppet/v3/catalog/agent01", &agent("agent01"))
            .is_ok());
        assert!(auth
            .authorize(Method::Find, "/puppet/v3/catalog/agent02", &agent("agent01"))
            .is_err());
    }

    #[test]
    fn test_anonymous_may_fetch_ca_certificate() {
        let auth = RuleAuthorizer::standard().unwrap();
        let anonymous = ClientIdentity::anonymous(None);
        assert!(auth.authorize(Method::Find, "/puppet-ca/v3/certificate/ca", &anonymous).is_ok());
        assert!(auth.authorize(Method::Find, "/puppet/v3/catalog/agent01", &anonymous).is_err());
    }

    #[test]
    fn test_method_filter() {
        let auth = RuleAuthorizer::standard().unwrap();
        let err = auth
            .authorize(Method::Destroy, "/puppet/v3/status/master", &agent("agent01"))
            .unwrap_err();
        assert!(matches!(err, IndirectorError::Authorization(_)));
    }

    #[test]
    fn test_default_deny() {
        let auth = RuleAuthorizer::from_config(&[]).unwrap();
        assert!(auth.is_empty());
        assert!(auth.authorize(Method::Find, "/puppet/v3/node/a", &agent("a")).is_err());
    }

    #[test]
    fn test_domain_wildcard() {
        let auth = RuleAuthorizer::from_config(&[AuthRuleConfig {
            path: "/puppet/v3/file".into(),
            methods: vec![],
            allow: vec!["*.example.com".into()],
            authenticated: Some(true),
        }])
        .unwrap();
        assert!(auth.authorize(Method::Find, "/puppet/v3/file/x", &agent("web.example.com")).is_ok());
        assert!(auth.authorize(Method::Find, "/puppet/v3/file/x", &agent("example.org")).is_err());
    }

    #[test]
    fn test_invalid_rules_are_rejected() {
        let bad_pattern = AuthRuleConfig {
            path: "~ ^/puppet/(".into(),
            methods: vec![],
            allow: vec!["*".into()],
            authenticated: None,
        };
        assert!(RuleAuthorizer::from_config(&[bad_pattern]).is_err());

        let bad_method = AuthRuleConfig {
            path: "/".into(),
            methods: vec!["fetch".into()],
            allow: vec!["*".into()],
            authenticated: None,
        };
        assert!(RuleAuthorizer::from_config(&[bad_method]).is_err());
    }

    #[test]
    fn test_substitute() {
        let captures = vec!["/x/agent01".to_string(), "agent01".to_string()];
        assert_eq!(substitute("$1", &captures), "agent01");
        assert_eq!(substitute("$1.example.com", &captures), "agent01.example.com");
        assert_eq!(substitute("$5", &captures), "");
        assert_eq!(substitute("a$b", &captures), "a$b");
    }
}
