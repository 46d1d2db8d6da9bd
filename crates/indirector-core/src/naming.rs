//! URL naming rules shared by the HTTP router and the REST terminus
//!
//! Plural names select `search`. Which names count as plural is data: a
//! handful of indirections end in `s` but are singular (`facts`, `status`),
//! and a few legacy names are plural without looking like it (`inventory`).

use std::collections::{BTreeMap, BTreeSet};

/// URL category of certificate authority indirections
pub const CA_CATEGORY: &str = "puppet-ca";
/// URL category of everything else
pub const DEFAULT_CATEGORY: &str = "puppet";

const CA_INDIRECTIONS: &[&str] = &[
    "certificate",
    "certificate_request",
    "certificate_revocation_list",
    "certificate_status",
];

/// URL category serving an indirection
pub fn category_for(indirection: &str) -> &'static str {
    if CA_INDIRECTIONS.contains(&indirection) {
        CA_CATEGORY
    } else {
        DEFAULT_CATEGORY
    }
}

/// Indirection names: `^[A-Za-z0-9_]+$`
pub fn is_valid_indirection_name(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Environment names: `^[a-z0-9_]+$`
pub fn is_valid_environment_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

/// Singular/plural overrides and legacy aliases
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluralizationRules {
    /// Names that end in `s` but are singular
    pub singular: BTreeSet<String>,
    /// Names that are plural although they do not end in `s`
    pub plural: BTreeSet<String>,
    /// Legacy plural names mapped to the indirection they search
    pub aliases: BTreeMap<String, String>,
}

impl Default for PluralizationRules {
    fn default() -> Self {
        Self {
            singular: ["facts", "status", "certificate_status"]
                .into_iter()
                .map(String::from)
                .collect(),
            plural: ["inventory"].into_iter().map(String::from).collect(),
            aliases: [("inventory".to_string(), "facts".to_string())]
                .into_iter()
                .collect(),
        }
    }
}

impl PluralizationRules {
    /// Whether a URL name selects `search`
    pub fn is_plural(&self, name: &str) -> bool {
        if self.singular.contains(name) {
            return false;
        }
        if self.plural.contains(name) {
            return true;
        }
        name.ends_with('s') || name.ends_with("_search")
    }

    /// Indirection addressed by a URL name
    pub fn singularize(&self, name: &str) -> String {
        let base = if !self.is_plural(name) {
            name
        } else if let Some(stripped) = name.strip_suffix("_search") {
            stripped
        } else if let Some(stripped) = name.strip_suffix('s') {
            stripped
        } else {
            name
        };
        let base = if base.ends_with("statuse") {
            &base[..base.len() - 1]
        } else {
            base
        };

        self.aliases
            .get(base)
            .cloned()
            .unwrap_or_else(|| base.to_string())
    }

    /// URL name used to search an indirection
    pub fn pluralize(&self, indirection: &str) -> String {
        if indirection == "status" {
            "statuses".to_string()
        } else if indirection.ends_with('s') {
            format!("{}_search", indirection)
        } else {
            format!("{}s", indirection)
        }
    }
}
