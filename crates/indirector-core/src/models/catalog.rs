//! Compiled catalogs
//!
//! Compilation itself happens elsewhere; the indirector only stores and
//! transports the result.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::model::Model;

/// A compiled catalog for one node
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Catalog {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment: Option<String>,

    #[serde(default)]
    pub resources: Vec<Value>,

    #[serde(default)]
    pub edges: Vec<Value>,

    #[serde(default)]
    pub classes: Vec<String>,

    #[serde(default)]
    pub tags: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiration: Option<String>,
}

impl Model for Catalog {
    const INDIRECTION: &'static str = "catalog";
    const CARRIES_EXPIRATION: bool = true;

    fn name(&self) -> &str {
        &self.name
    }
}
