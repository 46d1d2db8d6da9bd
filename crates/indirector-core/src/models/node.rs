//! Node classification

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::model::Model;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment: Option<String>,

    #[serde(default)]
    pub classes: Vec<String>,

    #[serde(default)]
    pub parameters: Map<String, Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiration: Option<String>,
}

impl Model for Node {
    const INDIRECTION: &'static str = "node";
    const CARRIES_EXPIRATION: bool = true;

    fn name(&self) -> &str {
        &self.name
    }
}
