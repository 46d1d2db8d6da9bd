//! Node facts

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::model::Model;

/// Facts reported by one node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Facts {
    pub name: String,

    #[serde(default)]
    pub values: Map<String, Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiration: Option<DateTime<Utc>>,
}

impl Facts {
    /// Empty fact set stamped with the current time
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            values: Map::new(),
            timestamp: Some(Utc::now()),
            expiration: None,
        }
    }

    pub fn with_fact(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.values.insert(name.into(), value.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }
}

impl Model for Facts {
    const INDIRECTION: &'static str = "facts";
    const CARRIES_EXPIRATION: bool = true;

    fn name(&self) -> &str {
        &self.name
    }
}
