//! Run reports uploaded by agents

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::model::Model;

/// Outcome of one agent run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    /// Reporting host; older agents send it as `host`
    #[serde(alias = "host")]
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub configuration_version: Option<String>,

    /// `changed`, `unchanged` or `failed`
    #[serde(default = "default_status")]
    pub status: String,

    #[serde(default)]
    pub logs: Vec<Value>,

    #[serde(default)]
    pub metrics: Map<String, Value>,
}

fn default_status() -> String {
    "unchanged".to_string()
}

impl Model for Report {
    const INDIRECTION: &'static str = "report";

    fn name(&self) -> &str {
        &self.name
    }
}
