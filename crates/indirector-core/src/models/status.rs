//! Server liveness

use serde::{Deserialize, Serialize};

use crate::model::Model;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Status {
    #[serde(default)]
    pub name: String,

    pub is_alive: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

impl Status {
    pub fn alive(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_alive: true,
            version: Some(env!("CARGO_PKG_VERSION").to_string()),
        }
    }
}

impl Model for Status {
    const INDIRECTION: &'static str = "status";

    fn name(&self) -> &str {
        &self.name
    }
}
