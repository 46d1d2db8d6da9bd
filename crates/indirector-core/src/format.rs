//! Wire formats for model data hashes

use serde_json::Value;
use std::fmt;
use std::str::FromStr;

use crate::error::{IndirectorError, Result};

/// Serialization formats a model may support
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Format {
    /// application/json
    Json,
    /// text/pson, the legacy JSON dialect; rendered as JSON
    Pson,
    /// text/yaml
    Yaml,
    /// text/plain; renders the `content` field, used for PEM documents
    Text,
}

impl Format {
    /// Primary mime type used in Content-Type headers
    pub fn mime(&self) -> &'static str {
        match self {
            Format::Json => "application/json",
            Format::Pson => "text/pson",
            Format::Yaml => "text/yaml",
            Format::Text => "text/plain",
        }
    }

    /// Short name of the format
    pub fn name(&self) -> &'static str {
        match self {
            Format::Json => "json",
            Format::Pson => "pson",
            Format::Yaml => "yaml",
            Format::Text => "s",
        }
    }

    /// File extension used by file-backed termini
    pub fn extension(&self) -> &'static str {
        match self {
            Format::Json | Format::Pson => "json",
            Format::Yaml => "yaml",
            Format::Text => "txt",
        }
    }

    /// Look up a format by mime type or short name
    ///
    /// Parameters such as `; charset=utf-8` or `;q=0.5` are ignored.
    pub fn from_mime(value: &str) -> Option<Format> {
        let mime = value.split(';').next().unwrap_or("").trim().to_ascii_lowercase();
        match mime.as_str() {
            "application/json" | "json" => Some(Format::Json),
            "text/pson" | "pson" => Some(Format::Pson),
            "text/yaml" | "application/x-yaml" | "text/x-yaml" | "yaml" => Some(Format::Yaml),
            "text/plain" | "s" => Some(Format::Text),
            _ => None,
        }
    }

    /// Render a data hash
    pub fn render(&self, data: &Value) -> Result<Vec<u8>> {
        match self {
            Format::Json | Format::Pson => Ok(serde_json::to_vec(data)?),
            Format::Yaml => Ok(serde_yaml::to_string(data)?.into_bytes()),
            Format::Text => match data {
                Value::String(s) => Ok(s.clone().into_bytes()),
                Value::Object(map) => match map.get("content").and_then(Value::as_str) {
                    Some(content) => Ok(content.as_bytes().to_vec()),
                    None => Ok(data.to_string().into_bytes()),
                },
                other => Ok(other.to_string().into_bytes()),
            },
        }
    }

    /// Render a list of data hashes
    pub fn render_multiple(&self, data: &[Value]) -> Result<Vec<u8>> {
        match self {
            Format::Text => {
                let mut out = Vec::new();
                for item in data {
                    out.extend(self.render(item)?);
                    out.push(b'\n');
                }
                Ok(out)
            }
            _ => self.render(&Value::Array(data.to_vec())),
        }
    }

    /// Parse bytes into a data hash
    pub fn parse(&self, bytes: &[u8]) -> Result<Value> {
        match self {
            Format::Json | Format::Pson => serde_json::from_slice(bytes).map_err(|e| {
                IndirectorError::Validation(format!("Could not parse {}: {}", self.name(), e))
            }),
            Format::Yaml => serde_yaml::from_slice(bytes).map_err(|e| {
                IndirectorError::Validation(format!("Could not parse yaml: {}", e))
            }),
            Format::Text => String::from_utf8(bytes.to_vec())
                .map(|content| serde_json::json!({ "content": content }))
                .map_err(|e| IndirectorError::Validation(format!("Invalid text payload: {}", e))),
        }
    }

    /// Parse bytes holding a list of data hashes
    pub fn parse_multiple(&self, bytes: &[u8]) -> Result<Vec<Value>> {
        if *self == Format::Text {
            let text = String::from_utf8_lossy(bytes);
            return Ok(text
                .lines()
                .filter(|l| !l.is_empty())
                .map(|l| serde_json::json!({ "content": l }))
                .collect());
        }
        match self.parse(bytes)? {
            Value::Array(items) => Ok(items),
            Value::Null => Ok(Vec::new()),
            other => Ok(vec![other]),
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for Format {
    type Err = IndirectorError;

    fn from_str(s: &str) -> Result<Self> {
        Format::from_mime(s)
            .ok_or_else(|| IndirectorError::Validation(format!("Unknown format: {}", s)))
    }
}
