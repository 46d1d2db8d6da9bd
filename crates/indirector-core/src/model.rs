//! Model contract
//!
//! Every indirection serves exactly one model type. Termini never see the
//! typed model: they store and return [`Instance`] values, which pair the
//! instance name with its canonical data hash. Typed code converts at the edge
//! with [`Model::to_instance`] and [`Model::from_instance`].
//!
//! Expiration is instance metadata. It only appears in the data hash for
//! models whose own serialization carries it (facts, nodes, catalogs).

use chrono::{DateTime, NaiveDate, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::error::{IndirectorError, Result};
use crate::format::Format;

/// Formats supported by models that do not override `supported_formats`
pub const DEFAULT_FORMATS: &[Format] = &[Format::Json, Format::Pson, Format::Yaml];

/// A named model instance in canonical (data hash) form
#[derive(Debug, Clone, PartialEq)]
pub struct Instance {
    /// Instance name, used as the terminus key
    pub name: String,
    /// Canonical data hash
    pub data: Value,
    /// When a found copy stops being fresh
    pub expiration: Option<DateTime<Utc>>,
}

impl Instance {
    /// Create an instance from a name and data hash
    pub fn new(name: impl Into<String>, data: Value) -> Self {
        Self {
            name: name.into(),
            data,
            expiration: None,
        }
    }

    /// Build an instance from a data hash, taking the name from its `name` field
    pub fn from_data(data: Value, fallback_name: &str) -> Self {
        let name = data
            .get("name")
            .and_then(Value::as_str)
            .filter(|n| !n.is_empty())
            .unwrap_or(fallback_name)
            .to_string();
        Self {
            name,
            data,
            expiration: None,
        }
    }

    /// Expiration time, from the metadata or else the data hash
    pub fn expiration(&self) -> Option<DateTime<Utc>> {
        self.expiration.or_else(|| {
            self.data
                .get("expiration")
                .and_then(Value::as_str)
                .and_then(parse_time)
        })
    }

    /// Set the expiration time
    ///
    /// The data hash is only rewritten when it already has an `expiration`
    /// entry, so stored copies agree with the metadata.
    pub fn set_expiration(&mut self, at: DateTime<Utc>) {
        self.expiration = Some(at);
        if let Value::Object(map) = &mut self.data {
            if let Some(entry) = map.get_mut("expiration") {
                *entry = Value::String(at.to_rfc3339());
            }
        }
    }

    /// Production time carried in the data hash, if any
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        self.data
            .get("timestamp")
            .and_then(Value::as_str)
            .and_then(parse_time)
    }

    /// Whether the instance expired before `now`
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        matches!(self.expiration(), Some(exp) if exp < now)
    }

    /// Value of a fact, read from the `values` object of the data hash
    pub fn fact(&self, name: &str) -> Option<&Value> {
        self.data.get("values").and_then(|v| v.get(name))
    }
}

/// Parse an RFC 3339 time or a bare `YYYY-MM-DD` date (midnight UTC)
pub fn parse_time(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(t) = DateTime::parse_from_rfc3339(value) {
        return Some(t.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

/// Contract every indirected model type satisfies
pub trait Model: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// Name of the indirection serving this model
    const INDIRECTION: &'static str;

    /// Instance name (the terminus key)
    fn name(&self) -> &str;

    /// Canonical serialization
    fn to_data_hash(&self) -> Result<Value> {
        serde_json::to_value(self)
            .map_err(|e| IndirectorError::Validation(format!("Cannot serialize {}: {}", Self::INDIRECTION, e)))
    }

    /// Inverse of `to_data_hash`
    fn from_data_hash(data: Value) -> Result<Self> {
        serde_json::from_value(data).map_err(|e| {
            IndirectorError::Validation(format!("Invalid {} data: {}", Self::INDIRECTION, e))
        })
    }

    /// Whether the data hash has an `expiration` entry
    const CARRIES_EXPIRATION: bool = false;

    /// Wire formats, in preference order
    fn supported_formats() -> &'static [Format] {
        DEFAULT_FORMATS
    }

    /// Render in one of the supported formats
    fn render(&self, format: Format) -> Result<Vec<u8>> {
        format.render(&self.to_data_hash()?)
    }

    /// Parse from one of the supported formats
    fn convert_from(format: Format, bytes: &[u8]) -> Result<Self> {
        Self::from_data_hash(format.parse(bytes)?)
    }

    /// Convert into canonical form for termini
    fn to_instance(&self) -> Result<Instance> {
        Ok(Instance::new(self.name(), self.to_data_hash()?))
    }

    /// Convert back from canonical form
    fn from_instance(instance: Instance) -> Result<Self> {
        let mut data = instance.data;
        if let Value::Object(map) = &mut data {
            map.entry("name")
                .or_insert_with(|| Value::String(instance.name.clone()));
        }
        Self::from_data_hash(data)
    }

    /// Type-erased descriptor used by the indirection
    fn spec() -> ModelSpec {
        ModelSpec {
            name: Self::INDIRECTION,
            formats: Self::supported_formats().to_vec(),
            carries_expiration: Self::CARRIES_EXPIRATION,
            check: check_model::<Self>,
        }
    }
}

fn check_model<M: Model>(data: &Value) -> Result<()> {
    M::from_data_hash(data.clone()).map(|_| ())
}

/// Type-erased model descriptor
#[derive(Clone)]
pub struct ModelSpec {
    /// Model name
    pub name: &'static str,
    /// Supported wire formats, in preference order
    pub formats: Vec<Format>,
    /// Expiration is part of the data hash
    pub carries_expiration: bool,
    check: fn(&Value) -> Result<()>,
}

impl ModelSpec {
    /// Descriptor for untyped models that accept any JSON object
    pub fn untyped(name: &'static str, formats: &[Format]) -> Self {
        Self {
            name,
            formats: formats.to_vec(),
            carries_expiration: false,
            check: |data| match data {
                Value::Object(_) => Ok(()),
                _ => Err(IndirectorError::Validation("Data hash must be an object".into())),
            },
        }
    }

    /// Stamp an expiration, writing it into the data hash for models that
    /// carry one
    pub fn set_expiration(&self, instance: &mut Instance, at: DateTime<Utc>) {
        instance.set_expiration(at);
        if self.carries_expiration {
            if let Value::Object(map) = &mut instance.data {
                map.insert("expiration".into(), Value::String(at.to_rfc3339()));
            }
        }
    }

    /// Check that a data hash deserializes into the model
    pub fn validate(&self, data: &Value) -> Result<()> {
        (self.check)(data)
    }

    /// Whether `format` is supported
    pub fn supports(&self, format: Format) -> bool {
        self.formats.contains(&format)
    }

    /// Preferred format
    pub fn default_format(&self) -> Format {
        self.formats.first().copied().unwrap_or(Format::Json)
    }

    /// Build an instance from an inbound payload, checking it against the model
    pub fn instance_from(&self, data: Value, key: &str) -> Result<Instance> {
        self.validate(&data)?;
        let mut instance = Instance::from_data(data, key);
        if !key.is_empty() && instance.name != key {
            instance.name = key.to_string();
            if let Value::Object(map) = &mut instance.data {
                if map.contains_key("name") {
                    map.insert("name".into(), Value::String(key.to_string()));
                }
            }
        }
        Ok(instance)
    }
}

impl std::fmt::Debug for ModelSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelSpec")
            .field("name", &self.name)
            .field("formats", &self.formats)
            .finish()
    }
}
