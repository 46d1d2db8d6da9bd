//! In-memory terminus
//!
//! Instances live in a hashmap keyed by name. Suitable for development,
//! tests and node classification that is rebuilt at start-up. Data is lost on
//! restart.

use async_trait::async_trait;
use indirector_core::{
    Capabilities, Filter, IndirectorError, Instance, Request, Result, Terminus,
};
use std::collections::HashMap;
use std::sync::RwLock;
use tracing::info;

/// Map-backed terminus with full CRUD
#[derive(Debug)]
pub struct MemoryTerminus {
    name: String,
    items: RwLock<HashMap<String, Instance>>,
}

impl MemoryTerminus {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            items: RwLock::new(HashMap::new()),
        }
    }

    /// Number of stored instances
    pub fn len(&self) -> usize {
        self.items.read().map(|items| items.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn poisoned() -> IndirectorError {
        IndirectorError::terminus("Memory terminus lock poisoned")
    }
}

impl Default for MemoryTerminus {
    fn default() -> Self {
        Self::new("memory")
    }
}

#[async_trait]
impl Terminus for MemoryTerminus {
    fn name(&self) -> &str {
        &self.name
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::all()
    }

    async fn find(&self, request: &Request) -> Result<Option<Instance>> {
        let items = self.items.read().map_err(|_| Self::poisoned())?;
        Ok(items.get(request.key()).cloned())
    }

    async fn search(&self, request: &Request) -> Result<Vec<Instance>> {
        let filter = Filter::from_params(&request.options().params)?;
        let items = self.items.read().map_err(|_| Self::poisoned())?;
        let mut found: Vec<Instance> = items
            .values()
            .filter(|instance| filter.matches(instance))
            .cloned()
            .collect();
        found.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(found)
    }

    async fn save(&self, request: &Request) -> Result<Instance> {
        let instance = request
            .instance()
            .cloned()
            .ok_or_else(|| IndirectorError::Validation("Save requests need an instance".into()))?;
        let mut items = self.items.write().map_err(|_| Self::poisoned())?;
        info!(indirection = %request.indirection(), key = %request.key(), "Storing instance in memory");
        items.insert(request.key().to_string(), instance.clone());
        Ok(instance)
    }

    async fn destroy(&self, request: &Request) -> Result<Option<Instance>> {
        let mut items = self.items.write().map_err(|_| Self::poisoned())?;
        let removed = items.remove(request.key());
        if removed.is_some() {
            info!(indirection = %request.indirection(), key = %request.key(), "Removed instance from memory");
        }
        Ok(removed)
    }

    async fn head(&self, request: &Request) -> Result<bool> {
        let items = self.items.read().map_err(|_| Self::poisoned())?;
        Ok(items.contains_key(request.key()))
    }
}
