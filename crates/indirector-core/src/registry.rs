//! Process-wide indirection registry
//!
//! Readers take a cheap `Arc` snapshot of the name → indirection map; writers
//! build a new map and swap it in, so a lookup never sees a half-applied
//! registration.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::info;

use crate::error::{IndirectorError, Result};
use crate::indirection::{Indirection, IndirectionSpec};
use crate::settings::Settings;
use crate::terminus::TerminusFactories;

type Snapshot = Arc<HashMap<String, Arc<Indirection>>>;

/// Name → indirection map shared by the whole process
pub struct Registry {
    settings: Arc<Settings>,
    factories: Arc<TerminusFactories>,
    indirections: RwLock<Snapshot>,
}

impl Registry {
    pub fn new(settings: Arc<Settings>, factories: TerminusFactories) -> Self {
        Self {
            settings,
            factories: Arc::new(factories),
            indirections: RwLock::new(Arc::new(HashMap::new())),
        }
    }

    /// Registry with every built-in model registered
    pub fn with_standard_indirections(
        settings: Arc<Settings>,
        factories: TerminusFactories,
    ) -> Result<Self> {
        let registry = Self::new(settings, factories);
        for spec in crate::models::standard_indirections() {
            registry.register(spec)?;
        }
        Ok(registry)
    }

    pub fn settings(&self) -> &Arc<Settings> {
        &self.settings
    }

    pub fn factories(&self) -> &TerminusFactories {
        &self.factories
    }

    fn snapshot(&self) -> Result<Snapshot> {
        self.indirections
            .read()
            .map(|guard| guard.clone())
            .map_err(|_| IndirectorError::terminus("Registry lock poisoned"))
    }

    fn swap<F>(&self, update: F) -> Result<Arc<Indirection>>
    where
        F: FnOnce(&mut HashMap<String, Arc<Indirection>>) -> Result<Arc<Indirection>>,
    {
        let mut guard = self
            .indirections
            .write()
            .map_err(|_| IndirectorError::terminus("Registry lock poisoned"))?;
        let mut next = HashMap::clone(&guard);
        let result = update(&mut next)?;
        *guard = Arc::new(next);
        Ok(result)
    }

    fn build(&self, spec: IndirectionSpec) -> Arc<Indirection> {
        Arc::new(Indirection::new(
            spec,
            self.settings.clone(),
            self.factories.clone(),
        ))
    }

    /// Register a new indirection; names are unique
    pub fn register(&self, spec: IndirectionSpec) -> Result<Arc<Indirection>> {
        let indirection = self.build(spec);
        self.swap(|map| {
            let name = indirection.name().to_string();
            if map.contains_key(&name) {
                return Err(IndirectorError::Validation(format!(
                    "Indirection {} is already registered",
                    name
                )));
            }
            info!(indirection = %name, model = %indirection.model().name, "Registered indirection");
            map.insert(name, indirection.clone());
            Ok(indirection)
        })
    }

    /// Register or replace an indirection
    pub fn replace(&self, spec: IndirectionSpec) -> Result<Arc<Indirection>> {
        let indirection = self.build(spec);
        self.swap(|map| {
            info!(indirection = %indirection.name(), "Replaced indirection");
            map.insert(indirection.name().to_string(), indirection.clone());
            Ok(indirection)
        })
    }

    pub fn get(&self, name: &str) -> Option<Arc<Indirection>> {
        self.snapshot().ok().and_then(|map| map.get(name).cloned())
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .snapshot()
            .map(|map| map.keys().cloned().collect())
            .unwrap_or_default();
        names.sort();
        names
    }

    /// Drop every memoized terminus selection and instance
    pub fn invalidate_all(&self) -> Result<()> {
        for indirection in self.snapshot()?.values() {
            indirection.invalidate()?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("indirections", &self.names())
            .finish()
    }
}
