//! Environment resolution
//!
//! Requests outside the CA category name an environment. After authorization
//! the name must resolve through the configured loader or the request is
//! answered with 404.

use async_trait::async_trait;
use indirector_core::naming::is_valid_environment_name;
use indirector_core::Settings;
use moka::future::Cache;
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt::Debug;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// A resolved environment
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Environment {
    pub name: String,
    /// Directory holding the environment, for directory environments
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

/// Looks environments up by name
#[async_trait]
pub trait EnvironmentLoader: Send + Sync + Debug {
    async fn get(&self, name: &str) -> Option<Environment>;

    /// Every known environment, sorted by name
    async fn list(&self) -> Vec<Environment>;
}

/// Fixed list of environments from settings
#[derive(Debug, Clone)]
pub struct StaticEnvironments {
    names: BTreeSet<String>,
}

impl StaticEnvironments {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
        }
    }
}

#[async_trait]
impl EnvironmentLoader for StaticEnvironments {
    async fn get(&self, name: &str) -> Option<Environment> {
        self.names.contains(name).then(|| Environment {
            name: name.to_string(),
            path: None,
        })
    }

    async fn list(&self) -> Vec<Environment> {
        self.names
            .iter()
            .map(|name| Environment {
                name: name.clone(),
                path: None,
            })
            .collect()
    }
}

/// Every sub-directory of a root directory is an environment
///
/// Lookups, including misses, are cached for the environment timeout.
pub struct DirectoryEnvironments {
    root: PathBuf,
    cache: Cache<String, Option<Environment>>,
}

impl DirectoryEnvironments {
    pub fn new(root: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            root: root.into(),
            cache: Cache::builder()
                .time_to_live(timeout)
                .max_capacity(1000)
                .build(),
        }
    }

    async fn load(&self, name: &str) -> Option<Environment> {
        let path = self.root.join(name);
        match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.is_dir() => Some(Environment {
                name: name.to_string(),
                path: Some(path),
            }),
            Ok(_) => None,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Could not read environment directory");
                None
            }
        }
    }
}

impl Debug for DirectoryEnvironments {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirectoryEnvironments")
            .field("root", &self.root)
            .finish()
    }
}

#[async_trait]
impl EnvironmentLoader for DirectoryEnvironments {
    async fn get(&self, name: &str) -> Option<Environment> {
        if !is_valid_environment_name(name) {
            return None;
        }
        if let Some(cached) = self.cache.get(name).await {
            debug!(environment = %name, "Using cached environment");
            return cached;
        }
        let loaded = self.load(name).await;
        self.cache.insert(name.to_string(), loaded.clone()).await;
        loaded
    }

    async fn list(&self) -> Vec<Environment> {
        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) => {
                warn!(path = %self.root.display(), error = %e, "Could not list environments");
                return Vec::new();
            }
        };

        let mut found = Vec::new();
        while let Ok(Some(entry)) = entries.next_entry().await {
            let name = entry.file_name().to_string_lossy().into_owned();
            if !is_valid_environment_name(&name) {
                continue;
            }
            if matches!(entry.file_type().await, Ok(t) if t.is_dir()) {
                found.push(Environment {
                    name,
                    path: Some(entry.path()),
                });
            }
        }
        found.sort_by(|a, b| a.name.cmp(&b.name));
        found
    }
}

/// Loader described by settings: directory environments when
/// `environment_path` is set, the static list otherwise
pub fn loader_for(settings: &Settings) -> Arc<dyn EnvironmentLoader> {
    match &settings.environment_path {
        Some(root) => Arc::new(DirectoryEnvironments::new(
            root.clone(),
            settings.environment_timeout(),
        )),
        None => Arc::new(StaticEnvironments::new(settings.environments.iter().cloned())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_static_environments() {
        let loader = StaticEnvironments::new(["production", "development"]);
        assert!(loader.get("production").await.is_some());
        assert!(loader.get("staging").await.is_none());
        let names: Vec<String> = loader.list().await.into_iter().map(|e| e.name).collect();
        assert_eq!(names, vec!["development", "production"]);
    }

    #[tokio::test]
    async fn test_directory_environments() {
        let root = TempDir::new().unwrap();
        std::fs::create_dir(root.path().join("production")).unwrap();
        std::fs::create_dir(root.path().join("Bad-Name")).unwrap();
        std::fs::write(root.path().join("notes"), "not an environment").unwrap();

        let loader = DirectoryEnvironments::new(root.path(), Duration::from_secs(60));
        let production = loader.get("production").await.unwrap();
        assert_eq!(production.path, Some(root.path().join("production")));
        assert!(loader.get("notes").await.is_none());
        assert!(loader.get("Bad-Name").await.is_none());

        let names: Vec<String> = loader.list().await.into_iter().map(|e| e.name).collect();
        assert_eq!(names, vec!["production"]);
    }

    #[tokio::test]
    async fn test_directory_lookups_are_cached() {
        let root = TempDir::new().unwrap();
        let loader = DirectoryEnvironments::new(root.path(), Duration::from_secs(60));

        assert!(loader.get("staging").await.is_none());
        std::fs::create_dir(root.path().join("staging")).unwrap();
        // The miss is remembered until the timeout passes
        assert!(loader.get("staging").await.is_none());

        let fresh = DirectoryEnvironments::new(root.path(), Duration::from_secs(60));
        assert!(fresh.get("staging").await.is_some());
    }
}
