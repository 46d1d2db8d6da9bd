//! Flat-file terminus
//!
//! One file per key under a directory, named by the escaped key plus the
//! format extension. Writes go to a uniquely named temporary file in the same
//! directory and are renamed into place, so readers only ever see complete
//! files. Writes to the same key are serialized.

use async_trait::async_trait;
use indirector_core::{
    escape_segment, unescape_segment, Capabilities, Filter, Format, IndirectorError, Instance,
    ModelSpec, Request, Result, Terminus,
};
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

type LockTable = Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>;

/// Held while one key is written; the table entry goes away with the last
/// holder
struct KeyLock<'a> {
    locks: &'a LockTable,
    key: String,
    guard: Option<tokio::sync::OwnedMutexGuard<()>>,
}

impl Drop for KeyLock<'_> {
    fn drop(&mut self) {
        // Release before counting: what remains is the table's reference plus
        // any waiter's clone, all taken under the table lock.
        self.guard.take();
        if let Ok(mut locks) = self.locks.lock() {
            if locks.get(&self.key).is_some_and(|lock| Arc::strong_count(lock) == 1) {
                locks.remove(&self.key);
            }
        }
    }
}

/// Terminus storing one serialized data hash per file
#[derive(Debug)]
pub struct FileTerminus {
    name: String,
    directory: PathBuf,
    format: Format,
    extension: String,
    model: ModelSpec,
    locks: LockTable,
}

impl FileTerminus {
    pub fn new(
        name: impl Into<String>,
        directory: impl Into<PathBuf>,
        format: Format,
        model: ModelSpec,
    ) -> Self {
        Self {
            name: name.into(),
            directory: directory.into(),
            format,
            extension: format.extension().to_string(),
            model,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Use a different file extension than the format's
    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = extension.into();
        self
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Path of the file holding `key`
    pub fn path_for(&self, key: &str) -> PathBuf {
        self.directory
            .join(format!("{}.{}", escape_segment(key), self.extension))
    }

    /// Serialize writers of `key` until the returned guard drops
    async fn lock_key(&self, key: &str) -> Result<KeyLock<'_>> {
        let lock = {
            let mut locks = self
                .locks
                .lock()
                .map_err(|_| IndirectorError::terminus("File lock table poisoned"))?;
            locks.entry(key.to_string()).or_default().clone()
        };
        let guard = lock.lock_owned().await;
        Ok(KeyLock {
            locks: &self.locks,
            key: key.to_string(),
            guard: Some(guard),
        })
    }

    fn read_error(&self, path: &Path, err: impl std::fmt::Display) -> IndirectorError {
        IndirectorError::terminus(format!("Could not parse {}: {}", path.display(), err))
    }

    fn decode(&self, path: &Path, bytes: &[u8], fallback_name: &str) -> Result<Instance> {
        let data = self
            .format
            .parse(bytes)
            .map_err(|e| self.read_error(path, e))?;
        self.model
            .validate(&data)
            .map_err(|e| self.read_error(path, e))?;
        Ok(Instance::from_data(data, fallback_name))
    }

    async fn read(&self, key: &str) -> Result<Option<Instance>> {
        let path = self.path_for(key);
        match tokio::fs::read(&path).await {
            Ok(bytes) => self.decode(&path, &bytes, key).map(Some),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(IndirectorError::terminus(format!(
                "Could not read {}: {}",
                path.display(),
                e
            ))),
        }
    }

    fn key_from_file_name(&self, file_name: &str) -> Option<String> {
        if file_name.starts_with('.') {
            return None;
        }
        let stem = file_name.strip_suffix(&format!(".{}", self.extension))?;
        unescape_segment(stem).ok()
    }
}

#[async_trait]
impl Terminus for FileTerminus {
    fn name(&self) -> &str {
        &self.name
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::all()
    }

    async fn find(&self, request: &Request) -> Result<Option<Instance>> {
        self.read(request.key()).await
    }

    async fn head(&self, request: &Request) -> Result<bool> {
        Ok(tokio::fs::try_exists(self.path_for(request.key())).await?)
    }

    async fn search(&self, request: &Request) -> Result<Vec<Instance>> {
        let filter = Filter::from_params(&request.options().params)?;

        let mut entries = match tokio::fs::read_dir(&self.directory).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut found = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let file_name = entry.file_name().to_string_lossy().into_owned();
            let Some(key) = self.key_from_file_name(&file_name) else {
                continue;
            };
            let path = entry.path();
            let bytes = match tokio::fs::read(&path).await {
                Ok(bytes) => bytes,
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };
            match self.decode(&path, &bytes, &key) {
                Ok(instance) if filter.matches(&instance) => found.push(instance),
                Ok(_) => {}
                Err(e) => warn!(path = %path.display(), error = %e, "Skipping unreadable file"),
            }
        }

        found.sort_by(|a, b| a.name.cmp(&b.name));
        debug!(directory = %self.directory.display(), count = found.len(), "Searched files");
        Ok(found)
    }

    async fn save(&self, request: &Request) -> Result<Instance> {
        let instance = request
            .instance()
            .ok_or_else(|| IndirectorError::Validation("Save requests need an instance".into()))?;
        let bytes = self.format.render(&instance.data)?;

        let _lock = self.lock_key(request.key()).await?;

        tokio::fs::create_dir_all(&self.directory).await?;
        let path = self.path_for(request.key());
        let temp = self
            .directory
            .join(format!(".{}.{}.tmp", escape_segment(request.key()), uuid::Uuid::new_v4()));

        if let Err(e) = tokio::fs::write(&temp, &bytes).await {
            let _ = tokio::fs::remove_file(&temp).await;
            return Err(e.into());
        }
        if let Err(e) = tokio::fs::rename(&temp, &path).await {
            let _ = tokio::fs::remove_file(&temp).await;
            return Err(e.into());
        }

        info!(indirection = %request.indirection(), path = %path.display(), "Wrote instance");
        Ok(instance.clone())
    }

    async fn destroy(&self, request: &Request) -> Result<Option<Instance>> {
        let _lock = self.lock_key(request.key()).await?;

        let path = self.path_for(request.key());
        let existing = match self.read(request.key()).await {
            Ok(existing) => existing,
            // A corrupt file can still be removed
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Removing unreadable file");
                None
            }
        };

        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                info!(indirection = %request.indirection(), path = %path.display(), "Removed instance");
                Ok(existing)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indirector_core::{Method, Options, DEFAULT_FORMATS};
    use serde_json::json;

    fn terminus(dir: &Path, format: Format) -> FileTerminus {
        FileTerminus::new("yaml", dir, format, ModelSpec::untyped("widget", DEFAULT_FORMATS))
    }

    #[test]
    fn test_file_name_escapes_key() {
        let t = terminus(Path::new("/srv/widgets"), Format::Yaml);
        assert_eq!(
            t.path_for("foo bar/baz"),
            PathBuf::from("/srv/widgets/foo%20bar%2Fbaz.yaml")
        );
        assert_eq!(t.key_from_file_name("foo%20bar%2Fbaz.yaml").as_deref(), Some("foo bar/baz"));
        assert_eq!(t.key_from_file_name(".w1.tmp"), None);
        assert_eq!(t.key_from_file_name("w1.json"), None);
    }

    #[tokio::test]
    async fn test_lock_table_is_pruned() {
        let dir = tempfile::TempDir::new().unwrap();
        let t = terminus(dir.path(), Format::Json);
        for key in ["w1", "w2", "w3"] {
            let instance = Instance::new(key, json!({"color": "red"}));
            let save = Request::new("widget", Method::Save, key, Options::new(), Some(instance)).unwrap();
            t.save(&save).await.unwrap();
        }
        let destroy = Request::new("widget", Method::Destroy, "w1", Options::new(), None).unwrap();
        t.destroy(&destroy).await.unwrap();

        assert!(t.locks.lock().unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_saves_never_expose_partial_files() {
        let dir = tempfile::TempDir::new().unwrap();
        let t = Arc::new(terminus(dir.path(), Format::Json));
        let seed = Instance::new("w1", json!({"color": "seed"}));
        t.save(&Request::new("widget", Method::Save, "w1", Options::new(), Some(seed)).unwrap())
            .await
            .unwrap();

        let mut tasks = Vec::new();
        for writer in 0..8 {
            let t = t.clone();
            tasks.push(tokio::spawn(async move {
                for round in 0..10 {
                    let padding = "x".repeat(4096 * (writer + 1));
                    let instance = Instance::new(
                        "w1",
                        json!({"writer": writer, "round": round, "padding": padding}),
                    );
                    let save = Request::new("widget", Method::Save, "w1", Options::new(), Some(instance)).unwrap();
                    t.save(&save).await.unwrap();
                }
            }));
        }
        for _ in 0..8 {
            let t = t.clone();
            tasks.push(tokio::spawn(async move {
                let find = Request::new("widget", Method::Find, "w1", Options::new(), None).unwrap();
                for _ in 0..20 {
                    // Every read parses: a torn file would be a Terminus error
                    assert!(t.find(&find).await.unwrap().is_some());
                }
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        let names: Vec<String> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["w1.json"]);
        assert!(t.locks.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_directory_searches_empty() {
        let t = terminus(Path::new("/nonexistent/indirector/widgets"), Format::Json);
        let search = Request::new("widget", Method::Search, "", Options::new(), None).unwrap();
        assert!(t.search(&search).await.unwrap().is_empty());

        let find = Request::new("widget", Method::Find, "w1", Options::new(), None).unwrap();
        assert!(t.find(&find).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_extension_override() {
        let dir = std::env::temp_dir().join(format!("indirector-{}", uuid::Uuid::new_v4()));
        let t = FileTerminus::new(
            "file",
            &dir,
            Format::Text,
            ModelSpec::untyped("certificate", &[Format::Text]),
        )
        .with_extension("pem");

        let instance = Instance::new("ca", json!({"content": "-----BEGIN CERTIFICATE-----"}));
        let save = Request::new("certificate", Method::Save, "ca", Options::new(), Some(instance)).unwrap();
        t.save(&save).await.unwrap();

        let written = std::fs::read_to_string(dir.join("ca.pem")).unwrap();
        assert_eq!(written, "-----BEGIN CERTIFICATE-----");
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
