//! Indirection: a named binding from a model to its termini
//!
//! An indirection resolves which terminus serves it (from settings, per run
//! mode), memoizes terminus instances, and runs the cache policy around the
//! authoritative terminus:
//!
//! - `find` reads the cache first, skipping expired or stale copies, then
//!   falls back to the authoritative terminus and writes hits through.
//! - `save` and `destroy` go to the authoritative terminus and then refresh
//!   or drop the cached copy.
//! - `head` and `search` never touch the cache.

use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::{IndirectorError, Result};
use crate::model::{Instance, ModelSpec};
use crate::request::{Method, Options, Request};
use crate::settings::{RunMode, Settings};
use crate::terminus::{Terminus, TerminusContext, TerminusFactories};

/// Static description of an indirection
#[derive(Debug, Clone)]
pub struct IndirectionSpec {
    pub name: String,
    pub model: ModelSpec,
    /// Setting naming the active terminus, e.g. `facts_terminus`
    pub terminus_setting: Option<String>,
    /// Terminus used when the setting is unset, per run mode
    pub defaults: HashMap<RunMode, String>,
    /// Cache terminus used unless settings say otherwise
    pub cache_class: Option<String>,
    pub doc: String,
    /// Lifetime given to found instances; defaults to `runinterval`
    pub ttl: Option<Duration>,
}

impl IndirectionSpec {
    pub fn new(name: impl Into<String>, model: ModelSpec) -> Self {
        Self {
            name: name.into(),
            model,
            terminus_setting: None,
            defaults: HashMap::new(),
            cache_class: None,
            doc: String::new(),
            ttl: None,
        }
    }

    pub fn terminus_setting(mut self, setting: impl Into<String>) -> Self {
        self.terminus_setting = Some(setting.into());
        self
    }

    /// Default terminus for one run mode
    pub fn default_terminus(mut self, mode: RunMode, terminus: impl Into<String>) -> Self {
        self.defaults.insert(mode, terminus.into());
        self
    }

    /// Same default terminus for every run mode
    pub fn default_terminus_everywhere(mut self, terminus: impl Into<String>) -> Self {
        let terminus = terminus.into();
        for mode in [RunMode::Master, RunMode::Agent, RunMode::User] {
            self.defaults.insert(mode, terminus.clone());
        }
        self
    }

    pub fn cache_class(mut self, terminus: impl Into<String>) -> Self {
        self.cache_class = Some(terminus.into());
        self
    }

    pub fn doc(mut self, doc: impl Into<String>) -> Self {
        self.doc = doc.into();
        self
    }

    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }
}

/// Result of dispatching a request
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Found(Option<Instance>),
    Many(Vec<Instance>),
    Saved(Instance),
    Destroyed(Option<Instance>),
    Exists(bool),
}

#[derive(Debug, Default)]
struct Selection {
    terminus: Option<String>,
    /// `Some(None)` disables the cache explicitly
    cache: Option<Option<String>>,
}

/// A live indirection
pub struct Indirection {
    spec: IndirectionSpec,
    settings: Arc<Settings>,
    factories: Arc<TerminusFactories>,
    selection: RwLock<Selection>,
    termini: RwLock<HashMap<String, Arc<dyn Terminus>>>,
}

impl Indirection {
    pub fn new(
        spec: IndirectionSpec,
        settings: Arc<Settings>,
        factories: Arc<TerminusFactories>,
    ) -> Self {
        Self {
            spec,
            settings,
            factories,
            selection: RwLock::new(Selection::default()),
            termini: RwLock::new(HashMap::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.spec.name
    }

    pub fn model(&self) -> &ModelSpec {
        &self.spec.model
    }

    pub fn doc(&self) -> &str {
        &self.spec.doc
    }

    pub fn spec(&self) -> &IndirectionSpec {
        &self.spec
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Lifetime given to found instances
    pub fn ttl(&self) -> Duration {
        self.spec.ttl.unwrap_or_else(|| self.settings.runinterval())
    }

    fn poisoned() -> IndirectorError {
        IndirectorError::terminus("Indirection state lock poisoned")
    }

    /// Name of the authoritative terminus, resolved once and memoized
    pub fn terminus_class(&self) -> Result<String> {
        if let Some(name) = &self.selection.read().map_err(|_| Self::poisoned())?.terminus {
            return Ok(name.clone());
        }

        let resolved = self
            .spec
            .terminus_setting
            .as_deref()
            .and_then(|setting| self.settings.value(setting))
            .or_else(|| {
                self.spec
                    .defaults
                    .get(&self.settings.run_mode)
                    .map(String::as_str)
            })
            .ok_or_else(|| {
                IndirectorError::terminus(format!(
                    "No terminus configured for indirection {} in run mode {}",
                    self.spec.name, self.settings.run_mode
                ))
            })?
            .to_string();

        let mut selection = self.selection.write().map_err(|_| Self::poisoned())?;
        Ok(selection.terminus.get_or_insert(resolved).clone())
    }

    /// Override the authoritative terminus
    pub fn set_terminus_class(&self, name: impl Into<String>) -> Result<()> {
        let name = name.into();
        info!(indirection = %self.spec.name, terminus = %name, "Terminus selected");
        self.selection.write().map_err(|_| Self::poisoned())?.terminus = Some(name);
        Ok(())
    }

    /// Name of the cache terminus, if any
    pub fn cache_class(&self) -> Result<Option<String>> {
        if let Some(cache) = &self.selection.read().map_err(|_| Self::poisoned())?.cache {
            return Ok(cache.clone());
        }
        Ok(self
            .settings
            .cache_for(&self.spec.name)
            .map(str::to_string)
            .or_else(|| self.spec.cache_class.clone()))
    }

    /// Override the cache terminus; `None` disables caching
    pub fn set_cache_class(&self, name: Option<String>) -> Result<()> {
        info!(indirection = %self.spec.name, cache = ?name, "Cache selected");
        self.selection.write().map_err(|_| Self::poisoned())?.cache = Some(name);
        Ok(())
    }

    /// Forget the memoized selection and terminus instances
    pub fn invalidate(&self) -> Result<()> {
        *self.selection.write().map_err(|_| Self::poisoned())? = Selection::default();
        self.termini.write().map_err(|_| Self::poisoned())?.clear();
        debug!(indirection = %self.spec.name, "Terminus selection invalidated");
        Ok(())
    }

    /// Terminus instance by name, or the authoritative one
    ///
    /// Instances are created on first use. Concurrent first accesses may each
    /// build one, but only the first stored instance is ever handed out.
    pub fn terminus(&self, name: Option<&str>) -> Result<Arc<dyn Terminus>> {
        let name = match name {
            Some(name) => name.to_string(),
            None => self.terminus_class()?,
        };
        self.terminus_within(&name, &[])
    }

    /// Terminus `name`, built on behalf of the termini in `resolving`
    pub(crate) fn terminus_within(&self, name: &str, resolving: &[String]) -> Result<Arc<dyn Terminus>> {
        if resolving.iter().any(|outer| outer == name) {
            let chain: Vec<&str> = resolving
                .iter()
                .map(String::as_str)
                .chain(std::iter::once(name))
                .collect();
            return Err(IndirectorError::terminus(format!(
                "Termini of {} delegate in a cycle: {}",
                self.spec.name,
                chain.join(" -> ")
            )));
        }

        if let Some(existing) = self.termini.read().map_err(|_| Self::poisoned())?.get(name) {
            return Ok(existing.clone());
        }

        let options = self.settings.terminus_options(&self.spec.name, name);
        let kind = options.get_str("kind").unwrap_or(name).to_string();
        let mut chain = resolving.to_vec();
        chain.push(name.to_string());
        let ctx = TerminusContext {
            name,
            indirection: self,
            options: options.clone(),
            settings: &self.settings,
            resolving: &chain,
        };
        let built = self.factories.build(&kind, &ctx)?;

        let mut termini = self.termini.write().map_err(|_| Self::poisoned())?;
        let stored = termini.entry(name.to_string()).or_insert_with(|| {
            info!(indirection = %self.spec.name, terminus = %name, kind = %kind, "Created terminus");
            built
        });
        Ok(stored.clone())
    }

    fn cache(&self) -> Result<Option<(String, Arc<dyn Terminus>)>> {
        match self.cache_class()? {
            Some(name) => {
                let terminus = self.terminus(Some(&name))?;
                Ok(Some((name, terminus)))
            }
            None => Ok(None),
        }
    }

    fn authoritative(&self) -> Result<(String, Arc<dyn Terminus>)> {
        let name = self.terminus_class()?;
        let terminus = self.terminus(Some(&name))?;
        Ok((name, terminus))
    }

    /// Whether the HTTP layer may route network requests here
    pub fn allow_remote_requests(&self) -> Result<bool> {
        Ok(self.authoritative()?.1.allow_remote_requests())
    }

    /// Build a request addressed to this indirection
    pub fn request(
        &self,
        method: Method,
        key: &str,
        options: Options,
        instance: Option<Instance>,
    ) -> Result<Request> {
        Request::new(self.spec.name.clone(), method, key, options, instance)
    }

    pub async fn find(&self, key: &str, options: Options) -> Result<Option<Instance>> {
        let request = self.request(Method::Find, key, options, None)?;
        self.find_request(&request).await
    }

    pub async fn head(&self, key: &str, options: Options) -> Result<bool> {
        let request = self.request(Method::Head, key, options, None)?;
        self.head_request(&request).await
    }

    pub async fn search(&self, key: &str, options: Options) -> Result<Vec<Instance>> {
        let request = self.request(Method::Search, key, options, None)?;
        self.search_request(&request).await
    }

    pub async fn save(&self, instance: Instance, options: Options) -> Result<Instance> {
        let key = instance.name.clone();
        let request = self.request(Method::Save, &key, options, Some(instance))?;
        self.save_request(&request).await
    }

    pub async fn destroy(&self, key: &str, options: Options) -> Result<Option<Instance>> {
        let request = self.request(Method::Destroy, key, options, None)?;
        self.destroy_request(&request).await
    }

    /// Run a prepared request
    pub async fn dispatch(&self, request: &Request) -> Result<Outcome> {
        match request.method() {
            Method::Find => self.find_request(request).await.map(Outcome::Found),
            Method::Search => self.search_request(request).await.map(Outcome::Many),
            Method::Save => self.save_request(request).await.map(Outcome::Saved),
            Method::Destroy => self.destroy_request(request).await.map(Outcome::Destroyed),
            Method::Head => self.head_request(request).await.map(Outcome::Exists),
        }
    }

    fn expiration_from_now(&self) -> chrono::DateTime<Utc> {
        let secs = self.ttl().as_secs().min(u32::MAX as u64) as i64;
        Utc::now() + chrono::Duration::seconds(secs)
    }

    async fn find_request(&self, request: &Request) -> Result<Option<Instance>> {
        let (terminus_name, terminus) = self.authoritative()?;
        terminus
            .validate(request)
            .map_err(|e| e.annotate(self.name(), &terminus_name))?;

        let cache = self.cache()?;

        if let (Some((cache_name, cache)), false) = (&cache, request.options().ignore_cache) {
            match cache.find(request).await {
                Ok(Some(cached)) => {
                    if self.is_fresh(&cached, request) {
                        debug!(
                            indirection = %self.spec.name,
                            key = %request.key(),
                            cache = %cache_name,
                            "Using cached instance"
                        );
                        return Ok(Some(cached));
                    }
                    debug!(indirection = %self.spec.name, key = %request.key(), "Cached instance is stale");
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(
                        indirection = %self.spec.name,
                        key = %request.key(),
                        cache = %cache_name,
                        error = %e,
                        "Cached instance could not be read; treating as a miss"
                    );
                }
            }
        }

        if request.options().ignore_terminus {
            return Ok(None);
        }

        let found = terminus
            .find(request)
            .await
            .map_err(|e| e.annotate(self.name(), &terminus_name))?;

        let Some(mut instance) = found else {
            return Ok(None);
        };

        if instance.expiration().is_none() {
            self.spec
                .model
                .set_expiration(&mut instance, self.expiration_from_now());
        }

        if let Some((cache_name, cache)) = &cache {
            self.write_cache(cache_name, cache.as_ref(), request, &instance).await;
        }

        Ok(Some(instance))
    }

    fn is_fresh(&self, cached: &Instance, request: &Request) -> bool {
        let now = Utc::now();
        if cached.is_expired(now) {
            return false;
        }
        match request.options().fresh_after {
            Some(bound) => matches!(cached.timestamp(), Some(produced) if produced >= bound),
            None => true,
        }
    }

    async fn write_cache(
        &self,
        cache_name: &str,
        cache: &dyn Terminus,
        request: &Request,
        instance: &Instance,
    ) {
        let save = match request.derive(Method::Save, Some(instance.clone())) {
            Ok(save) => save,
            Err(e) => {
                warn!(indirection = %self.spec.name, error = %e, "Could not build cache request");
                return;
            }
        };
        match cache.save(&save).await {
            Ok(_) => info!(
                indirection = %self.spec.name,
                key = %request.key(),
                cache = %cache_name,
                "Cached instance"
            ),
            Err(e) => warn!(
                indirection = %self.spec.name,
                key = %request.key(),
                cache = %cache_name,
                error = %e,
                "Could not write instance to cache"
            ),
        }
    }

    async fn head_request(&self, request: &Request) -> Result<bool> {
        let (terminus_name, terminus) = self.authoritative()?;
        terminus
            .validate(request)
            .map_err(|e| e.annotate(self.name(), &terminus_name))?;
        terminus
            .head(request)
            .await
            .map_err(|e| e.annotate(self.name(), &terminus_name))
    }

    async fn search_request(&self, request: &Request) -> Result<Vec<Instance>> {
        let (terminus_name, terminus) = self.authoritative()?;
        terminus
            .validate(request)
            .map_err(|e| e.annotate(self.name(), &terminus_name))?;
        let mut found = terminus
            .search(request)
            .await
            .map_err(|e| e.annotate(self.name(), &terminus_name))?;

        let expiration = self.expiration_from_now();
        for instance in &mut found {
            if instance.expiration().is_none() {
                self.spec.model.set_expiration(instance, expiration);
            }
        }
        Ok(found)
    }

    async fn save_request(&self, request: &Request) -> Result<Instance> {
        let instance = request.instance().ok_or_else(|| {
            IndirectorError::Validation("Save requests need an instance".into())
        })?;
        self.spec.model.validate(&instance.data)?;

        let (terminus_name, terminus) = self.authoritative()?;
        terminus
            .validate(request)
            .map_err(|e| e.annotate(self.name(), &terminus_name))?;
        let saved = terminus
            .save(request)
            .await
            .map_err(|e| e.annotate(self.name(), &terminus_name))?;

        if let Some((cache_name, cache)) = self.cache()? {
            self.write_cache(&cache_name, cache.as_ref(), request, &saved).await;
        }
        Ok(saved)
    }

    async fn destroy_request(&self, request: &Request) -> Result<Option<Instance>> {
        let (terminus_name, terminus) = self.authoritative()?;
        terminus
            .validate(request)
            .map_err(|e| e.annotate(self.name(), &terminus_name))?;
        let destroyed = terminus
            .destroy(request)
            .await
            .map_err(|e| e.annotate(self.name(), &terminus_name))?;

        if let Some((cache_name, cache)) = self.cache()? {
            if let Err(e) = cache.destroy(request).await {
                warn!(
                    indirection = %self.spec.name,
                    key = %request.key(),
                    cache = %cache_name,
                    error = %e,
                    "Could not remove cached instance"
                );
            }
        }
        Ok(destroyed)
    }

    /// Mark the cached copy of `key` as expired
    ///
    /// Returns whether a cached copy existed.
    pub async fn expire(&self, key: &str, options: Options) -> Result<bool> {
        let Some((cache_name, cache)) = self.cache()? else {
            return Ok(false);
        };
        let request = self.request(Method::Find, key, options, None)?;
        let cached = cache
            .find(&request)
            .await
            .map_err(|e| e.annotate(self.name(), &cache_name))?;
        let Some(mut instance) = cached else {
            return Ok(false);
        };

        info!(indirection = %self.spec.name, key = %key, "Expiring cached instance");
        self.spec
            .model
            .set_expiration(&mut instance, Utc::now() - chrono::Duration::seconds(1));
        let save = request.derive(Method::Save, Some(instance))?;
        cache
            .save(&save)
            .await
            .map_err(|e| e.annotate(self.name(), &cache_name))?;
        Ok(true)
    }
}

impl std::fmt::Debug for Indirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Indirection")
            .field("name", &self.spec.name)
            .field("model", &self.spec.model)
            .finish()
    }
}
