//! Terminus contract and constructor registry
//!
//! A terminus is the backend that actually serves an indirection's
//! operations. Each terminus implements some subset of the five methods; the
//! default implementations fail with `OperationNotSupported`, so a terminus
//! only writes the operations it supports and advertises them through
//! [`Terminus::capabilities`].
//!
//! Termini are never looked up by type name. A [`TerminusFactories`] map binds
//! terminus kinds (`memory`, `yaml`, `rest`, ...) to constructor functions,
//! and the indirection calls the constructor on first use.

use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap};
use std::fmt::Debug;
use std::sync::Arc;

use crate::error::{IndirectorError, Result};
use crate::indirection::Indirection;
use crate::model::{Instance, ModelSpec};
use crate::request::{Method, Request};
use crate::settings::{Settings, TerminusOptions};

/// Set of operations a terminus implements
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Capabilities(BTreeSet<Method>);

impl Capabilities {
    /// All five operations
    pub fn all() -> Self {
        Self(Method::ALL.into_iter().collect())
    }

    /// Only the given operations
    pub fn only(methods: &[Method]) -> Self {
        Self(methods.iter().copied().collect())
    }

    /// Read-side operations
    pub fn read_only() -> Self {
        Self::only(&[Method::Find, Method::Search, Method::Head])
    }

    pub fn supports(&self, method: Method) -> bool {
        self.0.contains(&method)
    }

    pub fn union(&self, other: &Capabilities) -> Self {
        Self(self.0.union(&other.0).copied().collect())
    }

    pub fn iter(&self) -> impl Iterator<Item = Method> + '_ {
        self.0.iter().copied()
    }
}

/// Error for an operation the terminus does not implement
pub fn unsupported(terminus: &str, operation: Method) -> IndirectorError {
    IndirectorError::OperationNotSupported {
        indirection: String::new(),
        terminus: terminus.to_string(),
        operation,
    }
}

/// Backend serving one indirection's operations
///
/// Implementations must be thread-safe; one instance serves every request of
/// its indirection concurrently.
#[async_trait]
pub trait Terminus: Send + Sync + Debug {
    /// Name of this terminus within its indirection
    fn name(&self) -> &str;

    /// Operations this terminus implements
    fn capabilities(&self) -> Capabilities;

    /// Whether the HTTP layer may route network requests here
    fn allow_remote_requests(&self) -> bool {
        true
    }

    /// Veto a request before it runs
    fn validate(&self, _request: &Request) -> Result<()> {
        Ok(())
    }

    async fn find(&self, _request: &Request) -> Result<Option<Instance>> {
        Err(unsupported(self.name(), Method::Find))
    }

    async fn search(&self, _request: &Request) -> Result<Vec<Instance>> {
        Err(unsupported(self.name(), Method::Search))
    }

    /// Store the request's instance, returning what was stored
    async fn save(&self, _request: &Request) -> Result<Instance> {
        Err(unsupported(self.name(), Method::Save))
    }

    /// Remove the keyed instance, returning it if it existed
    async fn destroy(&self, _request: &Request) -> Result<Option<Instance>> {
        Err(unsupported(self.name(), Method::Destroy))
    }

    async fn head(&self, _request: &Request) -> Result<bool> {
        Err(unsupported(self.name(), Method::Head))
    }
}

/// Everything a constructor needs to build a terminus
pub struct TerminusContext<'a> {
    /// Terminus name within the indirection
    pub name: &'a str,
    /// Owning indirection, used to resolve sibling termini
    pub indirection: &'a Indirection,
    /// Options from `[termini.<indirection>.<name>]`
    pub options: TerminusOptions,
    /// Process settings
    pub settings: &'a Settings,
    /// Termini being built, outermost first, ending with this one
    pub resolving: &'a [String],
}

impl TerminusContext<'_> {
    pub fn indirection_name(&self) -> &str {
        self.indirection.name()
    }

    pub fn model(&self) -> &ModelSpec {
        self.indirection.model()
    }

    /// Resolve a sibling terminus of the same indirection
    ///
    /// Fails when the sibling is already being built further up, which would
    /// otherwise recurse forever.
    pub fn sibling(&self, name: &str) -> Result<Arc<dyn Terminus>> {
        self.indirection.terminus_within(name, self.resolving)
    }
}

/// Constructor bound to a terminus kind
pub type TerminusConstructor =
    Arc<dyn Fn(&TerminusContext<'_>) -> Result<Arc<dyn Terminus>> + Send + Sync>;

/// Explicit map from terminus kind to constructor
#[derive(Clone, Default)]
pub struct TerminusFactories {
    constructors: HashMap<String, TerminusConstructor>,
}

impl TerminusFactories {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a kind to a constructor, replacing any previous binding
    pub fn register<F>(&mut self, kind: impl Into<String>, constructor: F)
    where
        F: Fn(&TerminusContext<'_>) -> Result<Arc<dyn Terminus>> + Send + Sync + 'static,
    {
        let kind = kind.into();
        tracing::debug!(kind = %kind, "Registered terminus constructor");
        self.constructors.insert(kind, Arc::new(constructor));
    }

    /// Builder form of `register`
    pub fn with<F>(mut self, kind: impl Into<String>, constructor: F) -> Self
    where
        F: Fn(&TerminusContext<'_>) -> Result<Arc<dyn Terminus>> + Send + Sync + 'static,
    {
        self.register(kind, constructor);
        self
    }

    /// Register a single prebuilt instance under a kind
    ///
    /// Every indirection resolving that kind shares the same instance, which
    /// is what tests want when they inspect a spy terminus.
    pub fn register_instance(&mut self, kind: impl Into<String>, terminus: Arc<dyn Terminus>) {
        self.register(kind, move |_ctx| Ok(terminus.clone()));
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.constructors.contains_key(kind)
    }

    pub fn kinds(&self) -> Vec<String> {
        let mut kinds: Vec<String> = self.constructors.keys().cloned().collect();
        kinds.sort();
        kinds
    }

    /// Build a terminus through the constructor for `kind`
    pub fn build(&self, kind: &str, ctx: &TerminusContext<'_>) -> Result<Arc<dyn Terminus>> {
        let constructor = self.constructors.get(kind).ok_or_else(|| {
            IndirectorError::terminus(format!(
                "Could not find terminus '{}' for indirection '{}'",
                kind,
                ctx.indirection_name()
            ))
        })?;
        constructor(ctx)
    }
}

impl std::fmt::Debug for TerminusFactories {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TerminusFactories")
            .field("kinds", &self.kinds())
            .finish()
    }
}
