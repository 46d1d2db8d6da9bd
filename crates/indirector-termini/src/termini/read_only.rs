//! Read-only wrapper around a sibling terminus

use async_trait::async_trait;
use indirector_core::{Capabilities, IndirectorError, Instance, Request, Result, Terminus};
use std::sync::Arc;

/// Answers reads from the wrapped terminus and refuses writes
#[derive(Debug)]
pub struct ReadOnlyTerminus {
    name: String,
    inner: Arc<dyn Terminus>,
}

impl ReadOnlyTerminus {
    pub fn new(name: impl Into<String>, inner: Arc<dyn Terminus>) -> Self {
        Self {
            name: name.into(),
            inner,
        }
    }

    fn refuse(&self, request: &Request) -> IndirectorError {
        IndirectorError::Dev(format!(
            "{} of {} is not supported from this source",
            request.method(),
            request.indirection()
        ))
    }
}

#[async_trait]
impl Terminus for ReadOnlyTerminus {
    fn name(&self) -> &str {
        &self.name
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::read_only()
    }

    fn allow_remote_requests(&self) -> bool {
        self.inner.allow_remote_requests()
    }

    fn validate(&self, request: &Request) -> Result<()> {
        self.inner.validate(request)
    }

    async fn find(&self, request: &Request) -> Result<Option<Instance>> {
        self.inner.find(request).await
    }

    async fn search(&self, request: &Request) -> Result<Vec<Instance>> {
        self.inner.search(request).await
    }

    async fn head(&self, request: &Request) -> Result<bool> {
        self.inner.head(request).await
    }

    async fn save(&self, request: &Request) -> Result<Instance> {
        Err(self.refuse(request))
    }

    async fn destroy(&self, request: &Request) -> Result<Option<Instance>> {
        Err(self.refuse(request))
    }
}
