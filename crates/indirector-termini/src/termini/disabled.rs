//! Terminus for sources that are switched off
//!
//! A process that is not a certificate authority still registers the CA
//! indirections; they answer every find with a miss and refuse writes.

use async_trait::async_trait;
use indirector_core::{Capabilities, IndirectorError, Instance, Method, Request, Result, Terminus};

#[derive(Debug)]
pub struct DisabledTerminus {
    name: String,
}

impl DisabledTerminus {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
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
impl Terminus for DisabledTerminus {
    fn name(&self) -> &str {
        &self.name
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::only(&[Method::Find])
    }

    fn allow_remote_requests(&self) -> bool {
        false
    }

    async fn find(&self, _request: &Request) -> Result<Option<Instance>> {
        Ok(None)
    }

    async fn save(&self, request: &Request) -> Result<Instance> {
        Err(self.refuse(request))
    }

    async fn destroy(&self, request: &Request) -> Result<Option<Instance>> {
        Err(self.refuse(request))
    }
}
