//! Local liveness terminus

use async_trait::async_trait;
use indirector_core::models::Status;
use indirector_core::{Capabilities, Instance, Method, Model, Request, Result, Terminus};

/// Answers every find with "alive"
#[derive(Debug)]
pub struct StatusTerminus {
    name: String,
}

impl StatusTerminus {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait]
impl Terminus for StatusTerminus {
    fn name(&self) -> &str {
        &self.name
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::only(&[Method::Find])
    }

    async fn find(&self, request: &Request) -> Result<Option<Instance>> {
        Status::alive(request.key()).to_instance().map(Some)
    }
}
