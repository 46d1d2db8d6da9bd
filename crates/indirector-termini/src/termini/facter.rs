//! Local fact gathering
//!
//! Reports a small set of facts about the running host. Configured static
//! facts (`[termini.facts.facter] static = { ... }`) are merged on top.

use async_trait::async_trait;
use indirector_core::models::Facts;
use indirector_core::{Capabilities, Instance, Method, Model, Request, Result, Terminus};
use serde_json::{Map, Value};

#[derive(Debug)]
pub struct FacterTerminus {
    name: String,
    static_facts: Map<String, Value>,
}

impl FacterTerminus {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            static_facts: Map::new(),
        }
    }

    pub fn with_static_facts(mut self, facts: Map<String, Value>) -> Self {
        self.static_facts = facts;
        self
    }

    fn hostname() -> String {
        std::env::var("HOSTNAME")
            .ok()
            .filter(|h| !h.is_empty())
            .or_else(|| {
                std::fs::read_to_string("/proc/sys/kernel/hostname")
                    .ok()
                    .map(|h| h.trim().to_string())
            })
            .unwrap_or_else(|| "localhost".to_string())
    }

    /// Facts for the running host, named `name`
    pub fn gather(&self, name: &str) -> Facts {
        let processors = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);

        let mut facts = Facts::new(name)
            .with_fact("hostname", Self::hostname())
            .with_fact("kernel", std::env::consts::OS)
            .with_fact("osfamily", std::env::consts::FAMILY)
            .with_fact("architecture", std::env::consts::ARCH)
            .with_fact("processorcount", processors as u64);
        for (fact, value) in &self.static_facts {
            facts.values.insert(fact.clone(), value.clone());
        }
        facts
    }
}

#[async_trait]
impl Terminus for FacterTerminus {
    fn name(&self) -> &str {
        &self.name
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::only(&[Method::Find])
    }

    /// Facts describe this host only; remote callers submit their own
    fn allow_remote_requests(&self) -> bool {
        false
    }

    async fn find(&self, request: &Request) -> Result<Option<Instance>> {
        self.gather(request.key()).to_instance().map(Some)
    }
}
