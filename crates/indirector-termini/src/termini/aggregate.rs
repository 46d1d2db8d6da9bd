//! Aggregating terminus
//!
//! Serves an indirection from several sibling termini. Reads consult the
//! children in order, searches merge by instance name, and writes fan out to
//! every child that supports them.

use async_trait::async_trait;
use indirector_core::{
    Capabilities, IndirectorError, Instance, Method, Request, Result, Terminus,
};
use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::Arc;

/// Which child wins when two return an instance with the same name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConflictPolicy {
    #[default]
    LastWins,
    FirstWins,
}

impl FromStr for ConflictPolicy {
    type Err = IndirectorError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "last_wins" => Ok(ConflictPolicy::LastWins),
            "first_wins" => Ok(ConflictPolicy::FirstWins),
            other => Err(IndirectorError::terminus(format!(
                "Unknown aggregate conflict policy: {}",
                other
            ))),
        }
    }
}

/// Terminus delegating to an ordered list of children
#[derive(Debug)]
pub struct AggregateTerminus {
    name: String,
    indirection: String,
    children: Vec<(String, Arc<dyn Terminus>)>,
    policy: ConflictPolicy,
}

impl AggregateTerminus {
    pub fn new(
        name: impl Into<String>,
        indirection: impl Into<String>,
        children: Vec<(String, Arc<dyn Terminus>)>,
        policy: ConflictPolicy,
    ) -> Result<Self> {
        let name = name.into();
        if children.len() < 2 {
            return Err(IndirectorError::terminus(format!(
                "Aggregate terminus '{}' needs at least two children",
                name
            )));
        }
        Ok(Self {
            name,
            indirection: indirection.into(),
            children,
            policy,
        })
    }

    fn supporting(&self, method: Method) -> impl Iterator<Item = &(String, Arc<dyn Terminus>)> {
        self.children
            .iter()
            .filter(move |(_, child)| child.capabilities().supports(method))
    }

    fn none_support(&self, method: Method) -> IndirectorError {
        IndirectorError::OperationNotSupported {
            indirection: self.indirection.clone(),
            terminus: self.name.clone(),
            operation: method,
        }
    }
}

#[async_trait]
impl Terminus for AggregateTerminus {
    fn name(&self) -> &str {
        &self.name
    }

    fn capabilities(&self) -> Capabilities {
        self.children
            .iter()
            .fold(Capabilities::default(), |caps, (_, child)| {
                caps.union(&child.capabilities())
            })
    }

    fn allow_remote_requests(&self) -> bool {
        self.children.iter().all(|(_, child)| child.allow_remote_requests())
    }

    fn validate(&self, request: &Request) -> Result<()> {
        for (_, child) in &self.children {
            child.validate(request)?;
        }
        Ok(())
    }

    async fn find(&self, request: &Request) -> Result<Option<Instance>> {
        for (name, child) in self.supporting(Method::Find) {
            let found = child
                .find(request)
                .await
                .map_err(|e| e.annotate(&self.indirection, name))?;
            if found.is_some() {
                return Ok(found);
            }
        }
        Ok(None)
    }

    async fn head(&self, request: &Request) -> Result<bool> {
        for (name, child) in self.supporting(Method::Head) {
            if child
                .head(request)
                .await
                .map_err(|e| e.annotate(&self.indirection, name))?
            {
                return Ok(true);
            }
        }
        Ok(false)
    }

    async fn search(&self, request: &Request) -> Result<Vec<Instance>> {
        let mut merged: BTreeMap<String, Instance> = BTreeMap::new();
        for (name, child) in self.supporting(Method::Search) {
            let found = child
                .search(request)
                .await
                .map_err(|e| e.annotate(&self.indirection, name))?;
            for instance in found {
                match self.policy {
                    ConflictPolicy::LastWins => {
                        merged.insert(instance.name.clone(), instance);
                    }
                    ConflictPolicy::FirstWins => {
                        merged.entry(instance.name.clone()).or_insert(instance);
                    }
                }
            }
        }
        Ok(merged.into_values().collect())
    }

    async fn save(&self, request: &Request) -> Result<Instance> {
        let mut saved = None;
        for (name, child) in self.supporting(Method::Save) {
            saved = Some(
                child
                    .save(request)
                    .await
                    .map_err(|e| e.annotate(&self.indirection, name))?,
            );
        }
        saved.ok_or_else(|| self.none_support(Method::Save))
    }

    async fn destroy(&self, request: &Request) -> Result<Option<Instance>> {
        let mut any = false;
        let mut destroyed = None;
        for (name, child) in self.supporting(Method::Destroy) {
            any = true;
            let removed = child
                .destroy(request)
                .await
                .map_err(|e| e.annotate(&self.indirection, name))?;
            destroyed = destroyed.or(removed);
        }
        if !any {
            return Err(self.none_support(Method::Destroy));
        }
        Ok(destroyed)
    }
}
