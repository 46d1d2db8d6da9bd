//! # Indirector Termini
//!
//! Concrete backends for indirections, and the factory map that builds them
//! from settings.
//!
//! ## Terminus kinds
//!
//! | Kind | Backend |
//! |------|---------|
//! | `memory` | In-process hashmap |
//! | `file`, `json`, `yaml` | One file per key under a directory |
//! | `rest` | Remote server over HTTP |
//! | `aggregate` | Several sibling termini |
//! | `read_only` | Sibling terminus with writes refused |
//! | `disabled` | Always a miss; not reachable remotely |
//! | `facter` | Facts about the running host |
//! | `local` | Liveness of this process |
//! | `postgres` | PostgreSQL table (feature `postgres`) |
//!
//! A terminus is configured under `[termini.<indirection>.<name>]`. The table
//! may set `kind` to build a terminus of one kind under another name, e.g. a
//! second `yaml` terminus used as a cache.

pub mod termini;

use indirector_core::{Format, IndirectorError, Result, Terminus, TerminusContext, TerminusFactories};
use std::path::PathBuf;
use std::sync::Arc;

pub use termini::*;

fn file_terminus(ctx: &TerminusContext<'_>, format: Format) -> Result<Arc<dyn Terminus>> {
    let directory = ctx
        .options
        .get_str("path")
        .map(PathBuf::from)
        .unwrap_or_else(|| ctx.settings.data_dir.join(ctx.indirection_name()));
    let mut terminus = FileTerminus::new(ctx.name, directory, format, ctx.model().clone());
    if let Some(extension) = ctx.options.get_str("extension") {
        terminus = terminus.with_extension(extension);
    }
    Ok(Arc::new(terminus))
}

fn rest_terminus(ctx: &TerminusContext<'_>) -> Result<Arc<dyn Terminus>> {
    let base_url = match ctx.options.get_str("url") {
        Some(url) => url.to_string(),
        None => {
            let server = ctx.options.get_str("server").unwrap_or(&ctx.settings.server);
            let port = ctx
                .options
                .get_u64("port")
                .map(|p| p as u16)
                .unwrap_or(ctx.settings.port);
            format!("https://{}:{}", server, port)
        }
    };
    let terminus = RestTerminus::new(
        ctx.name,
        ctx.indirection_name(),
        base_url,
        ctx.model().clone(),
        ctx.settings.connect_timeout(),
        ctx.settings.read_timeout(),
    )?;
    Ok(Arc::new(terminus))
}

fn aggregate_terminus(ctx: &TerminusContext<'_>) -> Result<Arc<dyn Terminus>> {
    let policy = match ctx.options.get_str("policy") {
        Some(policy) => policy.parse()?,
        None => ConflictPolicy::default(),
    };
    let children = ctx
        .options
        .get_list("termini")
        .into_iter()
        .map(|name| ctx.sibling(&name).map(|child| (name, child)))
        .collect::<Result<Vec<_>>>()?;
    Ok(Arc::new(AggregateTerminus::new(
        ctx.name,
        ctx.indirection_name(),
        children,
        policy,
    )?))
}

fn read_only_terminus(ctx: &TerminusContext<'_>) -> Result<Arc<dyn Terminus>> {
    let inner = ctx.options.get_str("terminus").ok_or_else(|| {
        IndirectorError::terminus(format!(
            "Read-only terminus '{}' of {} names no terminus to wrap",
            ctx.name,
            ctx.indirection_name()
        ))
    })?;
    Ok(Arc::new(ReadOnlyTerminus::new(ctx.name, ctx.sibling(inner)?)))
}

fn facter_terminus(ctx: &TerminusContext<'_>) -> Result<Arc<dyn Terminus>> {
    let mut terminus = FacterTerminus::new(ctx.name);
    if let Some(serde_json::Value::Object(facts)) = ctx.options.0.get("static") {
        terminus = terminus.with_static_facts(facts.clone());
    }
    Ok(Arc::new(terminus))
}

#[cfg(feature = "postgres")]
fn postgres_terminus(ctx: &TerminusContext<'_>) -> Result<Arc<dyn Terminus>> {
    let url = ctx
        .options
        .get_str("database_url")
        .map(str::to_string)
        .or_else(|| std::env::var("DATABASE_URL").ok())
        .ok_or_else(|| IndirectorError::terminus("No database_url configured for postgres terminus"))?;
    Ok(Arc::new(PostgresTerminus::connect_lazy(
        ctx.name,
        ctx.indirection_name(),
        &url,
    )?))
}

/// Factory map with every built-in terminus kind
pub fn builtin_factories() -> TerminusFactories {
    let factories = TerminusFactories::new()
        .with("memory", |ctx| Ok(Arc::new(MemoryTerminus::new(ctx.name)) as Arc<dyn Terminus>))
        .with("file", |ctx| file_terminus(ctx, ctx.model().default_format()))
        .with("json", |ctx| file_terminus(ctx, Format::Json))
        .with("yaml", |ctx| file_terminus(ctx, Format::Yaml))
        .with("rest", rest_terminus)
        .with("aggregate", aggregate_terminus)
        .with("read_only", read_only_terminus)
        .with("disabled", |ctx| Ok(Arc::new(DisabledTerminus::new(ctx.name)) as Arc<dyn Terminus>))
        .with("facter", facter_terminus)
        .with("local", |ctx| Ok(Arc::new(StatusTerminus::new(ctx.name)) as Arc<dyn Terminus>));

    #[cfg(feature = "postgres")]
    let factories = factories.with("postgres", postgres_terminus);

    factories
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_kinds() {
        let kinds = builtin_factories().kinds();
        for kind in ["memory", "file", "json", "yaml", "rest", "aggregate", "read_only", "disabled", "facter", "local"] {
            assert!(kinds.contains(&kind.to_string()), "missing {}", kind);
        }
    }
}
