//! # Indirector Core
//!
//! Named, typed dispatch from operations on resources to the backends that
//! serve them.
//!
//! An [`Indirection`] binds a name (e.g. `facts`) to a model and to a set of
//! [`Terminus`] backends. Callers build a [`Request`] (method, key, options)
//! and the indirection resolves the configured terminus, applies its cache
//! policy and returns canonical [`Instance`] values.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use indirector_core::{Options, Registry, Settings};
//!
//! let registry = Registry::with_standard_indirections(settings, factories)?;
//! let facts = registry.get("facts").expect("registered at start-up");
//! let found = facts.find("agent1.example.com", Options::new()).await?;
//! ```

pub mod error;
pub mod filter;
pub mod format;
pub mod indirection;
pub mod model;
pub mod models;
pub mod naming;
pub mod registry;
pub mod request;
pub mod settings;
pub mod terminus;

pub use error::{IndirectorError, Result};
pub use filter::Filter;
pub use format::Format;
pub use indirection::{Indirection, IndirectionSpec, Outcome};
pub use model::{Instance, Model, ModelSpec, DEFAULT_FORMATS};
pub use naming::{category_for, PluralizationRules};
pub use registry::Registry;
pub use request::{escape_segment, unescape_segment, Method, Options, Request};
pub use settings::{RunMode, Settings, SettingsError, TerminusOptions};
pub use terminus::{Capabilities, Terminus, TerminusContext, TerminusFactories};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
