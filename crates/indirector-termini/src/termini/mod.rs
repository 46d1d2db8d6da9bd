//! Terminus implementations

pub mod aggregate;
pub mod disabled;
pub mod facter;
pub mod file;
pub mod memory;
#[cfg(feature = "postgres")]
pub mod postgres;
pub mod read_only;
pub mod rest;
pub mod status;

pub use aggregate::{AggregateTerminus, ConflictPolicy};
pub use disabled::DisabledTerminus;
pub use facter::FacterTerminus;
pub use file::FileTerminus;
pub use memory::MemoryTerminus;
#[cfg(feature = "postgres")]
pub use postgres::PostgresTerminus;
pub use read_only::ReadOnlyTerminus;
pub use rest::RestTerminus;
pub use status::StatusTerminus;
