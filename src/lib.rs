//! Copy a record and everything reachable from it through chosen relationships from one
//! SQLite environment to another.
//!
//! [`identify_associations`] discovers a traversal descriptor from relationship metadata,
//! [`normalize`] turns any descriptor into a canonical plan, and [`SyncEngine`] walks that
//! plan over live rows and writes the identified set to the destination.
//! Run Criterion benchmarks with `cargo bench` to inspect reports under `target/criterion`.

pub mod association;
pub mod bench_utils;
pub mod cache;
pub mod client;
pub mod config;
pub mod descriptor;
pub mod environment;
pub mod errors;
pub mod hint;
pub mod introspect;
pub mod normalize;
pub mod record;
pub mod resolver;
pub mod schema;
pub mod sqlite_store;
pub mod store;
pub mod sync;

pub use crate::config::{EnvironmentConfig, SqliteConfig, SyncConfig};
pub use crate::descriptor::Descriptor;
pub use crate::environment::{EnvironmentGuard, Environments};
pub use crate::errors::SyncError;
pub use crate::hint::{BasicHint, Candidate, Hint, HintPolicy};
pub use crate::introspect::Introspector;
pub use crate::normalize::{AssociationPath, CanonicalDescriptor, Nested, normalize};
pub use crate::record::{Attributes, IdentifiedRecords, Record, RecordKey};
pub use crate::resolver::identify_associations;
pub use crate::schema::{ModelDef, Relationship, Schema, SchemaProvider};
pub use crate::sqlite_store::SqliteStore;
pub use crate::store::{Filter, JoinRow, Store};
pub use crate::sync::{Selector, SyncEngine, SyncReport, SyncRequest};
