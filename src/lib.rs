#![deny(missing_docs)]
/*!
# s3doc-core

A storage core for a lightweight document database layered over an
S3-compatible object store. Resources are schemas compiled once and shared
across threads; records are encoded into S3 object user-metadata (with
optional body overflow) and kept queryable through a deterministic
partition-reference key scheme. A single JSON catalog document tracks every
resource's version history.

Nine collaborating pieces:
* [`store`] — the narrow [`ObjectStoreCapability`](store::ObjectStoreCapability) trait,
  an in-memory double, and an S3-backed implementation.
* [`codec`] — deterministic type codecs between typed values and wire strings.
* [`schema`] — the compiler from a user-authored attribute tree to a
  [`CompiledSchema`](schema::CompiledSchema).
* [`size`] — the exact byte-size calculator for a candidate metadata envelope.
* [`behavior`] — the closed set of metadata/body split strategies.
* [`partition`] — canonical partition-reference key construction and upkeep.
* [`record`] — the [`Record`](record::Record)/[`Envelope`](record::Envelope) data model.
* [`catalog`] — the catalog document, its self-healing pipeline, and events.
* [`plugin`] — an isolated storage namespace for plugin-owned state.

[`lifecycle`] composes all of the above into the eight record operations a
resource supports.
*/
pub mod behavior;
pub mod catalog;
pub mod codec;
pub mod error;
pub mod lifecycle;
pub mod partition;
pub mod plugin;
pub mod record;
pub mod schema;
pub mod size;
pub mod store;

pub use object_store;
