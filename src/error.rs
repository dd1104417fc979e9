/*!
Defines the closed [Error] enumeration and [Result] alias used across the crate.
*/

use thiserror::Error;

use crate::schema::validator::FieldError;

/// The closed set of error kinds a caller of this crate can observe.
///
/// Every variant carries structured fields; none require parsing a message
/// to recover machine-readable detail. Stack traces are never part of the
/// contract.
#[derive(Error, Debug)]
pub enum Error {
    /// One or more attribute values failed validator constraints.
    #[error("validation failed: {0:?}")]
    ValidationFailed(Vec<FieldError>),

    /// The encoded envelope exceeds the metadata budget and the resource's
    /// behavior does not tolerate it.
    #[error("metadata too large: {size} bytes exceeds budget of {budget} bytes")]
    MetadataTooLarge {
        /// Size of the offending envelope, in bytes.
        size: usize,
        /// The configured budget, in bytes.
        budget: usize,
    },

    /// A dot-notation patch would silently drop sibling fields of a nested
    /// object and was rejected rather than applied lossily.
    #[error("patch at `{0}` would drop sibling fields of a nested object")]
    PartialObjectPatchRejected(String),

    /// The requested entity does not exist.
    #[error("{kind} not found: {key}")]
    NotFound {
        /// What kind of entity was missing (`"record"`, `"resource"`, `"catalog"`, ...).
        kind: &'static str,
        /// The key or id that was looked up.
        key: String,
    },

    /// A conditional write lost a race (etag mismatch) or a unique
    /// constraint was violated.
    #[error("conflict on `{key}`: {detail}")]
    Conflict {
        /// The key the conflicting write targeted.
        key: String,
        /// Human-readable detail about the conflict.
        detail: String,
    },

    /// The catalog document failed to parse and automated recovery could
    /// not repair it (or repair is disabled).
    #[error("catalog corrupt: {0}")]
    CatalogCorrupt(String),

    /// A partition rule string did not match any recognised grammar.
    #[error("invalid partition rule: {0}")]
    PartitionRuleInvalid(String),

    /// An operation was blocked because it depends on a partition whose
    /// declared fields no longer exist in the schema.
    #[error("operation blocked by orphaned partition `{0}`")]
    OrphanedPartitionBlocked(String),

    /// The caller's credentials do not authorise this operation.
    #[error("permission denied")]
    PermissionDenied,

    /// The backing object store asked the caller to slow down.
    #[error("throttled by object store")]
    Throttled,

    /// The backing object store is temporarily unavailable.
    #[error("object store unavailable: {0}")]
    Unavailable(String),

    /// A `secret` codec operation failed. Never carries ciphertext or key
    /// material, to avoid leaking anything useful to an attacker via logs.
    #[error("cryptographic operation failed")]
    CryptoFailure,

    /// An invariant the crate itself is responsible for was violated, or an
    /// unclassified lower-level error occurred.
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Wrap an arbitrary display-able cause as an [`Error::Internal`].
    pub fn internal(cause: impl std::fmt::Display) -> Self {
        Error::Internal(cause.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Internal(format!("json: {err}"))
    }
}

/// The crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;
