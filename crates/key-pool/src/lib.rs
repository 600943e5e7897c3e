//! Credential rotation pool
//!
//! Holds the named credentials of one key-type family (API keys, or cookie
//! pairs), hands out the first usable one per request, and quarantines
//! credentials that callers report as bad. Quarantine state lives in a
//! `QuarantineStore` so it survives restarts and can be shared by several
//! pools.
//!
//! Credential lifecycle:
//! 1. Pool scans `{KEY_TYPE}_{i}` entries from its `CredentialSource`
//! 2. `acquire()` prunes expired quarantine entries, returns first eligible credential
//! 3. Caller hits a transport/auth failure → `release_bad(name)` quarantines it
//! 4. Entry older than the TTL (24h) → ignored and pruned on next `acquire()`
//! 5. Every credential quarantined → store reset, credentials reloaded

pub mod audit;
pub mod credential;
pub mod error;
pub mod pool;
pub mod source;
pub mod store;

pub use audit::AuditLog;
pub use credential::{Credential, CredentialShape};
pub use error::{Error, Result};
pub use pool::{DEFAULT_MAX_KEYS, DEFAULT_QUARANTINE_TTL, KeyPool, PoolConfig};
pub use source::{CredentialSource, EnvSource, load_credentials};
pub use store::{JsonFileStore, MemoryStore, QuarantineMap, QuarantineStore};
