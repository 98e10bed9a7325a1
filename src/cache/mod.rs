//! Local archive cache
//!
//! Archives are stored under `<root>/<project>/<resolved id>[.zip]`. A
//! resolved identifier always names the same bytes, so a record is written
//! once and never replaced.
//!
//! # Write protocol
//!
//! - Stream into a temporary file in the record's directory
//! - Hash while streaming and verify against the pinned SHA-256, if any
//! - Rename into place without clobbering an existing record
//!
//! Readers never observe a truncated record. Concurrent processes sharing
//! one cache root are not coordinated.

pub mod key;
pub mod store;
pub mod usage;

pub use key::CacheKey;
pub use store::{hash_file, Cache, CacheRecord};
pub use usage::{format_bytes, ProjectUsage};
