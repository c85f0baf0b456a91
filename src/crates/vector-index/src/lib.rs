//! In-memory cosine-similarity vector index, and the experience memory
//! (router-success / revision-mistake recall) built directly on top of it.
//!
//! # Modules
//!
//! - `index` - `VectorIndex`: store (id, vector, payload, metadata), cosine
//!   top-k query with oversample-then-dedup-then-threshold scan order.
//! - `experience` - `ExperienceMemory`: dedup-by-question disk persistence
//!   plus a `VectorIndex`, shared by the Router and Code Reviser.

pub mod error;
pub mod experience;
pub mod index;

pub use error::{Result, VectorIndexError};
pub use experience::{ExperienceMemory, ExperienceRecord};
pub use index::{DedupKey, Entry, QueryResult, VectorIndex};
