//! Static cache engine.
//!
//! Decides, for every logical path, whether the artifact on disk is still
//! valid. Validity is the conjunction of an unexpired entry and a tag checksum
//! equal to the one stored when the artifact was written:
//!
//! ```toml
//! [cache]
//! exclude_patterns = ["^/preview/.*", "literal:/cart"]
//! content_types = ["article", "page"]
//! ```

mod checksum;
mod config;
mod exclusion;
mod gc;
mod index;
mod keys;
mod lock;

pub use checksum::{InMemoryTagChecksums, TagChecksumProvider, checksum_from_counts};
pub use config::CacheConfig;
pub use exclusion::{ExclusionFilter, ExclusionRule};
pub use gc::GarbageCollector;
pub use index::{CacheIndex, CacheWrite, effective_expiry};
pub use keys::{CacheId, compute_cache_id, normalize_path};
