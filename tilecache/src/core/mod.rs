pub mod error;
pub mod lru;
pub mod types;

pub use error::{CacheError, Result};
pub use lru::LruContainer;
pub use types::{CacheKey, CacheReport, EntryKind};
