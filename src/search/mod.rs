//! Tag-scoped search: filters, execution, and result shaping.

pub mod executor;
pub mod filter;
pub mod types;

pub use executor::{NO_RESULT_LIMIT, SearchError, SearchExecutor};
pub use filter::{CHAT_TAG, MEMORY_TAG, SearchFilter};
pub use types::{Answer, Citation, Partition, SearchResult};
