pub mod client;
pub mod error;
pub mod memory;
pub mod traits;
pub mod types;

pub use client::HttpSearchClient;
pub use error::SearchError;
pub use memory::MemoryBackend;
pub use traits::SearchBackend;
pub use types::SearchRequest;
