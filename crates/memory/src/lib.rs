//! Storage for llmcraft: session history, the document vector index, and
//! the ingestion pipeline that feeds it.

pub mod in_memory;
pub mod loader;
pub mod splitter;
pub mod vector;

pub use in_memory::InMemorySessionStore;
pub use loader::{SourceDocument, load_documents};
pub use splitter::TextSplitter;
pub use vector::{FlatVectorIndex, squared_l2};
