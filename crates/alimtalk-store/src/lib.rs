//! Storage layer: policy document fetching and the persistent passage index.

mod error;
pub use error::StoreError;

pub mod index;
pub mod object;

pub use index::{MemoryIndex, PassageIndex};
pub use object::{FsObjectStore, HttpObjectStore, ObjectStore, source_text};

#[cfg(feature = "lancedb")]
mod lance;
#[cfg(feature = "lancedb")]
pub use lance::LanceIndex;
