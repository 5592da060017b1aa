pub mod chunks;
pub mod documents;
pub mod search;
pub mod store;
pub mod vector;

pub use chunks::ChunkRow;
pub use documents::{DocumentMeta, UpsertOutcome};
pub use search::escape_fts_query;
pub use store::{DbError, IndexStore, Result};
pub use vector::{pack_vector, unpack_vector};
