//! Tenant schema vocabulary: flattening template documents into queryable
//! field paths and memoizing the result per tenant.

pub mod cache;
pub mod flatten;
pub mod vocabulary;

pub use cache::{CachedSchema, SchemaCache};
pub use flatten::{flatten, flattened_path, EntityTemplateIndex, FIELDS_DATA_CONTAINER};
pub use vocabulary::Vocabulary;
