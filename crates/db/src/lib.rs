pub mod connection;
pub mod migrations;
pub mod repositories;
pub mod vocabulary;

pub use connection::{connect, connect_with_settings, DbPool};
pub use repositories::{
    InMemorySchemaRepository, InMemoryThreadRepository, RepositoryError, SchemaRepository,
    SqlSchemaRepository, SqlThreadRepository, ThreadRepository,
};
pub use vocabulary::load_vocabulary;
