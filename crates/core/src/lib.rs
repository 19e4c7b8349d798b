//! Core types for querent: configuration, error taxonomy, tenant schema
//! documents, conversation messages, and the tenant schema vocabulary.

pub mod config;
pub mod domain;
pub mod errors;
pub mod schema;

pub use domain::message::{Message, Role, ToolCall};
pub use domain::template::{
    Column, Entity, Field, InputType, LifecycleStatus, Section, Template, TemplateId, TemplateRef,
};
pub use domain::tenant::{TenantId, ThreadId};
pub use errors::{ApplicationError, AskError};
pub use schema::{CachedSchema, SchemaCache, Vocabulary};
