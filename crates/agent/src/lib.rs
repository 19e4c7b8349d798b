//! Question answering over tenant data.
//!
//! A question flows through [`orchestrator::CallOrchestrator`]: the tenant
//! schema is resolved (and cached), a per-request toolset and prompt are
//! built, and [`runtime::AgentRuntime`] drives the model through tool calls
//! until it answers. Provider failures that a different API key could fix
//! rotate through [`credentials::CredentialPool`].
//!
//! # Modules
//!
//! - `llm` - provider seam and the Gemini client
//! - `credentials` - shared, rotating API key pool
//! - `conversation` - bounded, persisted conversation windows
//! - `tools` - schema, query and date tools exposed to the model
//! - `prompt` - system instructions and question wrapping
//! - `schema` - per-tenant vocabulary cache over the schema store

pub mod conversation;
pub mod credentials;
pub mod error;
pub mod llm;
pub mod orchestrator;
pub mod prompt;
pub mod runtime;
pub mod schema;
pub mod tools;

pub use credentials::{ClientFactory, Credential, CredentialPool};
pub use error::AgentError;
pub use orchestrator::{AskRequest, CallOrchestrator};
pub use runtime::AgentRuntime;
