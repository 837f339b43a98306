//! Serve GraphQL over HTTP.
//!
//! This crate turns an HTTP request into a single GraphQL operation
//! execution and turns the execution outcome back into a well-formed HTTP
//! response. It sits between a generic HTTP server and a GraphQL executor:
//! mount [`GraphqlService`] wherever the embedding server routes its GraphQL
//! endpoint, hand it a schema and an [`Executor`], and it takes care of the
//! GraphQL-over-HTTP contract: parameter precedence, status code
//! derivation, content negotiation between machine JSON and the interactive
//! GraphiQL explorer, and per-request metrics.
//!
//! Requests are processed independently; the pipeline holds no cross-request
//! mutable state and imposes no timeout of its own.

pub mod engine;
pub mod error;
pub mod graphql;
pub mod json_ext;
pub mod metrics;
pub mod services;

mod configuration;
mod explorer;

pub use configuration::OptionsResolver;
pub use configuration::OptionsSource;
pub use configuration::ServiceOptions;
pub use engine::ExecuteRequest;
pub use engine::Executor;
pub use engine::OperationKind;
pub use engine::SchemaState;
pub use explorer::ExplorerConfig;
pub use services::GraphqlService;
pub use services::Payload;
