//! The boundary to the GraphQL engine.
//!
//! Static analysis (schema validation, document parsing, document validation,
//! operation lookup) goes through `apollo-compiler`. Execution goes through
//! the [`Executor`] trait, which the embedding application implements with
//! whatever resolver machinery it owns. The pipeline drives both but
//! implements neither.

use std::fmt;
use std::sync::Arc;

use apollo_compiler::ExecutableDocument;
use apollo_compiler::Schema;
use apollo_compiler::ast::OperationType;
use apollo_compiler::validation::Valid;
use apollo_compiler::validation::WithErrors;
use async_trait::async_trait;
use serde::Deserialize;
use serde::Serialize;
use tower::BoxError;

use crate::error::ParseErrors;
use crate::error::ValidationErrors;
use crate::graphql;
use crate::graphql::IntoGraphQLErrors;
use crate::json_ext::Object;

/// A schema plus the cached outcome of its static validation.
///
/// Validation runs once, when the state is built. A schema that failed
/// validation is still usable to construct the service; every request
/// processed against it fails with a server-fault outcome, which is the
/// contract for a broken schema.
#[derive(Clone)]
pub struct SchemaState {
    state: Arc<Result<Valid<Schema>, Vec<graphql::Error>>>,
}

impl SchemaState {
    /// Wrap an already-parsed schema, running static validation eagerly.
    pub fn new(schema: Schema) -> Self {
        let state = schema.validate().map_err(|WithErrors { errors, .. }| {
            ValidationErrors { errors }.into_graphql_errors()
        });
        Self {
            state: Arc::new(state),
        }
    }

    /// Parse an SDL string and wrap it.
    ///
    /// A schema that does not even parse is a configuration error for the
    /// embedding application, not a per-request outcome, so it surfaces here
    /// rather than at request time.
    pub fn parse(sdl: &str) -> Result<Self, ParseErrors> {
        let schema = Schema::parse(sdl, "schema.graphql")
            .map_err(|WithErrors { errors, .. }| ParseErrors { errors })?;
        Ok(Self::new(schema))
    }

    /// The validated schema, or the validation errors cached at construction.
    pub(crate) fn validated(&self) -> Result<&Valid<Schema>, &[graphql::Error]> {
        match self.state.as_ref() {
            Ok(schema) => Ok(schema),
            Err(errors) => Err(errors),
        }
    }
}

impl fmt::Debug for SchemaState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchemaState")
            .field("valid", &self.state.is_ok())
            .finish()
    }
}

/// Parse a query source into an executable document, reporting syntax errors.
pub(crate) fn parse_document(
    schema: &Valid<Schema>,
    query: &str,
) -> Result<ExecutableDocument, ParseErrors> {
    ExecutableDocument::parse(schema, query, "request.graphql")
        .map_err(|WithErrors { errors, .. }| ParseErrors { errors })
}

/// Validate a parsed document against the schema with the full standard rule
/// set.
pub(crate) fn validate_document(
    schema: &Valid<Schema>,
    document: ExecutableDocument,
) -> Result<Valid<ExecutableDocument>, ValidationErrors> {
    document
        .validate(schema)
        .map_err(|WithErrors { errors, .. }| ValidationErrors { errors })
}

/// The kind of operation a request targets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    #[default]
    Query,
    Mutation,
    Subscription,
}

impl OperationKind {
    pub(crate) const fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Query => "query",
            OperationKind::Mutation => "mutation",
            OperationKind::Subscription => "subscription",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<OperationType> for OperationKind {
    fn from(operation_type: OperationType) -> Self {
        match operation_type {
            OperationType::Query => OperationKind::Query,
            OperationType::Mutation => OperationKind::Mutation,
            OperationType::Subscription => OperationKind::Subscription,
        }
    }
}

/// Everything the executor needs to run one operation.
///
/// The original HTTP request head is the execution context: resolvers that
/// care about headers (authorization, locale, ...) read them from here.
#[derive(Debug)]
#[non_exhaustive]
pub struct ExecuteRequest<'a> {
    /// The validated schema the document was validated against.
    pub schema: &'a Valid<Schema>,

    /// The parsed and validated document.
    pub document: &'a Valid<ExecutableDocument>,

    /// The resolved variables, when the request carried any.
    pub variables: Option<&'a Object>,

    /// The operation to execute, when the document holds more than one.
    pub operation_name: Option<&'a str>,

    /// The head of the HTTP request being processed.
    pub http: &'a http::request::Parts,
}

/// A GraphQL executor.
///
/// Returning `Err` means the execution *context* could not be established
/// (a client-triggered failure, reported as a bad request). Field errors are
/// not `Err`: they ride inside the returned [`graphql::Response`] next to
/// whatever data did resolve.
#[async_trait]
pub trait Executor: Send + Sync + 'static {
    async fn execute(&self, request: ExecuteRequest<'_>) -> Result<graphql::Response, BoxError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCHEMA: &str = r#"
        type Query { hello: String }
        type Mutation { bump: Int }
    "#;

    #[test]
    fn valid_schema_passes_static_validation() {
        let state = SchemaState::parse(SCHEMA).unwrap();
        assert!(state.validated().is_ok());
    }

    #[test]
    fn broken_schema_caches_validation_errors() {
        // `Missing` is never defined
        let state = SchemaState::parse("type Query { field: Missing }").unwrap();
        let errors = state.validated().unwrap_err();
        assert!(!errors.is_empty());
    }

    #[test]
    fn unparsable_schema_is_a_configuration_error() {
        assert!(SchemaState::parse("type Query {").is_err());
    }

    #[test]
    fn syntax_errors_surface_from_parse() {
        let state = SchemaState::parse(SCHEMA).unwrap();
        let schema = state.validated().unwrap();
        let errors = parse_document(schema, "query { hello").unwrap_err();
        let errors = errors.into_graphql_errors();
        assert!(!errors.is_empty());
        assert_eq!(
            errors[0].extension_code().as_deref(),
            Some("GRAPHQL_PARSING_FAILED")
        );
    }

    #[test]
    fn validation_errors_surface_from_validate() {
        let state = SchemaState::parse(SCHEMA).unwrap();
        let schema = state.validated().unwrap();
        // an unused variable parses fine but fails the validation rule set
        let document = parse_document(schema, "query Q($unused: String) { hello }").unwrap();
        let errors = validate_document(schema, document).unwrap_err();
        assert!(
            errors
                .into_graphql_errors()
                .iter()
                .all(|e| e.extension_code().as_deref() == Some("GRAPHQL_VALIDATION_FAILED"))
        );
    }

    #[test]
    fn operation_kind_displays_lowercase() {
        assert_eq!(OperationKind::Mutation.to_string(), "mutation");
        assert_eq!(OperationKind::from(OperationType::Query), OperationKind::Query);
    }
}
