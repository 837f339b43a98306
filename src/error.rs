//! Pipeline errors.

use apollo_compiler::validation::DiagnosticList;
use displaydoc::Display;
use http::StatusCode;
use thiserror::Error;

use crate::graphql;
use crate::graphql::IntoGraphQLErrors;
use crate::graphql::Location as ErrorLocation;

/// Errors raised while reading and decoding a request body, before any
/// GraphQL processing happens.
#[derive(Error, Display, Debug, Clone, Eq, PartialEq)]
#[ignore_extra_doc_attributes]
#[non_exhaustive]
pub(crate) enum BodyError {
    /// Invalid body: request entity too large.
    EntityTooLarge,

    /// Unsupported charset "{0}".
    ///
    /// Only UTF-8 and UTF-16LE request bodies are accepted.
    UnsupportedCharset(String),

    /// Unsupported content-encoding "{0}".
    ///
    /// Only identity, deflate and gzip are accepted.
    UnsupportedEncoding(String),

    /// POST body sent invalid JSON.
    InvalidJson,

    /// Invalid body: {0}.
    Read(String),
}

impl BodyError {
    /// The HTTP status this failure maps to. The mapping is total and
    /// deterministic: one category, one status.
    pub(crate) fn status(&self) -> StatusCode {
        match self {
            BodyError::EntityTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            BodyError::UnsupportedCharset(_) | BodyError::UnsupportedEncoding(_) => {
                StatusCode::UNSUPPORTED_MEDIA_TYPE
            }
            BodyError::InvalidJson | BodyError::Read(_) => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoGraphQLErrors for BodyError {
    fn into_graphql_errors(self) -> Vec<graphql::Error> {
        vec![
            graphql::Error::builder()
                .message(self.to_string())
                .extension_code("INVALID_GRAPHQL_REQUEST")
                .build(),
        ]
    }
}

/// Errors raised while merging URL query parameters and body fields into the
/// canonical GraphQL request fields.
#[derive(Error, Display, Debug, Clone, Eq, PartialEq)]
#[non_exhaustive]
pub(crate) enum ParamError {
    /// Variables are invalid JSON.
    InvalidVariablesJson,
}

impl IntoGraphQLErrors for ParamError {
    fn into_graphql_errors(self) -> Vec<graphql::Error> {
        vec![
            graphql::Error::builder()
                .message(self.to_string())
                .extension_code("INVALID_GRAPHQL_REQUEST")
                .build(),
        ]
    }
}

/// Collection of syntax errors raised when a GraphQL document failed to parse.
#[derive(Debug)]
pub struct ParseErrors {
    pub(crate) errors: DiagnosticList,
}

impl std::fmt::Display for ParseErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut errors = self.errors.iter();
        for (i, error) in errors.by_ref().take(5).enumerate() {
            if i > 0 {
                f.write_str("\n")?;
            }
            write!(f, "{error}")?;
        }
        let remaining = errors.count();
        if remaining > 0 {
            write!(f, "\n...and {remaining} other errors")?;
        }
        Ok(())
    }
}

impl std::error::Error for ParseErrors {}

impl IntoGraphQLErrors for ParseErrors {
    fn into_graphql_errors(self) -> Vec<graphql::Error> {
        diagnostics_to_errors(&self.errors, "GRAPHQL_PARSING_FAILED")
    }
}

/// Collection of validation errors raised when a schema or a parsed document
/// failed GraphQL validation.
#[derive(Debug)]
pub(crate) struct ValidationErrors {
    pub(crate) errors: DiagnosticList,
}

impl std::fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (index, error) in self.errors.iter().enumerate() {
            if index > 0 {
                f.write_str("\n")?;
            }
            write!(f, "{error}")?;
        }
        Ok(())
    }
}

impl IntoGraphQLErrors for ValidationErrors {
    fn into_graphql_errors(self) -> Vec<graphql::Error> {
        diagnostics_to_errors(&self.errors, "GRAPHQL_VALIDATION_FAILED")
    }
}

fn diagnostics_to_errors(diagnostics: &DiagnosticList, code: &str) -> Vec<graphql::Error> {
    diagnostics
        .iter()
        .map(|diagnostic| {
            graphql::Error::builder()
                .message(diagnostic.error.to_string())
                .locations(
                    diagnostic
                        .line_column_range()
                        .map(|location| {
                            vec![ErrorLocation {
                                line: location.start.line as u32,
                                column: location.start.column as u32,
                            }]
                        })
                        .unwrap_or_default(),
                )
                .extension_code(code)
                .build()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn body_error_statuses_are_deterministic() {
        assert_eq!(
            BodyError::EntityTooLarge.status(),
            StatusCode::PAYLOAD_TOO_LARGE
        );
        assert_eq!(
            BodyError::UnsupportedCharset("UTF-32".to_string()).status(),
            StatusCode::UNSUPPORTED_MEDIA_TYPE
        );
        assert_eq!(
            BodyError::UnsupportedEncoding("br".to_string()).status(),
            StatusCode::UNSUPPORTED_MEDIA_TYPE
        );
        assert_eq!(BodyError::InvalidJson.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            BodyError::Read("stream broke".to_string()).status(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn body_error_messages_match_the_http_contract() {
        assert_eq!(
            BodyError::UnsupportedCharset("UTF-32".to_string()).to_string(),
            r#"Unsupported charset "UTF-32"."#
        );
        assert_eq!(
            BodyError::EntityTooLarge.to_string(),
            "Invalid body: request entity too large."
        );
    }

    #[test]
    fn param_error_converts_to_a_single_graphql_error() {
        let errors = ParamError::InvalidVariablesJson.into_graphql_errors();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].message, "Variables are invalid JSON.");
        assert_eq!(
            errors[0].extension_code().as_deref(),
            Some("INVALID_GRAPHQL_REQUEST")
        );
    }
}
