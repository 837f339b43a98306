//! The interactive explorer (GraphiQL) collaborator.
//!
//! When a request which does not Accept JSON, but does Accept HTML, reaches
//! the pipeline, it may be presented GraphiQL, the in-browser GraphQL IDE,
//! pre-populated with the result of having executed the requested operation.
//! Rendering is a pure template substitution; no execution happens here.

use serde::Serialize;

/// Configuration for the explorer page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[non_exhaustive]
pub struct ExplorerConfig {
    /// The query shown in an empty editor.
    pub default_query: Option<String>,

    /// Whether the header editor tab is available.
    pub header_editor_enabled: Option<bool>,

    /// Whether headers entered in the editor survive a reload.
    pub should_persist_headers: Option<bool>,
}

#[buildstructor::buildstructor]
impl ExplorerConfig {
    /// Returns a builder for [`ExplorerConfig`]. All fields are optional and
    /// fall back to GraphiQL's own defaults when unset.
    #[builder(visibility = "pub")]
    fn new(
        default_query: Option<String>,
        header_editor_enabled: Option<bool>,
        should_persist_headers: Option<bool>,
    ) -> Self {
        Self {
            default_query,
            header_editor_enabled,
            should_persist_headers,
        }
    }
}

/// What the explorer page is pre-populated with.
#[derive(Debug, Clone, Default)]
pub(crate) struct ExplorerData<'a> {
    pub(crate) query: Option<&'a str>,
    pub(crate) variables: Option<String>,
    pub(crate) result: Option<String>,
    pub(crate) operation_name: Option<&'a str>,
}

/// Render the explorer page.
pub(crate) fn render_explorer(data: &ExplorerData<'_>, config: &ExplorerConfig) -> String {
    const TEMPLATE: &str = include_str!("../templates/explorer_index.html");
    TEMPLATE
        .replace("{{GRAPHIQL_QUERY}}", &safe_serialize(data.query.as_ref()))
        .replace(
            "{{GRAPHIQL_VARIABLES}}",
            &safe_serialize(data.variables.as_ref()),
        )
        .replace(
            "{{GRAPHIQL_RESPONSE}}",
            &safe_serialize(data.result.as_ref()),
        )
        .replace(
            "{{GRAPHIQL_OPERATION_NAME}}",
            &safe_serialize(data.operation_name.as_ref()),
        )
        .replace(
            "{{GRAPHIQL_DEFAULT_QUERY}}",
            &safe_serialize(config.default_query.as_ref()),
        )
        .replace(
            "{{GRAPHIQL_HEADER_EDITOR_ENABLED}}",
            &safe_serialize(config.header_editor_enabled.as_ref()),
        )
        .replace(
            "{{GRAPHIQL_SHOULD_PERSIST_HEADERS}}",
            &safe_serialize(config.should_persist_headers.as_ref()),
        )
}

/// Serialize a value for embedding within a `<script>` tag. Escaping `/`
/// keeps a `</script>` inside user-controlled query text from closing the
/// surrounding tag.
fn safe_serialize<T: Serialize>(value: Option<&T>) -> String {
    match value {
        Some(value) => serde_json::to_string(value)
            .expect("cannot fail")
            .replace('/', "\\/"),
        None => "undefined".to_string(),
    }
}
