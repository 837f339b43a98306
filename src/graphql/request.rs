use crate::json_ext::Object;

/// The canonical GraphQL request fields for one HTTP request, after URL query
/// parameters and the decoded body have been merged.
///
/// For historical purposes, the term "query" is commonly used to refer to
/// *any* GraphQL operation which might be, e.g., a `mutation`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[non_exhaustive]
pub struct GraphqlParams {
    /// The GraphQL operation (e.g., query, mutation) string, if one resolved
    /// to a string. A non-string value is treated as absent, not as an error.
    pub query: Option<String>,

    /// The (optional) GraphQL variables in the form of a JSON object.
    ///
    /// Always a key/value mapping when present: a scalar or array that showed
    /// up under `variables` has been discarded during resolution.
    pub variables: Option<Object>,

    /// The (optional) GraphQL operation name.
    ///
    /// When specified, this name must match the name of an operation in the
    /// GraphQL document. When excluded, there must exist only a single
    /// operation in the GraphQL document.
    pub operation_name: Option<String>,

    /// Whether the client forced machine output, bypassing the interactive
    /// explorer even when content negotiation would have preferred it.
    pub raw: bool,
}
