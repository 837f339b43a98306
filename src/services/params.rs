//! Resolution of the canonical GraphQL request fields.
//!
//! URL query parameters and the decoded body both may carry `query`,
//! `variables`, `operationName` and `raw`; the URL wins per field when it has
//! a non-empty value. Type coercion is deliberately forgiving: a field of the
//! wrong type is treated as absent, with the single exception of a
//! `variables` string that is not valid JSON, which fails the whole request.

use serde_json_bytes::Value;

use crate::error::ParamError;
use crate::graphql::GraphqlParams;
use crate::json_ext::Object;

/// Merge URL query parameters and the decoded body into [`GraphqlParams`].
pub(crate) fn resolve_params(
    url_query: Option<&str>,
    body: Object,
) -> Result<GraphqlParams, ParamError> {
    let url_params: Vec<(String, String)> = url_query
        .map(|query| serde_urlencoded::from_str(query).unwrap_or_default())
        .unwrap_or_default();
    // like URLSearchParams.get, the first occurrence of a key wins
    let url_get = |name: &str| {
        url_params
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    };
    let url_field = |name: &str| url_get(name).filter(|value| !value.is_empty());

    let query = url_field("query")
        .map(str::to_owned)
        .or_else(|| string_field(&body, "query"));

    let variables = match url_field("variables")
        .map(|text| Value::String(text.into()))
        .or_else(|| body.get("variables").cloned())
    {
        Some(Value::String(text)) => match serde_json::from_str::<Value>(text.as_str()) {
            Ok(Value::Object(map)) => Some(map),
            Ok(_) => None,
            Err(_) => return Err(ParamError::InvalidVariablesJson),
        },
        Some(Value::Object(map)) => Some(map),
        _ => None,
    };

    let operation_name = url_field("operationName")
        .map(str::to_owned)
        .or_else(|| string_field(&body, "operationName"));

    // presence is what matters for raw, not the value
    let raw = url_get("raw").is_some() || body.contains_key("raw");

    Ok(GraphqlParams {
        query,
        variables,
        operation_name,
        raw,
    })
}

fn string_field(body: &Object, name: &str) -> Option<String> {
    body.get(name)
        .and_then(|value| value.as_str())
        .map(str::to_owned)
}
