//! Request and response body plumbing, and request body decoding.

use std::io::Read;

use axum::Error as AxumError;
use bytes::Bytes;
use flate2::read::GzDecoder;
use flate2::read::ZlibDecoder;
use http::header::CONTENT_ENCODING;
use http::header::CONTENT_TYPE;
use http::request::Parts;
use http_body::Body as HttpBody;
use http_body_util::BodyExt;
use http_body_util::Empty;
use http_body_util::Full;
use http_body_util::Limited;
use http_body_util::combinators::UnsyncBoxBody;
use mediatype::MediaType;
use mediatype::Name;
use mediatype::ReadParams;
use serde_json_bytes::ByteString;
use serde_json_bytes::Value;

use crate::error::BodyError;
use crate::json_ext::Object;

/// The body type used on both sides of the pipeline.
pub type Body = UnsyncBoxBody<Bytes, AxumError>;

/// Decoded request bodies are capped at 100 KiB, before and after
/// decompression.
pub(crate) const BODY_SIZE_LIMIT: usize = 100 * 1024;

/// Create an empty Body
pub fn empty() -> Body {
    Empty::<Bytes>::new()
        .map_err(|never| match never {})
        .boxed_unsync()
}

/// Create a full Body using the supplied chunk
pub fn full<T: Into<Bytes>>(chunk: T) -> Body {
    Full::new(chunk.into())
        .map_err(|never| match never {})
        .boxed_unsync()
}

/// Collect a body into bytes, without a size limit. Response-side only.
pub async fn into_bytes<B: HttpBody>(body: B) -> Result<Bytes, B::Error> {
    Ok(body.collect().await?.to_bytes())
}

/// A request body as received from the embedding server.
pub enum Payload {
    /// Raw bytes, possibly compressed, still subject to decoding.
    Stream(Body),

    /// A structured value an outer layer already decoded. Returned unchanged
    /// by the decoder when it is an object.
    Parsed(Value),
}

impl Payload {
    /// A request without a body.
    pub fn empty() -> Self {
        Payload::Stream(empty())
    }
}

impl From<Body> for Payload {
    fn from(body: Body) -> Self {
        Payload::Stream(body)
    }
}

impl From<Value> for Payload {
    fn from(value: Value) -> Self {
        Payload::Parsed(value)
    }
}

/// Decode a request body into a flat mapping of GraphQL request fields,
/// according to the declared content type.
///
/// Unrecognized content types are not an error: they decode to an empty
/// mapping, as does a missing `Content-Type` header.
pub(crate) async fn decode_body(parts: &Parts, payload: Payload) -> Result<Object, BodyError> {
    let body = match payload {
        Payload::Parsed(Value::Object(map)) => return Ok(map),
        Payload::Parsed(Value::String(text)) => {
            let mut map = Object::new();
            if content_type(parts).is_some_and(|t| is_graphql(&t)) {
                map.insert("query", Value::String(text));
            }
            return Ok(map);
        }
        Payload::Parsed(_) => return Ok(Object::new()),
        Payload::Stream(body) => body,
    };

    let Some(media) = content_type(parts) else {
        return Ok(Object::new());
    };

    let text = read_body(parts, body, &media).await?;

    if is_graphql(&media) {
        let mut map = Object::new();
        map.insert("query", Value::String(ByteString::from(text)));
        Ok(map)
    } else if media.ty == mediatype::names::APPLICATION && media.subty == mediatype::names::JSON {
        // the body must be a JSON object; a bare scalar or array is rejected
        // before the parser even runs
        if !text
            .trim_start_matches([' ', '\t', '\n', '\r'])
            .starts_with('{')
        {
            return Err(BodyError::InvalidJson);
        }
        match serde_json::from_str::<Value>(&text) {
            Ok(Value::Object(map)) => Ok(map),
            _ => Err(BodyError::InvalidJson),
        }
    } else if media.ty == mediatype::names::APPLICATION
        && media.subty.as_str() == "x-www-form-urlencoded"
    {
        let pairs: Vec<(String, String)> = serde_urlencoded::from_str(&text)
            .map_err(|err| BodyError::Read(err.to_string()))?;
        let mut map = Object::new();
        for (key, value) in pairs {
            map.insert(ByteString::from(key), Value::String(ByteString::from(value)));
        }
        Ok(map)
    } else {
        Ok(Object::new())
    }
}

fn content_type(parts: &Parts) -> Option<MediaType<'_>> {
    let header = parts.headers.get(CONTENT_TYPE)?.to_str().ok()?;
    MediaType::parse(header).ok()
}

fn is_graphql(media: &MediaType<'_>) -> bool {
    media.ty == mediatype::names::APPLICATION && media.subty.as_str() == "graphql"
}

/// Read the raw body, enforcing the charset, content-encoding and size rules.
async fn read_body(parts: &Parts, body: Body, media: &MediaType<'_>) -> Result<String, BodyError> {
    let charset = media
        .get_param(Name::new("charset").expect("valid name"))
        .map(|value| value.unquoted_str().to_ascii_lowercase())
        .unwrap_or_else(|| "utf-8".to_string());
    if !matches!(charset.as_str(), "utf8" | "utf-8" | "utf-16le") {
        return Err(BodyError::UnsupportedCharset(charset.to_uppercase()));
    }

    let encoding = parts
        .headers
        .get(CONTENT_ENCODING)
        .and_then(|value| value.to_str().ok())
        .map(str::to_ascii_lowercase)
        .unwrap_or_else(|| "identity".to_string());

    enum Encoding {
        Identity,
        Deflate,
        Gzip,
    }
    let encoding = match encoding.as_str() {
        "identity" => Encoding::Identity,
        "deflate" => Encoding::Deflate,
        "gzip" => Encoding::Gzip,
        other => return Err(BodyError::UnsupportedEncoding(other.to_string())),
    };

    // the cap applies to the bytes on the wire: an oversized compressed body
    // is rejected whether or not it would have inflated cleanly
    let bytes = Limited::new(body, BODY_SIZE_LIMIT)
        .collect()
        .await
        .map(|collected| collected.to_bytes())
        .map_err(|err| {
            if err.downcast_ref::<http_body_util::LengthLimitError>().is_some() {
                BodyError::EntityTooLarge
            } else {
                BodyError::Read(err.to_string())
            }
        })?;

    let bytes = match encoding {
        Encoding::Identity => bytes.to_vec(),
        Encoding::Deflate => inflate(ZlibDecoder::new(bytes.as_ref()))?,
        Encoding::Gzip => inflate(GzDecoder::new(bytes.as_ref()))?,
    };

    decode_charset(bytes, &charset)
}

/// Inflate a compressed body, enforcing the size cap on the output as well.
fn inflate(reader: impl Read) -> Result<Vec<u8>, BodyError> {
    let mut inflated = Vec::new();
    reader
        .take(BODY_SIZE_LIMIT as u64 + 1)
        .read_to_end(&mut inflated)
        .map_err(|err| BodyError::Read(err.to_string()))?;
    if inflated.len() > BODY_SIZE_LIMIT {
        return Err(BodyError::EntityTooLarge);
    }
    Ok(inflated)
}

fn decode_charset(bytes: Vec<u8>, charset: &str) -> Result<String, BodyError> {
    if charset == "utf-16le" {
        let code_units: Vec<u16> = bytes
            .chunks_exact(2)
            .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
            .collect();
        String::from_utf16(&code_units).map_err(|err| BodyError::Read(err.to_string()))
    } else {
        String::from_utf8(bytes).map_err(|err| BodyError::Read(err.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use flate2::Compression;
    use flate2::write::GzEncoder;
    use flate2::write::ZlibEncoder;
    use serde_json_bytes::json;

    use super::*;

    fn parts(headers: &[(&str, &str)]) -> Parts {
        let mut builder = http::Request::builder().method("POST").uri("/graphql");
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        builder.body(()).unwrap().into_parts().0
    }

    #[tokio::test]
    async fn no_content_type_decodes_to_an_empty_mapping() {
        let parts = parts(&[]);
        let decoded = decode_body(&parts, Payload::Stream(full("ignored")))
            .await
            .unwrap();
        assert!(decoded.is_empty());
    }

    #[tokio::test]
    async fn pre_parsed_objects_pass_through_unchanged() {
        let parts = parts(&[]);
        let value = json!({"query": "{ hello }", "raw": true});
        let decoded = decode_body(&parts, Payload::Parsed(value.clone()))
            .await
            .unwrap();
        assert_eq!(Value::Object(decoded), value);
    }

    #[tokio::test]
    async fn pre_parsed_graphql_string_becomes_the_query() {
        let parts = parts(&[("content-type", "application/graphql")]);
        let decoded = decode_body(&parts, Payload::Parsed(json!("{ hello }")))
            .await
            .unwrap();
        assert_eq!(decoded.get("query"), Some(&json!("{ hello }")));
    }

    #[tokio::test]
    async fn graphql_content_type_is_the_query_verbatim() {
        let parts = parts(&[("content-type", "application/graphql")]);
        let decoded = decode_body(&parts, Payload::Stream(full("query { hello }")))
            .await
            .unwrap();
        assert_eq!(decoded.get("query"), Some(&json!("query { hello }")));
    }

    #[tokio::test]
    async fn json_body_must_start_with_a_brace() {
        let parts = parts(&[("content-type", "application/json")]);
        let err = decode_body(&parts, Payload::Stream(full("[1, 2, 3]")))
            .await
            .unwrap_err();
        assert_eq!(err, BodyError::InvalidJson);
    }

    #[tokio::test]
    async fn json_body_with_leading_whitespace_is_accepted() {
        let parts = parts(&[("content-type", "application/json")]);
        let decoded = decode_body(
            &parts,
            Payload::Stream(full("\n\t {\"query\": \"{ hello }\"}")),
        )
        .await
        .unwrap();
        assert_eq!(decoded.get("query"), Some(&json!("{ hello }")));
    }

    #[tokio::test]
    async fn malformed_json_after_the_brace_check_is_invalid() {
        let parts = parts(&[("content-type", "application/json")]);
        let err = decode_body(&parts, Payload::Stream(full("{\"query\": ")))
            .await
            .unwrap_err();
        assert_eq!(err, BodyError::InvalidJson);
    }

    #[tokio::test]
    async fn form_urlencoded_decodes_to_a_flat_mapping() {
        let parts = parts(&[("content-type", "application/x-www-form-urlencoded")]);
        let decoded = decode_body(
            &parts,
            Payload::Stream(full("query=%7B+hello+%7D&operationName=Hello")),
        )
        .await
        .unwrap();
        assert_eq!(decoded.get("query"), Some(&json!("{ hello }")));
        assert_eq!(decoded.get("operationName"), Some(&json!("Hello")));
    }

    #[tokio::test]
    async fn unknown_content_types_are_not_an_error() {
        let parts = parts(&[("content-type", "text/plain")]);
        let decoded = decode_body(&parts, Payload::Stream(full("whatever")))
            .await
            .unwrap();
        assert!(decoded.is_empty());
    }

    #[tokio::test]
    async fn unsupported_charset_is_rejected() {
        let parts = parts(&[("content-type", "application/json; charset=utf-32")]);
        let err = decode_body(&parts, Payload::Stream(full("{}")))
            .await
            .unwrap_err();
        assert_eq!(err, BodyError::UnsupportedCharset("UTF-32".to_string()));
        assert_eq!(err.status(), http::StatusCode::UNSUPPORTED_MEDIA_TYPE);
    }

    #[tokio::test]
    async fn utf_16le_bodies_are_decoded() {
        let text = "{\"query\": \"{ hello }\"}";
        let encoded: Vec<u8> = text
            .encode_utf16()
            .flat_map(|unit| unit.to_le_bytes())
            .collect();
        let parts = parts(&[("content-type", "application/json; charset=utf-16le")]);
        let decoded = decode_body(&parts, Payload::Stream(full(encoded)))
            .await
            .unwrap();
        assert_eq!(decoded.get("query"), Some(&json!("{ hello }")));
    }

    #[tokio::test]
    async fn unsupported_content_encoding_is_rejected() {
        let parts = parts(&[
            ("content-type", "application/json"),
            ("content-encoding", "br"),
        ]);
        let err = decode_body(&parts, Payload::Stream(full("{}")))
            .await
            .unwrap_err();
        assert_eq!(err, BodyError::UnsupportedEncoding("br".to_string()));
    }

    #[tokio::test]
    async fn gzip_bodies_are_inflated() {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(b"{\"query\": \"{ hello }\"}").unwrap();
        let compressed = encoder.finish().unwrap();

        let parts = parts(&[
            ("content-type", "application/json"),
            ("content-encoding", "gzip"),
        ]);
        let decoded = decode_body(&parts, Payload::Stream(full(compressed)))
            .await
            .unwrap();
        assert_eq!(decoded.get("query"), Some(&json!("{ hello }")));
    }

    #[tokio::test]
    async fn deflate_bodies_are_inflated() {
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(b"{\"query\": \"{ hello }\"}").unwrap();
        let compressed = encoder.finish().unwrap();

        let parts = parts(&[
            ("content-type", "application/json"),
            ("content-encoding", "deflate"),
        ]);
        let decoded = decode_body(&parts, Payload::Stream(full(compressed)))
            .await
            .unwrap();
        assert_eq!(decoded.get("query"), Some(&json!("{ hello }")));
    }

    #[tokio::test]
    async fn oversized_bodies_are_rejected() {
        let parts = parts(&[("content-type", "application/json")]);
        let huge = vec![b' '; BODY_SIZE_LIMIT + 1];
        let err = decode_body(&parts, Payload::Stream(full(huge)))
            .await
            .unwrap_err();
        assert_eq!(err, BodyError::EntityTooLarge);
        assert_eq!(err.status(), http::StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn oversized_compressed_input_is_rejected_before_inflating() {
        // not valid gzip data, but the wire cap fires first
        let parts = parts(&[
            ("content-type", "application/json"),
            ("content-encoding", "gzip"),
        ]);
        let huge = vec![0u8; BODY_SIZE_LIMIT + 1];
        let err = decode_body(&parts, Payload::Stream(full(huge)))
            .await
            .unwrap_err();
        assert_eq!(err, BodyError::EntityTooLarge);
    }

    #[tokio::test]
    async fn bodies_inflating_past_the_cap_are_rejected() {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&vec![b'a'; BODY_SIZE_LIMIT * 2]).unwrap();
        let compressed = encoder.finish().unwrap();
        assert!(compressed.len() < BODY_SIZE_LIMIT);

        let parts = parts(&[
            ("content-type", "application/json"),
            ("content-encoding", "gzip"),
        ]);
        let err = decode_body(&parts, Payload::Stream(full(compressed)))
            .await
            .unwrap_err();
        assert_eq!(err, BodyError::EntityTooLarge);
    }

    #[tokio::test]
    async fn corrupt_gzip_data_is_an_invalid_body() {
        let parts = parts(&[
            ("content-type", "application/json"),
            ("content-encoding", "gzip"),
        ]);
        let err = decode_body(&parts, Payload::Stream(full("definitely not gzip")))
            .await
            .unwrap_err();
        assert!(matches!(err, BodyError::Read(_)));
        assert_eq!(err.status(), http::StatusCode::BAD_REQUEST);
    }
}
