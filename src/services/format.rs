//! Response formatting and content negotiation.
//!
//! The presentation mode is derived once per request and never changes:
//! EXPLORER when raw mode is off, the explorer is enabled, and the `Accept`
//! header weights HTML strictly above JSON; JSON otherwise. Formatting never
//! executes anything, it only writes the outcome the processor decided.

use bytes::Bytes;
use http::HeaderMap;
use http::HeaderValue;
use http::header::ACCEPT;
use http::header::ALLOW;
use http::header::CONTENT_LENGTH;
use http::header::CONTENT_TYPE;
use mediatype::MediaType;
use mediatype::MediaTypeList;
use mediatype::Name;
use mediatype::ReadParams;

use crate::explorer;
use crate::explorer::ExplorerConfig;
use crate::explorer::ExplorerData;
use crate::graphql::GraphqlParams;
use crate::services::Body;
use crate::services::body;
use crate::services::pipeline::Outcome;

pub(crate) const APPLICATION_JSON_UTF8_HEADER_VALUE: &str = "application/json; charset=utf-8";

/// How the response is presented to the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PresentationMode {
    Json,
    Explorer,
}

/// Whether the request's `Accept` header weights HTML strictly above
/// `application/json`. The most specific matching media range decides the
/// quality of each candidate; a tie keeps machine output.
pub(crate) fn prefers_html(headers: &HeaderMap) -> bool {
    let text_html = (mediatype::names::TEXT, mediatype::names::HTML);
    let application_json = (mediatype::names::APPLICATION, mediatype::names::JSON);

    let mut html: Option<(u8, f32)> = None;
    let mut json: Option<(u8, f32)> = None;

    for value in headers.get_all(ACCEPT).iter() {
        let Ok(accept) = value.to_str() else {
            continue;
        };
        for media in MediaTypeList::new(accept).flatten() {
            let quality = media
                .get_param(Name::new("q").expect("valid name"))
                .and_then(|value| value.unquoted_str().parse::<f32>().ok())
                .unwrap_or(1.0);
            if let Some(specificity) = range_specificity(&media, text_html) {
                weigh(&mut html, specificity, quality);
            }
            if let Some(specificity) = range_specificity(&media, application_json) {
                weigh(&mut json, specificity, quality);
            }
        }
    }

    let html_quality = html.map(|(_, quality)| quality).unwrap_or(0.0);
    let json_quality = json.map(|(_, quality)| quality).unwrap_or(0.0);
    html_quality > json_quality
}

/// How specifically a media range matches a concrete type: exact beats
/// `type/*` beats `*/*`; no match at all disqualifies the range.
fn range_specificity(media: &MediaType<'_>, target: (Name<'_>, Name<'_>)) -> Option<u8> {
    let star = mediatype::names::_STAR;
    if media.ty == target.0 && media.subty == target.1 {
        Some(2)
    } else if media.ty == target.0 && media.subty == star {
        Some(1)
    } else if media.ty == star && media.subty == star {
        Some(0)
    } else {
        None
    }
}

fn weigh(slot: &mut Option<(u8, f32)>, specificity: u8, quality: f32) {
    match slot {
        Some((seen, _)) if *seen >= specificity => {}
        _ => *slot = Some((specificity, quality)),
    }
}

/// Write the final response for the outcome the processor decided.
///
/// The status code is always the processor's; the mode only picks the body
/// representation. Content-Type and Content-Length are set explicitly.
pub(crate) fn write_response(
    outcome: Outcome,
    params: &GraphqlParams,
    mode: PresentationMode,
    pretty: bool,
    explorer: Option<&ExplorerConfig>,
) -> http::Response<Body> {
    let mut builder = http::Response::builder().status(outcome.status);
    if let Some(allow) = &outcome.allow {
        builder = builder.header(ALLOW, allow.clone());
    }

    match mode {
        PresentationMode::Explorer => {
            let config = explorer.cloned().unwrap_or_default();
            let data = ExplorerData {
                query: params.query.as_deref(),
                variables: params.variables.as_ref().map(|variables| {
                    serde_json::to_string_pretty(variables).expect("cannot fail")
                }),
                result: outcome
                    .result
                    .as_ref()
                    .map(|result| serde_json::to_string_pretty(result).expect("cannot fail")),
                operation_name: params.operation_name.as_deref(),
            };
            let page = Bytes::from(explorer::render_explorer(&data, &config));
            builder
                .header(
                    CONTENT_TYPE,
                    HeaderValue::from_static(mime::TEXT_HTML_UTF_8.as_ref()),
                )
                .header(CONTENT_LENGTH, page.len())
                .body(body::full(page))
                .expect("cannot fail")
        }
        PresentationMode::Json => {
            let result = outcome.result.unwrap_or_default();
            let payload = tracing::trace_span!("serialize_response").in_scope(|| {
                if pretty {
                    serde_json::to_string_pretty(&result)
                } else {
                    serde_json::to_string(&result)
                }
            });
            let payload = Bytes::from(payload.expect("cannot fail"));
            builder
                .header(
                    CONTENT_TYPE,
                    HeaderValue::from_static(APPLICATION_JSON_UTF8_HEADER_VALUE),
                )
                .header(CONTENT_LENGTH, payload.len())
                .body(body::full(payload))
                .expect("cannot fail")
        }
    }
}
