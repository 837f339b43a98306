//! Implements the request-processing pipeline.
//!
//! One HTTP request in, one HTTP response out. Every stage either advances
//! the request or short-circuits to a terminal [`Outcome`]; the outcome's
//! status is derived deterministically from the first failing stage. At most
//! one execution happens per request, and exactly one metrics sample is
//! recorded, whatever the outcome.

use std::task::Poll;
use std::time::Instant;

use futures::future::BoxFuture;
use http::HeaderValue;
use http::Method;
use http::StatusCode;
use http::request::Parts;
use tower::BoxError;
use tower_service::Service;
use tracing::Instrument;

use crate::configuration::OptionsSource;
use crate::configuration::ServiceOptions;
use crate::engine;
use crate::engine::ExecuteRequest;
use crate::engine::OperationKind;
use crate::graphql;
use crate::graphql::GraphqlParams;
use crate::graphql::IntoGraphQLErrors;
use crate::metrics::RequestMetrics;
use crate::services::Body;
use crate::services::body;
use crate::services::body::Payload;
use crate::services::format;
use crate::services::format::PresentationMode;
use crate::services::params;

static ALLOW_GET_POST: HeaderValue = HeaderValue::from_static("GET, POST");
static ALLOW_POST: HeaderValue = HeaderValue::from_static("POST");

/// The single, final verdict for one request.
pub(crate) struct Outcome {
    pub(crate) status: StatusCode,
    pub(crate) allow: Option<HeaderValue>,
    /// `None` only on explorer short-circuits, where nothing was executed
    /// and the page is rendered without a result.
    pub(crate) result: Option<graphql::Response>,
    pub(crate) operation_kind: Option<OperationKind>,
}

impl Outcome {
    fn success(response: graphql::Response) -> Self {
        let status = if response.has_data() {
            StatusCode::OK
        } else {
            // a response with no thrown error but no data either is still a
            // server fault over HTTP
            StatusCode::INTERNAL_SERVER_ERROR
        };
        Outcome {
            status,
            allow: None,
            result: Some(response),
            operation_kind: None,
        }
    }

    fn failure(status: StatusCode, errors: Vec<graphql::Error>) -> Self {
        Outcome {
            status,
            allow: None,
            result: Some(graphql::Response::from_errors(errors)),
            operation_kind: None,
        }
    }

    fn bad_request(message: impl Into<String>) -> Self {
        Outcome::failure(
            StatusCode::BAD_REQUEST,
            vec![graphql::Error::builder().message(message.into()).build()],
        )
    }

    fn method_not_allowed(allow: HeaderValue, message: String) -> Self {
        let mut outcome = Outcome::failure(
            StatusCode::METHOD_NOT_ALLOWED,
            vec![
                graphql::Error::builder()
                    .message(message)
                    .extension_code("METHOD_NOT_ALLOWED")
                    .build(),
            ],
        );
        outcome.allow = Some(allow);
        outcome
    }

    /// The no-op outcome: the explorer is rendered with whatever the client
    /// sent, and nothing is executed.
    fn explorer_passthrough() -> Self {
        Outcome {
            status: StatusCode::OK,
            allow: None,
            result: None,
            operation_kind: None,
        }
    }

    /// The safety net for faults nothing upstream classified.
    fn internal_error(err: BoxError) -> Self {
        Outcome::failure(
            StatusCode::INTERNAL_SERVER_ERROR,
            vec![
                graphql::Error::builder()
                    .message(err.to_string())
                    .extension_code(StatusCode::INTERNAL_SERVER_ERROR.to_string())
                    .build(),
            ],
        )
    }

    fn with_operation_kind(mut self, kind: Option<OperationKind>) -> Self {
        self.operation_kind = kind;
        self
    }

    pub(crate) fn had_errors(&self) -> bool {
        self.result
            .as_ref()
            .is_some_and(|result| !result.errors.is_empty())
    }
}

/// The pipeline as a [`Service`]: mount it wherever the embedding server
/// routes its GraphQL endpoint.
#[derive(Clone)]
pub struct GraphqlService {
    options: OptionsSource,
}

impl GraphqlService {
    pub fn new(options: impl Into<OptionsSource>) -> Self {
        GraphqlService {
            options: options.into(),
        }
    }
}

impl Service<http::Request<Payload>> for GraphqlService {
    type Response = http::Response<Body>;
    type Error = BoxError;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, _cx: &mut std::task::Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: http::Request<Payload>) -> Self::Future {
        let self_clone = self.clone();

        let this = std::mem::replace(self, self_clone);

        Box::pin(async move { Ok(this.call_inner(req).await) })
    }
}

impl GraphqlService {
    async fn call_inner(self, req: http::Request<Payload>) -> http::Response<Body> {
        let start = Instant::now();
        let (parts, payload) = req.into_parts();

        let options = match self.options.resolve(&parts).await {
            Ok(options) => options,
            Err(err) => {
                tracing::error!("failed to resolve service options: {err}");
                // there is no sink to record against yet; answer and move on
                return format::write_response(
                    Outcome::internal_error(err),
                    &GraphqlParams::default(),
                    PresentationMode::Json,
                    false,
                    None,
                );
            }
        };

        let (params, mode, outcome) = self.process(&parts, payload, &options).await;

        options.metrics.record(RequestMetrics {
            elapsed: start.elapsed(),
            had_errors: outcome.had_errors(),
            operation_name: params.operation_name.clone(),
            operation_kind: outcome.operation_kind,
        });

        format::write_response(
            outcome,
            &params,
            mode,
            options.pretty,
            options.explorer.as_ref(),
        )
    }

    /// Decode the body, resolve the parameters, fix the presentation mode,
    /// then drive the state machine with the safety net around it.
    async fn process(
        &self,
        parts: &Parts,
        payload: Payload,
        options: &ServiceOptions,
    ) -> (GraphqlParams, PresentationMode, Outcome) {
        let body = match body::decode_body(parts, payload)
            .instrument(tracing::debug_span!("receive_body"))
            .await
        {
            Ok(body) => body,
            Err(err) => {
                let outcome = Outcome::failure(err.status(), err.into_graphql_errors());
                return (GraphqlParams::default(), PresentationMode::Json, outcome);
            }
        };

        let params = match params::resolve_params(parts.uri.query(), body) {
            Ok(params) => params,
            Err(err) => {
                let outcome = Outcome::failure(StatusCode::BAD_REQUEST, err.into_graphql_errors());
                return (GraphqlParams::default(), PresentationMode::Json, outcome);
            }
        };

        // derived once; never re-examined after this point
        let mode = if !params.raw
            && options.explorer.is_some()
            && format::prefers_html(&parts.headers)
        {
            PresentationMode::Explorer
        } else {
            PresentationMode::Json
        };

        let outcome = match self.run(parts, &params, mode, options).await {
            Ok(outcome) => outcome,
            Err(err) => {
                tracing::error!("request processing failed: {err}");
                Outcome::internal_error(err)
            }
        };

        (params, mode, outcome)
    }

    /// The state machine: precondition checks, static analysis, the method
    /// gate, then at most one execution.
    async fn run(
        &self,
        parts: &Parts,
        params: &GraphqlParams,
        mode: PresentationMode,
        options: &ServiceOptions,
    ) -> Result<Outcome, BoxError> {
        if parts.method != Method::GET && parts.method != Method::POST {
            return Ok(Outcome::method_not_allowed(
                ALLOW_GET_POST.clone(),
                "GraphQL only supports GET and POST requests.".to_string(),
            ));
        }

        let Some(query) = params.query.as_deref() else {
            // the explorer is shown with an empty editor rather than a 400
            if mode == PresentationMode::Explorer {
                return Ok(Outcome::explorer_passthrough());
            }
            return Ok(Outcome::bad_request("Must provide query string."));
        };

        let schema = match options.schema.validated() {
            Ok(schema) => schema,
            Err(errors) => {
                // a broken schema is a server fault, not a client fault
                return Ok(Outcome::failure(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    errors.to_vec(),
                ));
            }
        };

        let document = match tracing::debug_span!("parse_query")
            .in_scope(|| engine::parse_document(schema, query))
        {
            Ok(document) => document,
            Err(errors) => {
                return Ok(Outcome::failure(
                    StatusCode::BAD_REQUEST,
                    errors.into_graphql_errors(),
                ));
            }
        };

        let document = match tracing::debug_span!("validate_query")
            .in_scope(|| engine::validate_document(schema, document))
        {
            Ok(document) => document,
            Err(errors) => {
                return Ok(Outcome::failure(
                    StatusCode::BAD_REQUEST,
                    errors.into_graphql_errors(),
                ));
            }
        };

        let operation_kind = document
            .operations
            .get(params.operation_name.as_deref())
            .ok()
            .map(|operation| OperationKind::from(operation.operation_type));

        // only read-only queries may run over GET
        if parts.method == Method::GET {
            if let Some(kind) = operation_kind.filter(|kind| *kind != OperationKind::Query) {
                if mode == PresentationMode::Explorer {
                    // do not execute, but pre-populate the explorer so the
                    // requester may perform the operation themselves
                    return Ok(
                        Outcome::explorer_passthrough().with_operation_kind(operation_kind)
                    );
                }
                return Ok(Outcome::method_not_allowed(
                    ALLOW_POST.clone(),
                    format!("Can only perform a {kind} operation from a POST request."),
                )
                .with_operation_kind(operation_kind));
            }
        }

        let request = ExecuteRequest {
            schema,
            document: &document,
            variables: params.variables.as_ref(),
            operation_name: params.operation_name.as_deref(),
            http: parts,
        };
        let response = match options.executor.execute(request).await {
            Ok(response) => response,
            Err(err) => {
                // failing to establish the execution context is a client
                // error; field errors ride inside the response instead
                return Ok(Outcome::failure(
                    StatusCode::BAD_REQUEST,
                    vec![graphql::Error::builder().message(err.to_string()).build()],
                )
                .with_operation_kind(operation_kind));
            }
        };

        Ok(Outcome::success(response).with_operation_kind(operation_kind))
    }
}
