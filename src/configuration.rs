//! Service configuration.

use std::fmt;
use std::sync::Arc;

use futures::future::BoxFuture;
use http::request::Parts;
use tower::BoxError;

use crate::engine::Executor;
use crate::engine::SchemaState;
use crate::explorer::ExplorerConfig;
use crate::metrics::MetricsSink;
use crate::metrics::NoopMetrics;

/// Everything the pipeline needs to process one request.
///
/// Immutable once built; the pipeline never mutates options and never holds
/// them across requests beyond the `Arc`.
#[derive(Clone)]
pub struct ServiceOptions {
    pub(crate) schema: SchemaState,
    pub(crate) executor: Arc<dyn Executor>,
    pub(crate) explorer: Option<ExplorerConfig>,
    pub(crate) pretty: bool,
    pub(crate) metrics: Arc<dyn MetricsSink>,
}

#[buildstructor::buildstructor]
impl ServiceOptions {
    /// Returns a builder for [`ServiceOptions`].
    ///
    /// `schema` and `executor` are required; the explorer is disabled, JSON
    /// output is compact and metrics go nowhere unless configured otherwise.
    #[builder(visibility = "pub")]
    fn new(
        schema: SchemaState,
        executor: Arc<dyn Executor>,
        explorer: Option<ExplorerConfig>,
        pretty: Option<bool>,
        metrics: Option<Arc<dyn MetricsSink>>,
    ) -> Self {
        Self {
            schema,
            executor,
            explorer,
            pretty: pretty.unwrap_or_default(),
            metrics: metrics.unwrap_or_else(|| Arc::new(NoopMetrics)),
        }
    }
}

impl fmt::Debug for ServiceOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceOptions")
            .field("schema", &self.schema)
            .field("explorer", &self.explorer)
            .field("pretty", &self.pretty)
            .finish()
    }
}

/// Where the options for a request come from: either a fixed record shared by
/// every request, or a resolver consulted once per request with the request
/// head.
#[derive(Clone)]
pub enum OptionsSource {
    Static(Arc<ServiceOptions>),
    Resolver(OptionsResolver),
}

/// A per-request options resolver.
pub type OptionsResolver =
    Arc<dyn Fn(&Parts) -> BoxFuture<'static, Result<Arc<ServiceOptions>, BoxError>> + Send + Sync>;

impl OptionsSource {
    /// Resolve the options for one request. Called exactly once per request,
    /// before any other processing.
    pub(crate) async fn resolve(&self, parts: &Parts) -> Result<Arc<ServiceOptions>, BoxError> {
        match self {
            OptionsSource::Static(options) => Ok(options.clone()),
            OptionsSource::Resolver(resolver) => resolver(parts).await,
        }
    }
}

impl From<ServiceOptions> for OptionsSource {
    fn from(options: ServiceOptions) -> Self {
        OptionsSource::Static(Arc::new(options))
    }
}
