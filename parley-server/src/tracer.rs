//! Request tracing: one span per HTTP request, tagged with the request
//! id assigned by the request-context middleware (which runs outside
//! this layer).

use http::Request;
use tower_http::classify::{ServerErrorsAsFailures, SharedClassifier};
use tower_http::trace::{DefaultOnRequest, DefaultOnResponse, MakeSpan, TraceLayer};
use tracing::{Level, Span};

use crate::middleware::request_context::RequestContext;

type HttpTraceLayer = TraceLayer<
    SharedClassifier<ServerErrorsAsFailures>,
    RequestSpan,
    DefaultOnRequest,
    DefaultOnResponse,
>;

#[derive(Clone, Default)]
pub(crate) struct RequestSpan;

impl<B> MakeSpan<B> for RequestSpan {
    fn make_span(&mut self, request: &Request<B>) -> Span {
        let request_id = request
            .extensions()
            .get::<RequestContext>()
            .map_or_else(|| "unassigned".to_string(), |context| {
                context.request_id.clone()
            });

        tracing::info_span!(
            "request",
            method = %request.method(),
            path = %request.uri().path(),
            %request_id,
        )
    }
}

/// Trace layer for HTTP request logging; responses log at INFO with
/// their latency, failures at the classifier's default ERROR.
pub fn create_trace_layer() -> HttpTraceLayer {
    TraceLayer::new_for_http()
        .make_span_with(RequestSpan)
        .on_response(DefaultOnResponse::new().level(Level::INFO))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn span_builds_without_a_request_context() {
        // Probes and misrouted requests can reach the layer before the
        // context middleware has run.
        let request = Request::builder().uri("/healthz").body(()).unwrap();
        let mut make_span = RequestSpan;
        let _ = make_span.make_span(&request);
    }
}
