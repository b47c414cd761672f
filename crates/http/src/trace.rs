// Copyright 2025 The Courier Developers.
//
// SPDX-License-Identifier: Apache-2.0
// Please see LICENSE in the repository root for full details.

use bytes::Bytes;
use http::{HeaderMap, Request, Uri};
use opentelemetry_http::HeaderInjector;
use opentelemetry_semantic_conventions::trace::{
    HTTP_REQUEST_METHOD, HTTP_RESPONSE_STATUS_CODE, SERVER_ADDRESS, SERVER_PORT, URL_FULL,
};
use tracing::Span;
use tracing_opentelemetry::OpenTelemetrySpanExt;

/// A connection lifecycle phase reported on the request span.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionPhase {
    /// DNS resolution of the target host.
    Dns,

    /// TCP connection establishment.
    Connect,

    /// TLS handshake on the established connection.
    TlsHandshake,

    /// Wait for a connection from the pool.
    PoolWait,
}

impl ConnectionPhase {
    /// The phase's name, as emitted in span events.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Dns => "dns",
            Self::Connect => "connect",
            Self::TlsHandshake => "tls",
            Self::PoolWait => "pool",
        }
    }
}

/// Callback handle reporting connection-phase boundaries as events on
/// a request span.
///
/// [`Transport`][crate::Transport] inserts one into the request's
/// [extensions][http::Extensions] when tracing is enabled; transports
/// that establish connections invoke it around each phase. A handle
/// over a disabled span emits nothing.
#[derive(Debug, Clone)]
pub struct ClientTrace {
    span: Span,
}

impl ClientTrace {
    pub(crate) fn new(span: &Span) -> Self {
        Self { span: span.clone() }
    }

    /// A handle reporting onto the span current at the call site.
    #[must_use]
    pub fn from_current() -> Self {
        Self {
            span: Span::current(),
        }
    }

    /// Report that `phase` began.
    pub fn phase_start(&self, phase: ConnectionPhase) {
        tracing::debug!(parent: &self.span, phase = phase.as_str(), state = "start");
    }

    /// Report that `phase` ended.
    pub fn phase_end(&self, phase: ConnectionPhase) {
        tracing::debug!(parent: &self.span, phase = phase.as_str(), state = "end");
    }
}

/// Build the span for one request.
///
/// The span parents onto the caller's current span when there is one,
/// and becomes a root span otherwise. The status code and error
/// fields are recorded after the round trip completes.
pub(crate) fn make_request_span(
    span_name: &str,
    component_tag: &str,
    request: &Request<Bytes>,
) -> Span {
    tracing::info_span!(
        "http.client.request",
        "otel.name" = span_name,
        "otel.kind" = "client",
        "otel.status_code" = tracing::field::Empty,
        component = component_tag,
        { HTTP_REQUEST_METHOD } = %request.method(),
        { URL_FULL } = %request.uri(),
        { HTTP_RESPONSE_STATUS_CODE } = tracing::field::Empty,
        { SERVER_ADDRESS } = request.uri().host(),
        { SERVER_PORT } = port_or_known_default(request.uri()),
        "rust.error" = tracing::field::Empty,
    )
}

/// Serialize the span's trace context into the outgoing headers.
///
/// Best effort: the propagator writes whatever it can, and a failure
/// to inject never affects the request.
pub(crate) fn inject_context(span: &Span, headers: &mut HeaderMap) {
    let context = span.context();
    opentelemetry::global::get_text_map_propagator(|propagator| {
        let mut injector = HeaderInjector(headers);
        propagator.inject_context(&context, &mut injector);
    });
}

pub(crate) fn port_or_known_default(uri: &Uri) -> Option<u16> {
    uri.port_u16().or_else(|| match uri.scheme_str() {
        Some("http") => Some(80),
        Some("https") => Some(443),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_default_ports() {
        let uri: Uri = "https://example.com/x".parse().unwrap();
        assert_eq!(port_or_known_default(&uri), Some(443));

        let uri: Uri = "http://example.com/x".parse().unwrap();
        assert_eq!(port_or_known_default(&uri), Some(80));

        let uri: Uri = "http://example.com:8080/x".parse().unwrap();
        assert_eq!(port_or_known_default(&uri), Some(8080));

        let uri: Uri = "/relative".parse().unwrap();
        assert_eq!(port_or_known_default(&uri), None);
    }
}
