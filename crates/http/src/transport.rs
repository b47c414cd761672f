// Copyright 2025 The Courier Developers.
//
// SPDX-License-Identifier: Apache-2.0
// Please see LICENSE in the repository root for full details.

use std::{
    sync::{Arc, LazyLock},
    time::Duration,
};

use bytes::Bytes;
use http::{HeaderValue, Request, Response, header::AUTHORIZATION};
use opentelemetry::{
    KeyValue,
    metrics::{Histogram, UpDownCounter},
};
use opentelemetry_semantic_conventions::{
    metric::{HTTP_CLIENT_ACTIVE_REQUESTS, HTTP_CLIENT_REQUEST_DURATION},
    trace::{
        ERROR_TYPE, HTTP_REQUEST_METHOD, HTTP_RESPONSE_STATUS_CODE, SERVER_ADDRESS, SERVER_PORT,
        URL_SCHEME,
    },
};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tower::BoxError;
use tracing::Instrument;

use crate::{
    METER,
    options::Options,
    pool::{PooledClient, PooledTransport},
    trace::{ClientTrace, inject_context, make_request_span, port_or_known_default},
};

static HTTP_REQUESTS_DURATION_HISTOGRAM: LazyLock<Histogram<u64>> = LazyLock::new(|| {
    METER
        .u64_histogram(HTTP_CLIENT_REQUEST_DURATION)
        .with_unit("ms")
        .with_description("Duration of HTTP client requests")
        .build()
});

static HTTP_REQUESTS_IN_FLIGHT: LazyLock<UpDownCounter<i64>> = LazyLock::new(|| {
    METER
        .i64_up_down_counter(HTTP_CLIENT_ACTIVE_REQUESTS)
        .with_unit("{requests}")
        .with_description("Number of HTTP client requests in flight")
        .build()
});

/// A transport wrapping a [`PooledTransport`] with bearer-token
/// injection, request tracing and periodic idle-connection sweeping.
///
/// Reconfiguration is copy-on-write: [`Transport::with_span_name`],
/// [`Transport::with_component_tag`] and
/// [`Transport::with_bearer_token`] return a new transport sharing
/// the pool and the sweep task, leaving the receiver untouched. A
/// transport that is actively handling requests is therefore never
/// mutated; to rotate a token, swap your held reference for the
/// returned one.
#[derive(Clone)]
pub struct Transport {
    pool: Arc<dyn PooledTransport>,
    span_name: Option<String>,
    component_tag: Option<String>,
    bearer_token: Option<HeaderValue>,
    shutdown: CancellationToken,
}

impl Transport {
    /// Build a transport over the built-in [`PooledClient`].
    ///
    /// Spawns the idle-connection sweep task; must be called from
    /// within a Tokio runtime, and [`Transport::close`] must be
    /// called on teardown to release the task.
    ///
    /// # Panics
    ///
    /// Panics if the platform TLS configuration cannot be built,
    /// which should never happen.
    #[must_use]
    pub fn new(options: &Options) -> Self {
        Self::from_pool(Arc::new(PooledClient::new(options)), options)
    }

    /// Build a transport over a caller-supplied pooled transport.
    ///
    /// Spawns exactly one sweep task for the given pool; transports
    /// derived through the `with_*` methods share it rather than
    /// spawning their own.
    #[must_use]
    pub fn from_pool(pool: Arc<dyn PooledTransport>, options: &Options) -> Self {
        let shutdown = CancellationToken::new();
        tokio::spawn(sweep_loop(
            Arc::clone(&pool),
            options.timeouts().idle_conn,
            shutdown.clone(),
        ));

        let mut transport = Self {
            pool,
            span_name: None,
            component_tag: None,
            bearer_token: None,
            shutdown,
        };
        if let Some(span_name) = &options.span_name {
            transport = transport.with_span_name(span_name);
        }
        if let Some(component_tag) = &options.component_tag {
            transport = transport.with_component_tag(component_tag);
        }
        transport
    }

    /// A copy of this transport with the given span name, sharing the
    /// pool and sweep task. Requests through the copy are traced.
    #[must_use]
    pub fn with_span_name(&self, span_name: impl Into<String>) -> Self {
        let mut transport = self.clone();
        transport.span_name = Some(span_name.into());
        transport
    }

    /// A copy of this transport with the given `component` tag,
    /// sharing the pool and sweep task.
    #[must_use]
    pub fn with_component_tag(&self, component_tag: impl Into<String>) -> Self {
        let mut transport = self.clone();
        transport.component_tag = Some(component_tag.into());
        transport
    }

    /// A copy of this transport injecting the given bearer token on
    /// requests without an `Authorization` header, sharing the pool
    /// and sweep task.
    ///
    /// To pick up a rotated token, call this again and use the
    /// returned transport. A token that cannot be encoded as a header
    /// value is dropped with a warning.
    #[must_use]
    pub fn with_bearer_token(&self, token: &str) -> Self {
        let mut transport = self.clone();
        transport.bearer_token = bearer_header(token.as_bytes());
        transport
    }

    /// Terminate the background sweep task.
    ///
    /// Callers own the single `close` call; transports derived via
    /// the `with_*` methods share the task, so closing any of them
    /// closes it for the whole family. Requests may still be issued
    /// afterwards, only the periodic sweeping stops.
    pub fn close(&self) {
        self.shutdown.cancel();
    }

    /// Force-reclaim idle pooled connections now, independent of the
    /// sweep schedule.
    pub fn close_idle_connections(&self) {
        self.pool.close_idle_connections();
    }

    /// Dispatch one request: inject the bearer token if configured
    /// and the request carries no `Authorization` header, trace the
    /// round trip if a span name is configured, and delegate to the
    /// pooled transport.
    ///
    /// # Errors
    ///
    /// The pooled transport's error is propagated unchanged; there
    /// are no retries.
    pub async fn round_trip(
        &self,
        mut request: Request<Bytes>,
    ) -> Result<Response<Bytes>, BoxError> {
        if let Some(token) = &self.bearer_token {
            if !request.headers().contains_key(AUTHORIZATION) {
                request.headers_mut().insert(AUTHORIZATION, token.clone());
            }
        }

        let start = Instant::now();
        let mut metrics_labels = vec![KeyValue::new(
            HTTP_REQUEST_METHOD,
            request.method().to_string(),
        )];
        if let Some(scheme) = request.uri().scheme_str() {
            metrics_labels.push(KeyValue::new(URL_SCHEME, scheme.to_owned()));
        }
        if let Some(host) = request.uri().host() {
            metrics_labels.push(KeyValue::new(SERVER_ADDRESS, host.to_owned()));
        }
        if let Some(port) = port_or_known_default(request.uri()) {
            metrics_labels.push(KeyValue::new(SERVER_PORT, i64::from(port)));
        }

        let span = self.span_name.as_deref().map(|span_name| {
            let span = make_request_span(
                span_name,
                self.component_tag.as_deref().unwrap_or_default(),
                &request,
            );
            inject_context(&span, request.headers_mut());
            request.extensions_mut().insert(ClientTrace::new(&span));
            span
        });

        HTTP_REQUESTS_IN_FLIGHT.add(1, &metrics_labels);
        let fut = self.pool.send(request);
        let result = match span {
            Some(span) => {
                async move {
                    let span = tracing::Span::current();
                    tracing::debug!(phase = "request", state = "start");
                    let result = fut.await;
                    tracing::debug!(phase = "request", state = "end");

                    match &result {
                        Ok(response) => {
                            span.record("otel.status_code", "OK");
                            span.record(HTTP_RESPONSE_STATUS_CODE, response.status().as_u16());
                        }
                        Err(err) => {
                            span.record("otel.status_code", "ERROR");
                            span.record("rust.error", &**err as &dyn std::error::Error);
                        }
                    }

                    result
                }
                .instrument(span)
                .await
            }
            None => fut.await,
        };
        HTTP_REQUESTS_IN_FLIGHT.add(-1, &metrics_labels);

        let duration = start.elapsed().as_millis().try_into().unwrap_or(u64::MAX);
        match &result {
            Ok(response) => metrics_labels.push(KeyValue::new(
                HTTP_RESPONSE_STATUS_CODE,
                i64::from(response.status().as_u16()),
            )),
            Err(_) => metrics_labels.push(KeyValue::new(ERROR_TYPE, "NO_RESPONSE")),
        }
        HTTP_REQUESTS_DURATION_HISTOGRAM.record(duration, &metrics_labels);

        result
    }
}

/// Encode a bearer token as a sensitive `Authorization` header value.
///
/// Returns [`None`], with a warning, when the token contains bytes
/// that are not valid in a header: token injection is best effort and
/// must never fail a request.
pub(crate) fn bearer_header(token: &[u8]) -> Option<HeaderValue> {
    let mut value = Vec::with_capacity(b"Bearer ".len() + token.len());
    value.extend_from_slice(b"Bearer ");
    value.extend_from_slice(token);

    match HeaderValue::from_bytes(&value) {
        Ok(mut header) => {
            header.set_sensitive(true);
            Some(header)
        }
        Err(_) => {
            tracing::warn!("Bearer token is not a valid header value, not injecting it");
            None
        }
    }
}

/// Periodically force-reclaim idle connections until shut down.
///
/// This keeps idle sockets from pinning stale hosts when DNS rotates
/// faster than the pool's own idle timeout triggers.
async fn sweep_loop(pool: Arc<dyn PooledTransport>, period: Duration, shutdown: CancellationToken) {
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;

            () = shutdown.cancelled() => {
                tracing::debug!("Shutting down idle connection sweeper");
                return;
            }

            _ = ticker.tick() => {
                pool.close_idle_connections();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bearer_header_is_sensitive() {
        let header = bearer_header(b"t0k3n").unwrap();
        assert_eq!(header.as_bytes(), b"Bearer t0k3n");
        assert!(header.is_sensitive());
    }

    #[test]
    fn invalid_token_is_dropped() {
        assert_eq!(bearer_header(b"bad\ntoken"), None);
    }
}
