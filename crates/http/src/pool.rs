// Copyright 2025 The Courier Developers.
//
// SPDX-License-Identifier: Apache-2.0
// Please see LICENSE in the repository root for full details.

use std::{sync::Arc, time::Duration};

use arc_swap::ArcSwap;
use bytes::Bytes;
use futures_util::future::BoxFuture;
use http::{Request, Response};
use http_body_util::{BodyExt, Full};
use hyper_util::{
    client::legacy,
    rt::{TokioExecutor, TokioTimer},
};
use rustls_platform_verifier::ConfigVerifierExt;
use tower::BoxError;

use crate::{
    connect::{TracedConnect, TracedHandshake, TracedResolver},
    options::Options,
};

/// The underlying pooled-connection primitive.
///
/// The [`Transport`][crate::Transport] treats it as a black box: it
/// manages physical connections, keep-alive and reuse, and must be
/// safe for concurrent use. [`PooledClient`] is the built-in
/// implementation; tests substitute their own.
pub trait PooledTransport: Send + Sync + 'static {
    /// Dispatch one request over a pooled connection.
    fn send(&self, request: Request<Bytes>)
    -> BoxFuture<'static, Result<Response<Bytes>, BoxError>>;

    /// Synchronously drop the currently idle pooled connections.
    fn close_idle_connections(&self);
}

type Connector =
    TracedHandshake<hyper_rustls::HttpsConnector<TracedConnect<HttpConnector>>>;
type HttpConnector = legacy::connect::HttpConnector<TracedResolver>;
type InnerClient = legacy::Client<Connector, Full<Bytes>>;

/// The built-in [`PooledTransport`], over hyper's pooled client with
/// a rustls connector.
///
/// The connector stack reports the DNS, connect and TLS phases on the
/// request span through [`ClientTrace`][crate::ClientTrace] handles;
/// hyper's pool does not expose checkout, so the pool-wait phase is
/// not reported by this implementation.
pub struct PooledClient {
    client: ArcSwap<InnerClient>,
    config: PoolConfig,
}

#[derive(Debug, Clone)]
struct PoolConfig {
    disable_keep_alives: bool,
    max_idle_conns_per_host: Option<usize>,
    max_buf_size: Option<usize>,
    idle_conn_timeout: Duration,
    tls_handshake_timeout: Option<Duration>,
    response_header_timeout: Option<Duration>,
}

impl PooledClient {
    /// Build the pooled client described by `options`.
    ///
    /// # Panics
    ///
    /// Panics if the platform TLS configuration cannot be built,
    /// which should never happen.
    #[must_use]
    pub fn new(options: &Options) -> Self {
        let timeouts = options.timeouts();
        let config = PoolConfig {
            disable_keep_alives: options.disable_keep_alives,
            max_idle_conns_per_host: options.max_idle_conns_per_host,
            max_buf_size: options.max_buf_size,
            idle_conn_timeout: timeouts.idle_conn,
            tls_handshake_timeout: timeouts.tls_handshake,
            response_header_timeout: timeouts.response_header,
        };
        let client = build_client(&config);

        Self {
            client: ArcSwap::from_pointee(client),
            config,
        }
    }
}

impl PooledTransport for PooledClient {
    fn send(
        &self,
        request: Request<Bytes>,
    ) -> BoxFuture<'static, Result<Response<Bytes>, BoxError>> {
        let client = self.client.load_full();
        let response_header_timeout = self.config.response_header_timeout;

        Box::pin(async move {
            let request = request.map(Full::new);
            let fut = client.request(request);

            // The dispatch future resolves once the response headers
            // are in, so the header timeout wraps it directly.
            let response = match response_header_timeout {
                Some(timeout) => tokio::time::timeout(timeout, fut).await??,
                None => fut.await?,
            };

            let (parts, body) = response.into_parts();
            let body = body.collect().await?.to_bytes();
            Ok(Response::from_parts(parts, body))
        })
    }

    fn close_idle_connections(&self) {
        // Swapping in a fresh client drops the previous pool. Its idle
        // connections close immediately; in-flight requests hold their
        // own clone and finish undisturbed.
        self.client.store(Arc::new(build_client(&self.config)));
    }
}

fn build_client(config: &PoolConfig) -> InnerClient {
    // The explicit typing here is because `with_tls_config` accepts
    // any impl, and helps us detect breaking changes in the
    // rustls-platform-verifier API.
    let tls_config: rustls::ClientConfig =
        rustls::ClientConfig::with_platform_verifier().expect("failed to create TLS config");

    let mut http = legacy::connect::HttpConnector::new_with_resolver(TracedResolver::new());
    http.enforce_http(false);

    let https = hyper_rustls::HttpsConnectorBuilder::new()
        .with_tls_config(tls_config)
        .https_or_http()
        .enable_http1()
        .enable_http2()
        .wrap_connector(TracedConnect::new(http));
    let connector = TracedHandshake::new(https, config.tls_handshake_timeout);

    let mut builder = legacy::Client::builder(TokioExecutor::new());
    builder
        .pool_timer(TokioTimer::new())
        .pool_idle_timeout(config.idle_conn_timeout);
    if config.disable_keep_alives {
        builder.pool_max_idle_per_host(0);
    } else if let Some(max_idle) = config.max_idle_conns_per_host {
        builder.pool_max_idle_per_host(max_idle);
    }
    if let Some(max_buf_size) = config.max_buf_size {
        builder.http1_max_buf_size(max_buf_size);
    }

    builder.build(connector)
}
