// Copyright 2025 The Courier Developers.
//
// SPDX-License-Identifier: Apache-2.0
// Please see LICENSE in the repository root for full details.

use std::{
    io,
    task::{Context, Poll},
    time::Duration,
};

use futures_util::future::BoxFuture;
use http::Uri;
use hyper_util::client::legacy::connect::dns::{GaiAddrs, GaiResolver, Name};
use thiserror::Error;
use tower::{BoxError, Service};

use crate::trace::{ClientTrace, ConnectionPhase};

#[derive(Debug, Error)]
#[error("TLS handshake timed out")]
struct HandshakeTimeout;

/// DNS resolver reporting resolution boundaries on the request span.
#[derive(Debug, Clone)]
pub(crate) struct TracedResolver {
    inner: GaiResolver,
}

impl TracedResolver {
    pub(crate) fn new() -> Self {
        Self {
            inner: GaiResolver::new(),
        }
    }
}

impl Service<Name> for TracedResolver {
    type Response = GaiAddrs;
    type Error = io::Error;
    type Future = BoxFuture<'static, Result<GaiAddrs, io::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), io::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, name: Name) -> Self::Future {
        let trace = ClientTrace::from_current();
        let fut = self.inner.call(name);

        Box::pin(async move {
            trace.phase_start(ConnectionPhase::Dns);
            let result = fut.await;
            trace.phase_end(ConnectionPhase::Dns);
            result
        })
    }
}

/// Connector wrapper reporting the TCP connect phase. For HTTPS
/// targets it also opens the TLS phase, which [`TracedHandshake`]
/// closes once the handshake is through.
#[derive(Debug, Clone)]
pub(crate) struct TracedConnect<S> {
    inner: S,
}

impl<S> TracedConnect<S> {
    pub(crate) const fn new(inner: S) -> Self {
        Self { inner }
    }
}

impl<S> Service<Uri> for TracedConnect<S>
where
    S: Service<Uri>,
    S::Response: Send + 'static,
    S::Error: Send + 'static,
    S::Future: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<S::Response, S::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), S::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, uri: Uri) -> Self::Future {
        let https = uri.scheme_str() == Some("https");
        let trace = ClientTrace::from_current();
        let fut = self.inner.call(uri);

        Box::pin(async move {
            trace.phase_start(ConnectionPhase::Connect);
            let result = fut.await;
            trace.phase_end(ConnectionPhase::Connect);
            if https && result.is_ok() {
                trace.phase_start(ConnectionPhase::TlsHandshake);
            }
            result
        })
    }
}

/// Outermost connector wrapper: closes the TLS phase opened by
/// [`TracedConnect`] and enforces the handshake timeout over the
/// whole connection establishment.
#[derive(Debug, Clone)]
pub(crate) struct TracedHandshake<S> {
    inner: S,
    timeout: Option<Duration>,
}

impl<S> TracedHandshake<S> {
    pub(crate) const fn new(inner: S, timeout: Option<Duration>) -> Self {
        Self { inner, timeout }
    }
}

impl<S> Service<Uri> for TracedHandshake<S>
where
    S: Service<Uri>,
    S::Response: Send + 'static,
    S::Error: Into<BoxError> + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = S::Response;
    type Error = BoxError;
    type Future = BoxFuture<'static, Result<S::Response, BoxError>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), BoxError>> {
        self.inner.poll_ready(cx).map_err(Into::into)
    }

    fn call(&mut self, uri: Uri) -> Self::Future {
        let https = uri.scheme_str() == Some("https");
        let timeout = self.timeout;
        let trace = ClientTrace::from_current();
        let fut = self.inner.call(uri);

        Box::pin(async move {
            let result = match timeout {
                Some(timeout) => match tokio::time::timeout(timeout, fut).await {
                    Ok(result) => result.map_err(Into::into),
                    Err(_) => Err(BoxError::from(HandshakeTimeout)),
                },
                None => fut.await.map_err(Into::into),
            };
            if https && result.is_ok() {
                trace.phase_end(ConnectionPhase::TlsHandshake);
            }
            result
        })
    }
}
