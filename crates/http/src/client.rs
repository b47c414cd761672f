// Copyright 2025 The Courier Developers.
//
// SPDX-License-Identifier: Apache-2.0
// Please see LICENSE in the repository root for full details.

use std::sync::Arc;

use bytes::Bytes;
use courier_secrets::{SecretFiles, SecretsReader};
use http::{
    Method, Request, Response,
    header::{AUTHORIZATION, CONTENT_TYPE},
};
use thiserror::Error;
use tower::BoxError;

use crate::{
    lookup::{Lookuper, StaticLookuper},
    options::{DEFAULT_REFRESH_INTERVAL, Options},
    transport::{Transport, bearer_header},
};

/// Error returned by [`Client`] operations.
#[derive(Debug, Error)]
pub enum Error {
    /// The request could not be constructed.
    #[error("failed to build the request")]
    Request(#[from] http::Error),

    /// The form body could not be encoded.
    #[error("failed to encode the form body")]
    EncodeForm(#[from] serde_urlencoded::ser::Error),

    /// The underlying transport failed; the error is propagated
    /// unchanged from the pooled transport.
    #[error("{0}")]
    Transport(BoxError),
}

/// An HTTP client composing a [`Transport`] with per-request bearer
/// token resolution and convenience request builders.
///
/// On teardown, [`Client::close`] must be called to release the
/// transport's sweep task and the token source.
pub struct Client {
    transport: Transport,
    secrets_reader: Option<Arc<dyn SecretsReader>>,
    lookuper: Option<Arc<dyn Lookuper>>,
}

impl Client {
    /// Build a client over the built-in pooled transport.
    ///
    /// When [`Options::bearer_token_file`] is set and no custom
    /// [`Options::secrets_reader`] is given, a [`SecretFiles`] store
    /// refreshing on [`Options::bearer_token_refresh_interval`] is
    /// created for it, and a [`StaticLookuper`] on the file path is
    /// installed unless [`Options::lookuper`] is set. A token file
    /// that cannot be read is logged and skipped: the client stays
    /// usable, requests just go out without an `Authorization`
    /// header.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics if the platform TLS configuration cannot be built,
    /// which should never happen.
    #[must_use]
    pub fn new(options: Options) -> Self {
        let transport = Transport::new(&options);
        Self::with_transport(transport, options)
    }

    /// Compose a client over an explicit transport, applying the same
    /// token-source wiring as [`Client::new`].
    #[must_use]
    pub fn with_transport(transport: Transport, options: Options) -> Self {
        let mut secrets_reader = options.secrets_reader;
        let mut lookuper = options.lookuper;

        if let Some(path) = &options.bearer_token_file {
            if secrets_reader.is_none() {
                let interval = options
                    .bearer_token_refresh_interval
                    .unwrap_or(DEFAULT_REFRESH_INTERVAL);
                let files = SecretFiles::new(interval);
                if let Err(err) = files.add(path.clone()) {
                    // Not fatal: the client stays usable, unauthenticated
                    tracing::error!(
                        error = &err as &dyn std::error::Error,
                        "Failed to read bearer token file"
                    );
                }
                secrets_reader = Some(Arc::new(files));
            }
            if lookuper.is_none() {
                lookuper = Some(Arc::new(StaticLookuper::new(path.as_str())));
            }
        }

        Self {
            transport,
            secrets_reader,
            lookuper,
        }
    }

    /// Send a `GET` request to `url`.
    ///
    /// # Errors
    ///
    /// Fails if the URL is invalid or the transport errors.
    pub async fn get(&self, url: &str) -> Result<Response<Bytes>, Error> {
        let request = Request::builder()
            .method(Method::GET)
            .uri(url)
            .body(Bytes::new())?;
        self.send(request).await
    }

    /// Send a `HEAD` request to `url`.
    ///
    /// # Errors
    ///
    /// Fails if the URL is invalid or the transport errors.
    pub async fn head(&self, url: &str) -> Result<Response<Bytes>, Error> {
        let request = Request::builder()
            .method(Method::HEAD)
            .uri(url)
            .body(Bytes::new())?;
        self.send(request).await
    }

    /// Send a `POST` request with the given content type and body.
    ///
    /// # Errors
    ///
    /// Fails if the URL or content type is invalid, or the transport
    /// errors.
    pub async fn post(
        &self,
        url: &str,
        content_type: &str,
        body: Bytes,
    ) -> Result<Response<Bytes>, Error> {
        let request = Request::builder()
            .method(Method::POST)
            .uri(url)
            .header(CONTENT_TYPE, content_type)
            .body(body)?;
        self.send(request).await
    }

    /// Send a `POST` request with a URL-encoded form body.
    ///
    /// # Errors
    ///
    /// Fails if the URL is invalid, the form cannot be encoded, or
    /// the transport errors.
    pub async fn post_form<T>(&self, url: &str, form: &T) -> Result<Response<Bytes>, Error>
    where
        T: serde::Serialize + ?Sized,
    {
        let body = serde_urlencoded::to_string(form)?;
        self.post(url, "application/x-www-form-urlencoded", Bytes::from(body))
            .await
    }

    /// Send a request through the transport.
    ///
    /// When a token source is configured and the request carries no
    /// `Authorization` header, the lookup key is resolved from the
    /// request URI and the current secret, if found, is injected as
    /// `Authorization: Bearer <secret>`. A caller-supplied
    /// `Authorization` header is never overwritten, and a secret that
    /// is not found leaves the request untouched.
    ///
    /// # Errors
    ///
    /// Transport errors are propagated unchanged in
    /// [`Error::Transport`].
    pub async fn send(&self, mut request: Request<Bytes>) -> Result<Response<Bytes>, Error> {
        if let (Some(reader), Some(lookuper)) = (&self.secrets_reader, &self.lookuper) {
            if !request.headers().contains_key(AUTHORIZATION) {
                let header = lookuper
                    .lookup(request.uri())
                    .and_then(|key| reader.get_secret(&key))
                    .and_then(|token| bearer_header(&token));
                if let Some(header) = header {
                    request.headers_mut().insert(AUTHORIZATION, header);
                }
            }
        }

        self.transport
            .round_trip(request)
            .await
            .map_err(Error::Transport)
    }

    /// Release the transport's sweep task and the token source.
    ///
    /// Callers own the single `close` call; requests issued afterwards
    /// are not guarded against, but will not deadlock.
    pub fn close(&self) {
        self.transport.close();
        if let Some(reader) = &self.secrets_reader {
            reader.close();
        }
    }

    /// Force-reclaim idle pooled connections now.
    pub fn close_idle_connections(&self) {
        self.transport.close_idle_connections();
    }
}
