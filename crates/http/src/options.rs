// Copyright 2025 The Courier Developers.
//
// SPDX-License-Identifier: Apache-2.0
// Please see LICENSE in the repository root for full details.

use std::{fmt, sync::Arc, time::Duration};

use camino::Utf8PathBuf;
use courier_secrets::SecretsReader;

use crate::lookup::Lookuper;

/// Idle-connection sweep interval used when neither
/// [`Options::idle_conn_timeout`] nor [`Options::timeout`] is set.
pub const DEFAULT_IDLE_CONN_TIMEOUT: Duration = Duration::from_secs(30);

/// Bearer-token refresh interval used when
/// [`Options::bearer_token_refresh_interval`] is not set.
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Construction-time configuration for [`Transport`][crate::Transport]
/// and [`Client`][crate::Client].
///
/// Options are read once at construction and never re-evaluated.
/// [`Options::timeout`] acts as the default for every per-phase
/// timeout left unset; see [`Options::timeouts`] for the derivation.
#[derive(Clone, Default)]
pub struct Options {
    /// Disable connection reuse; every request opens a fresh
    /// connection.
    pub disable_keep_alives: bool,

    /// Maximum number of idle pooled connections kept per host.
    pub max_idle_conns_per_host: Option<usize>,

    /// Maximum HTTP/1 read buffer size, in bytes.
    pub max_buf_size: Option<usize>,

    /// Default timeout backfilling every per-phase timeout left unset.
    pub timeout: Option<Duration>,

    /// Timeout for establishing a connection through the TLS
    /// handshake; falls back to [`Options::timeout`].
    pub tls_handshake_timeout: Option<Duration>,

    /// Interval of the idle-connection sweep, and idle timeout of the
    /// pool itself; falls back to [`Options::timeout`], then to
    /// [`DEFAULT_IDLE_CONN_TIMEOUT`].
    pub idle_conn_timeout: Option<Duration>,

    /// Timeout for receiving the response headers; falls back to
    /// [`Options::timeout`].
    pub response_header_timeout: Option<Duration>,

    /// Timeout for a `100 Continue` response; falls back to
    /// [`Options::timeout`]. Derived for custom
    /// [`PooledTransport`][crate::PooledTransport] implementations;
    /// the built-in pooled client has no expect-continue wait.
    pub expect_continue_timeout: Option<Duration>,

    /// Span name for request tracing. Tracing is disabled entirely
    /// when unset.
    pub span_name: Option<String>,

    /// Value of the `component` tag set on request spans.
    pub component_tag: Option<String>,

    /// Path of a bearer-token file to inject on requests. Ignored
    /// when [`Options::secrets_reader`] is provided.
    pub bearer_token_file: Option<Utf8PathBuf>,

    /// Refresh interval for [`Options::bearer_token_file`]; falls
    /// back to [`DEFAULT_REFRESH_INTERVAL`].
    pub bearer_token_refresh_interval: Option<Duration>,

    /// Token source used to resolve bearer tokens.
    pub secrets_reader: Option<Arc<dyn SecretsReader>>,

    /// Strategy mapping request URIs to token lookup keys. When unset
    /// and a token file is configured, a
    /// [`StaticLookuper`][crate::StaticLookuper] on the file path is
    /// installed.
    pub lookuper: Option<Arc<dyn Lookuper>>,
}

/// Per-phase timeouts after default derivation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    /// Connection establishment through the TLS handshake.
    pub tls_handshake: Option<Duration>,

    /// Idle-connection sweep interval and pool idle timeout.
    pub idle_conn: Duration,

    /// Wait for the response headers.
    pub response_header: Option<Duration>,

    /// Wait for a `100 Continue` response.
    pub expect_continue: Option<Duration>,
}

impl Options {
    /// Derive the per-phase timeouts, backfilling unset values from
    /// [`Options::timeout`] and the hardcoded fallbacks.
    #[must_use]
    pub fn timeouts(&self) -> Timeouts {
        Timeouts {
            tls_handshake: self.tls_handshake_timeout.or(self.timeout),
            idle_conn: self
                .idle_conn_timeout
                .or(self.timeout)
                .unwrap_or(DEFAULT_IDLE_CONN_TIMEOUT),
            response_header: self.response_header_timeout.or(self.timeout),
            expect_continue: self.expect_continue_timeout.or(self.timeout),
        }
    }
}

impl fmt::Debug for Options {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Options")
            .field("disable_keep_alives", &self.disable_keep_alives)
            .field("max_idle_conns_per_host", &self.max_idle_conns_per_host)
            .field("max_buf_size", &self.max_buf_size)
            .field("timeout", &self.timeout)
            .field("tls_handshake_timeout", &self.tls_handshake_timeout)
            .field("idle_conn_timeout", &self.idle_conn_timeout)
            .field("response_header_timeout", &self.response_header_timeout)
            .field("expect_continue_timeout", &self.expect_continue_timeout)
            .field("span_name", &self.span_name)
            .field("component_tag", &self.component_tag)
            .field("bearer_token_file", &self.bearer_token_file)
            .field(
                "bearer_token_refresh_interval",
                &self.bearer_token_refresh_interval,
            )
            .field("secrets_reader", &self.secrets_reader.is_some())
            .field("lookuper", &self.lookuper.is_some())
            .finish()
    }
}
