// Copyright 2025 The Courier Developers.
//
// SPDX-License-Identifier: Apache-2.0
// Please see LICENSE in the repository root for full details.

//! An HTTP client decoration layer.
//!
//! [`Client`] and [`Transport`] wrap a pooled connection transport and
//! add three orthogonal behaviours on top of it:
//!
//! - bearer-token injection, sourced from a rotating
//!   [`SecretsReader`][courier_secrets::SecretsReader] and keyed
//!   through a [`Lookuper`];
//! - distributed-tracing instrumentation of each request's lifecycle
//!   (DNS, connect, TLS handshake, pool wait, full round trip);
//! - periodic idle-connection reclamation on a background timer.
//!
//! Reconfiguration is copy-on-write: [`Transport::with_bearer_token`]
//! and friends return a new transport sharing the same pool, so a
//! transport that is handling a request is never mutated concurrently.

#![deny(rustdoc::missing_crate_level_docs)]
#![allow(clippy::module_name_repetitions)]

use std::sync::LazyLock;

mod client;
mod connect;
mod lookup;
mod options;
mod pool;
mod trace;
mod transport;

pub use self::{
    client::{Client, Error},
    lookup::{HostLookuper, Lookuper, StaticLookuper},
    options::{DEFAULT_IDLE_CONN_TIMEOUT, DEFAULT_REFRESH_INTERVAL, Options, Timeouts},
    pool::{PooledClient, PooledTransport},
    trace::{ClientTrace, ConnectionPhase},
    transport::Transport,
};

static METER: LazyLock<opentelemetry::metrics::Meter> = LazyLock::new(|| {
    let scope = opentelemetry::InstrumentationScope::builder(env!("CARGO_PKG_NAME"))
        .with_version(env!("CARGO_PKG_VERSION"))
        .with_schema_url(opentelemetry_semantic_conventions::SCHEMA_URL)
        .build();

    opentelemetry::global::meter_with_scope(scope)
});
