// Copyright 2025 The Courier Developers.
//
// SPDX-License-Identifier: Apache-2.0
// Please see LICENSE in the repository root for full details.

#![allow(dead_code)]

use std::{
    collections::{BTreeMap, HashMap},
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
};

use bytes::Bytes;
use courier_http::{ClientTrace, ConnectionPhase, PooledTransport};
use courier_secrets::SecretsReader;
use futures_util::future::BoxFuture;
use http::{Request, Response, StatusCode, header::AUTHORIZATION};
use tower::BoxError;
use tracing::{
    Event,
    field::{Field, Visit},
    span::{Attributes, Id, Record},
};
use tracing_subscriber::{Layer, layer::Context, prelude::*, registry::LookupSpan};

/// A pooled-transport double recording the requests it receives.
pub struct RecordingTransport {
    pub requests: Mutex<Vec<Request<Bytes>>>,
    status: StatusCode,
    fail: bool,
    emit_phases: bool,
    idle_closes: AtomicUsize,
}

impl Default for RecordingTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self {
            requests: Mutex::new(Vec::new()),
            status: StatusCode::OK,
            fail: false,
            emit_phases: false,
            idle_closes: AtomicUsize::new(0),
        }
    }

    /// Fail every round trip with a transport error.
    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    /// Invoke the connection-phase callbacks on every round trip, as
    /// a connection-establishing transport would.
    pub fn with_phases(mut self) -> Self {
        self.emit_phases = true;
        self
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    /// The `Authorization` header of the `index`-th recorded request.
    pub fn authorization(&self, index: usize) -> Option<String> {
        self.requests.lock().unwrap()[index]
            .headers()
            .get(AUTHORIZATION)
            .map(|value| String::from_utf8_lossy(value.as_bytes()).into_owned())
    }

    pub fn idle_close_count(&self) -> usize {
        self.idle_closes.load(Ordering::SeqCst)
    }
}

impl PooledTransport for RecordingTransport {
    fn send(
        &self,
        mut request: Request<Bytes>,
    ) -> BoxFuture<'static, Result<Response<Bytes>, BoxError>> {
        // Take the trace out so the recorded request does not keep the
        // span alive past the round trip, as a consuming pool wouldn't.
        let trace = request.extensions_mut().remove::<ClientTrace>();
        self.requests.lock().unwrap().push(request);

        let status = self.status;
        let fail = self.fail;
        let emit_phases = self.emit_phases;

        Box::pin(async move {
            if emit_phases {
                if let Some(trace) = &trace {
                    for phase in [
                        ConnectionPhase::PoolWait,
                        ConnectionPhase::Dns,
                        ConnectionPhase::Connect,
                        ConnectionPhase::TlsHandshake,
                    ] {
                        trace.phase_start(phase);
                        trace.phase_end(phase);
                    }
                }
            }

            if fail {
                return Err(BoxError::from("connection reset by peer"));
            }

            Ok(Response::builder()
                .status(status)
                .body(Bytes::new())
                .unwrap())
        })
    }

    fn close_idle_connections(&self) {
        self.idle_closes.fetch_add(1, Ordering::SeqCst);
    }
}

/// A fixed in-memory token source.
pub struct StaticSecrets {
    secrets: HashMap<String, Bytes>,
    closed: AtomicBool,
}

impl StaticSecrets {
    pub fn new<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = (String, Bytes)>,
    {
        Self {
            secrets: entries.into_iter().collect(),
            closed: AtomicBool::new(false),
        }
    }

    pub fn was_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl SecretsReader for StaticSecrets {
    fn get_secret(&self, key: &str) -> Option<Bytes> {
        self.secrets.get(key).cloned()
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// A span captured by [`Capture`].
#[derive(Debug, Default, Clone)]
pub struct SpanRecord {
    pub id: u64,
    pub fields: BTreeMap<String, String>,
    pub closed: usize,
}

#[derive(Debug, Default)]
struct CaptureState {
    spans: Vec<SpanRecord>,
    events: Vec<BTreeMap<String, String>>,
}

/// A `tracing` layer capturing spans, field updates and events for
/// assertions.
#[derive(Debug, Default, Clone)]
pub struct Capture {
    state: Arc<Mutex<CaptureState>>,
}

impl Capture {
    /// A dispatcher for scoping this capture over a future via
    /// [`tracing::instrument::WithSubscriber`].
    pub fn dispatch(&self) -> tracing::Dispatch {
        tracing_subscriber::registry().with(self.clone()).into()
    }

    pub fn spans(&self) -> Vec<SpanRecord> {
        self.state.lock().unwrap().spans.clone()
    }

    pub fn events(&self) -> Vec<BTreeMap<String, String>> {
        self.state.lock().unwrap().events.clone()
    }

    /// The `(phase, state)` pairs of all captured phase events, in
    /// emission order.
    pub fn phase_events(&self) -> Vec<(String, String)> {
        self.events()
            .into_iter()
            .filter_map(|fields| {
                Some((
                    fields.get("phase")?.clone(),
                    fields.get("state")?.clone(),
                ))
            })
            .collect()
    }
}

struct FieldVisitor<'a>(&'a mut BTreeMap<String, String>);

impl Visit for FieldVisitor<'_> {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.0.insert(field.name().to_owned(), value.to_owned());
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        self.0.insert(field.name().to_owned(), format!("{value:?}"));
    }
}

impl<S> Layer<S> for Capture
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_new_span(&self, attrs: &Attributes<'_>, id: &Id, _ctx: Context<'_, S>) {
        let mut fields = BTreeMap::new();
        attrs.record(&mut FieldVisitor(&mut fields));
        self.state.lock().unwrap().spans.push(SpanRecord {
            id: id.into_u64(),
            fields,
            closed: 0,
        });
    }

    fn on_record(&self, id: &Id, values: &Record<'_>, _ctx: Context<'_, S>) {
        let mut state = self.state.lock().unwrap();
        if let Some(span) = state.spans.iter_mut().find(|span| span.id == id.into_u64()) {
            values.record(&mut FieldVisitor(&mut span.fields));
        }
    }

    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut fields = BTreeMap::new();
        event.record(&mut FieldVisitor(&mut fields));
        self.state.lock().unwrap().events.push(fields);
    }

    fn on_close(&self, id: Id, _ctx: Context<'_, S>) {
        let mut state = self.state.lock().unwrap();
        if let Some(span) = state.spans.iter_mut().find(|span| span.id == id.into_u64()) {
            span.closed += 1;
        }
    }
}
