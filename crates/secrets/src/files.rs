// Copyright 2025 The Courier Developers.
//
// SPDX-License-Identifier: Apache-2.0
// Please see LICENSE in the repository root for full details.

use std::{collections::HashMap, sync::Arc, time::Duration};

use arc_swap::ArcSwap;
use bytes::Bytes;
use camino::Utf8PathBuf;
use thiserror::Error;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::SecretsReader;

/// Error returned when registering a file with [`SecretFiles`].
#[derive(Debug, Error)]
pub enum SecretError {
    /// The file could not be read.
    #[error("failed to read secret file {path}")]
    Read {
        /// Path of the file that failed to read.
        path: Utf8PathBuf,

        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

/// A [`SecretsReader`] backed by files on disk.
///
/// Each registered file is re-read on a fixed interval by a background
/// task, so rotated tokens become visible without a restart. The
/// lookup key for a secret is the path it was registered under.
#[derive(Clone)]
pub struct SecretFiles {
    inner: Arc<Inner>,
    shutdown: CancellationToken,
}

struct Inner {
    secrets: ArcSwap<HashMap<String, Bytes>>,
    paths: ArcSwap<Vec<Utf8PathBuf>>,
}

impl SecretFiles {
    /// Create an empty store and spawn its refresh task.
    ///
    /// Must be called from within a Tokio runtime.
    #[must_use]
    pub fn new(refresh_interval: Duration) -> Self {
        let inner = Arc::new(Inner {
            secrets: ArcSwap::from_pointee(HashMap::new()),
            paths: ArcSwap::from_pointee(Vec::new()),
        });
        let shutdown = CancellationToken::new();

        tokio::spawn(refresh_loop(
            Arc::clone(&inner),
            refresh_interval,
            shutdown.clone(),
        ));

        Self { inner, shutdown }
    }

    /// Read `path` now and register it for periodic re-reads.
    ///
    /// Trailing ASCII whitespace is trimmed from the file contents, so
    /// a token file may end with a newline.
    ///
    /// # Errors
    ///
    /// Returns [`SecretError::Read`] when the initial read fails; the
    /// path is not registered in that case.
    pub fn add(&self, path: impl Into<Utf8PathBuf>) -> Result<(), SecretError> {
        let path = path.into();
        let raw = std::fs::read(path.as_std_path()).map_err(|source| SecretError::Read {
            path: path.clone(),
            source,
        })?;

        self.inner.store_secret(path.to_string(), trim_token(raw));
        self.inner.paths.rcu(|paths| {
            let mut paths = Vec::clone(paths);
            if !paths.contains(&path) {
                paths.push(path.clone());
            }
            paths
        });

        Ok(())
    }
}

impl SecretsReader for SecretFiles {
    fn get_secret(&self, key: &str) -> Option<Bytes> {
        self.inner.secrets.load().get(key).cloned()
    }

    fn close(&self) {
        self.shutdown.cancel();
    }
}

impl Inner {
    fn store_secret(&self, key: String, value: Bytes) {
        let mut next = HashMap::clone(&self.secrets.load());
        next.insert(key, value);
        self.secrets.store(Arc::new(next));
    }
}

/// Strip trailing ASCII whitespace from a token file's contents.
fn trim_token(mut raw: Vec<u8>) -> Bytes {
    let len = raw.trim_ascii_end().len();
    raw.truncate(len);
    Bytes::from(raw)
}

async fn refresh_loop(inner: Arc<Inner>, period: Duration, shutdown: CancellationToken) {
    let start = tokio::time::Instant::now() + period;
    let mut ticker = tokio::time::interval_at(start, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;

            () = shutdown.cancelled() => {
                tracing::debug!("Shutting down secret file refresher");
                return;
            }

            _ = ticker.tick() => {
                refresh(&inner).await;
            }
        }
    }
}

async fn refresh(inner: &Inner) {
    let paths = inner.paths.load_full();
    let mut next = HashMap::clone(&inner.secrets.load());

    for path in paths.iter() {
        match tokio::fs::read(path.as_std_path()).await {
            Ok(raw) => {
                next.insert(path.to_string(), trim_token(raw));
            }
            Err(err) => {
                // Keep the last good value on transient read failures
                tracing::warn!(
                    %path,
                    error = &err as &dyn std::error::Error,
                    "Failed to refresh secret file"
                );
            }
        }
    }

    inner.secrets.store(Arc::new(next));
}
