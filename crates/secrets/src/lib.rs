// Copyright 2025 The Courier Developers.
//
// SPDX-License-Identifier: Apache-2.0
// Please see LICENSE in the repository root for full details.

//! Secret stores consumed by the Courier HTTP client.
//!
//! The client only depends on the [`SecretsReader`] trait; this crate
//! also ships [`SecretFiles`], a file-backed store which re-reads its
//! registered files on a fixed interval so that rotated credentials
//! are picked up without restarting the process.

#![deny(rustdoc::missing_crate_level_docs)]

mod files;

use bytes::Bytes;

pub use self::files::{SecretError, SecretFiles};

/// A source of secrets, addressed by an opaque lookup key.
///
/// Implementations are expected to serve [`get_secret`] from memory
/// and refresh their backing store out of band.
///
/// [`get_secret`]: SecretsReader::get_secret
pub trait SecretsReader: Send + Sync + 'static {
    /// Returns the current value for `key`, or [`None`] if the store
    /// has no secret under that key.
    fn get_secret(&self, key: &str) -> Option<Bytes>;

    /// Releases the resources held by the store, including any
    /// background refresh task. Callers own the single `close` call.
    fn close(&self);
}
