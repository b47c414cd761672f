// Copyright 2025 The Courier Developers.
//
// SPDX-License-Identifier: Apache-2.0
// Please see LICENSE in the repository root for full details.

use std::collections::HashMap;

use http::Uri;

/// Maps a request URI to the key passed to
/// [`SecretsReader::get_secret`][courier_secrets::SecretsReader::get_secret].
pub trait Lookuper: Send + Sync + 'static {
    /// Returns the lookup key for `uri`, or [`None`] when no secret
    /// applies to this target.
    fn lookup(&self, uri: &Uri) -> Option<String>;
}

/// A [`Lookuper`] which always resolves to the same key, regardless of
/// the request URI.
#[derive(Debug, Clone)]
pub struct StaticLookuper {
    key: String,
}

impl StaticLookuper {
    /// Create a lookuper that always resolves to `key`.
    pub fn new(key: impl Into<String>) -> Self {
        Self { key: key.into() }
    }
}

impl Lookuper for StaticLookuper {
    fn lookup(&self, _uri: &Uri) -> Option<String> {
        Some(self.key.clone())
    }
}

/// A [`Lookuper`] which resolves keys by the request URI's hostname.
///
/// The match is on the exact hostname; scheme and port are ignored.
#[derive(Debug, Clone, Default)]
pub struct HostLookuper {
    keys: HashMap<String, String>,
}

impl HostLookuper {
    /// Create a lookuper from a hostname-to-key mapping.
    pub fn new(keys: impl IntoIterator<Item = (String, String)>) -> Self {
        Self {
            keys: keys.into_iter().collect(),
        }
    }
}

impl Lookuper for HostLookuper {
    fn lookup(&self, uri: &Uri) -> Option<String> {
        self.keys.get(uri.host()?).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_lookuper_ignores_the_uri() {
        let lookuper = StaticLookuper::new("/var/run/secrets/token");

        for uri in ["https://a.example.com/x", "http://b.example.com:8080"] {
            let uri: Uri = uri.parse().unwrap();
            assert_eq!(
                lookuper.lookup(&uri).as_deref(),
                Some("/var/run/secrets/token")
            );
        }
    }

    #[test]
    fn host_lookuper_matches_by_hostname() {
        let lookuper = HostLookuper::new([
            ("a.example.com".to_owned(), "k1".to_owned()),
            ("b.example.com".to_owned(), "k2".to_owned()),
        ]);

        let uri: Uri = "https://a.example.com/x".parse().unwrap();
        assert_eq!(lookuper.lookup(&uri).as_deref(), Some("k1"));

        // Scheme and port play no part in the match
        let uri: Uri = "http://b.example.com:8080/y?q=1".parse().unwrap();
        assert_eq!(lookuper.lookup(&uri).as_deref(), Some("k2"));

        let uri: Uri = "https://c.example.com".parse().unwrap();
        assert_eq!(lookuper.lookup(&uri), None);
    }

    #[test]
    fn host_lookuper_without_host_resolves_nothing() {
        let lookuper = HostLookuper::new([("a.example.com".to_owned(), "k1".to_owned())]);

        let uri: Uri = "/relative/path".parse().unwrap();
        assert_eq!(lookuper.lookup(&uri), None);
    }
}
