//! HTTP content fetch against an open3dhub-style CDN
//!
//! Objects live at `<base>/download/<hash>`; content paths resolve to hashes
//! through `<base>/dns<path>`, which answers with `{"Hash": "..."}`.

use std::time::Duration;

use reqwest::StatusCode;
use reqwest::blocking::Client;
use reqwest::header::RANGE;
use serde::Deserialize;

use super::{ByteRange, ContentFetch};
use crate::core::{Error, Result};

/// Default CDN root
pub const DEFAULT_BASE_URL: &str = "http://open3dhub.com";

#[derive(Deserialize)]
struct DnsEntry {
    #[serde(rename = "Hash")]
    hash: String,
}

/// Blocking HTTP fetcher, meant to be called from worker threads
#[derive(Clone, Debug)]
pub struct HttpFetcher {
    client: Client,
    base_url: String,
}

impl HttpFetcher {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| Error::Config(format!("HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn download_url(&self, hash: &str) -> String {
        format!("{}/download/{}", self.base_url, hash)
    }

    pub fn dns_url(&self, path: &str) -> String {
        format!("{}/dns/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn get(&self, url: &str, key: &str, range: Option<ByteRange>) -> Result<Vec<u8>> {
        let mut request = self.client.get(url);
        if let Some(range) = range {
            if range.length == 0 {
                return Ok(Vec::new());
            }
            request = request.header(RANGE, format!("bytes={}-{}", range.offset, range.end() - 1));
        }

        let response = request.send().map_err(|e| Error::fetch(key, e))?;
        if response.status() == StatusCode::RANGE_NOT_SATISFIABLE {
            // Range starts past the end of the object
            return Ok(Vec::new());
        }
        let response = response.error_for_status().map_err(|e| Error::fetch(key, e))?;
        let status = response.status();
        let body = response.bytes().map_err(|e| Error::fetch(key, e))?;
        match range {
            Some(range) => Ok(ranged_body(status, range, &body)),
            None => Ok(body.to_vec()),
        }
    }
}

/// Bytes of `range` from a response to a ranged request.
///
/// Servers that ignore `Range` answer 200 with the whole object, which is
/// cut down here; a 206 body is capped at the requested length.
fn ranged_body(status: StatusCode, range: ByteRange, body: &[u8]) -> Vec<u8> {
    let (start, end) = if status == StatusCode::PARTIAL_CONTENT {
        (0, range.length)
    } else {
        log::debug!("server ignored Range {range:?} ({status}); slicing {} byte body", body.len());
        (range.offset, range.end())
    };
    let clamp = |at: u64| usize::try_from(at).map_or(body.len(), |at| at.min(body.len()));
    body[clamp(start)..clamp(end)].to_vec()
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self {
            client: Client::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }
}

impl ContentFetch for HttpFetcher {
    fn fetch(&self, hash: &str, range: Option<ByteRange>) -> Result<Vec<u8>> {
        log::trace!("GET {hash} {range:?}");
        self.get(&self.download_url(hash), hash, range)
    }

    fn resolve(&self, path: &str) -> Result<String> {
        let body = self.get(&self.dns_url(path), path, None)?;
        let entry: DnsEntry = serde_json::from_slice(&body)?;
        Ok(entry.hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_urls() {
        let fetcher = HttpFetcher::new("http://cdn.example/").unwrap();
        assert_eq!(fetcher.download_url("abc"), "http://cdn.example/download/abc");
        assert_eq!(
            fetcher.dns_url("/user/chair/progressive/0/tex.jpg"),
            "http://cdn.example/dns/user/chair/progressive/0/tex.jpg"
        );
    }

    #[test]
    fn test_empty_range_skips_request() {
        // Unroutable address: any real request would fail
        let fetcher = HttpFetcher::new("http://127.0.0.1:9").unwrap();
        let bytes = fetcher.fetch("abc", Some(ByteRange::new(10, 0))).unwrap();
        assert!(bytes.is_empty());
    }

    #[test]
    fn test_partial_content_body_is_kept() {
        let body = b"0123";
        assert_eq!(ranged_body(StatusCode::PARTIAL_CONTENT, ByteRange::new(40, 4), body), b"0123");
        assert_eq!(ranged_body(StatusCode::PARTIAL_CONTENT, ByteRange::new(40, 2), body), b"01");
    }

    #[test]
    fn test_whole_object_sliced_to_range() {
        let body: Vec<u8> = (0..10).collect();
        assert_eq!(ranged_body(StatusCode::OK, ByteRange::new(3, 4), &body), vec![3, 4, 5, 6]);
        assert_eq!(ranged_body(StatusCode::OK, ByteRange::new(8, 4), &body), vec![8, 9]);
        assert!(ranged_body(StatusCode::OK, ByteRange::new(12, 4), &body).is_empty());
    }

    #[test]
    fn test_dns_entry_parse() {
        let entry: DnsEntry = serde_json::from_str(r#"{"Hash": "deadbeef", "Size": 10}"#).unwrap();
        assert_eq!(entry.hash, "deadbeef");
    }
}
