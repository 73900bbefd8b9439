use std::io::Read;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use flate2::read::{DeflateDecoder, GzDecoder, ZlibDecoder};
use mockall::automock;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::header::{self, HeaderMap, HeaderValue};
use tracing::{debug, warn};
use url::Url;

use crate::server::utils::host_utils::is_allowed_url;

const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

// only advertise what decode_body can actually undo, reqwest is built without its own decoders
const ACCEPT_ENCODING: &str = "gzip, deflate, zstd";

/// embed pages are small, anything bigger than this is not a player page
pub const MAX_PAGE_BYTES: usize = 5 * 1024 * 1024;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("the embed host took too long to respond")]
    Timeout,

    #[error("the embed host responded with status {0}")]
    Status(u16),

    #[error("the embed host redirected too many times or off the allowed hosts")]
    Redirect,

    #[error("the embed page is larger than {} bytes", MAX_PAGE_BYTES)]
    TooLarge,

    #[error("could not reach the embed host: {0}")]
    Network(String),

    #[error("could not decode the embed page: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout
        } else if e.is_redirect() {
            Self::Redirect
        } else if let Some(status) = e.status() {
            Self::Status(status.as_u16())
        } else {
            // without_url keeps the message short, the caller already knows which url it asked for
            Self::Network(e.without_url().to_string())
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedPage {
    pub html: String,
    /// where the page ended up after redirects, relative urls in it resolve against this
    pub url: Url,
}

pub type DynHtmlFetcher = Arc<dyn HtmlFetcherTrait + Send + Sync>;

#[automock]
#[async_trait]
pub trait HtmlFetcherTrait {
    /// GET a page with browser headers, `referer` is sent when following a nested frame
    async fn fetch(&self, url: &Url, referer: Option<Url>) -> Result<FetchedPage, FetchError>;
}

pub struct HtmlFetcher {
    http: reqwest::Client,
}

impl HtmlFetcher {
    pub fn new(timeout: Duration, max_redirects: usize) -> anyhow::Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::ACCEPT,
            HeaderValue::from_static(
                "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8",
            ),
        );
        headers.insert(
            header::ACCEPT_LANGUAGE,
            HeaderValue::from_static("en-US,en;q=0.5"),
        );
        headers.insert(
            header::ACCEPT_ENCODING,
            HeaderValue::from_static(ACCEPT_ENCODING),
        );
        headers.insert(header::DNT, HeaderValue::from_static("1"));
        headers.insert(
            header::UPGRADE_INSECURE_REQUESTS,
            HeaderValue::from_static("1"),
        );

        // a trusted host redirecting somewhere else would make us an open proxy, so redirects
        // stop at the allowlist as well as at the hop limit
        let redirect_policy = reqwest::redirect::Policy::custom(move |attempt| {
            if attempt.previous().len() > max_redirects {
                attempt.error("too many redirects")
            } else if !is_allowed_url(attempt.url()) {
                attempt.error("redirect left the allowed hosts")
            } else {
                attempt.follow()
            }
        });

        let http = reqwest::Client::builder()
            .user_agent(BROWSER_USER_AGENT)
            .default_headers(headers)
            .timeout(timeout)
            .redirect(redirect_policy)
            .build()
            .context("failed to build upstream http client")?;

        Ok(Self { http })
    }
}

/// reads at most one byte past the page cap, so an oversized or inflating body stops early
fn read_limited(reader: impl Read) -> Result<Vec<u8>, FetchError> {
    let mut out = Vec::new();
    reader
        .take(MAX_PAGE_BYTES as u64 + 1)
        .read_to_end(&mut out)
        .map_err(|e| FetchError::Decode(e.to_string()))?;

    if out.len() > MAX_PAGE_BYTES {
        return Err(FetchError::TooLarge);
    }

    Ok(out)
}

/// undo the upstream Content-Encoding
pub fn decode_body(bytes: &[u8], content_encoding: Option<&str>) -> Result<Vec<u8>, FetchError> {
    let encoding = content_encoding.map(|e| e.trim().to_ascii_lowercase());
    match encoding.as_deref() {
        Some("zstd") => {
            let decoder = zstd::stream::read::Decoder::new(bytes)
                .map_err(|e| FetchError::Decode(e.to_string()))?;
            read_limited(decoder)
        }
        Some("gzip") | Some("x-gzip") => read_limited(GzDecoder::new(bytes)),
        // RFC 9110 deflate is zlib wrapped, plenty of servers send raw deflate anyway
        Some("deflate") => match read_limited(ZlibDecoder::new(bytes)) {
            Err(FetchError::Decode(_)) => read_limited(DeflateDecoder::new(bytes)),
            decoded => decoded,
        },
        None | Some("") | Some("identity") => read_limited(bytes),
        Some(other) => Err(FetchError::Decode(format!(
            "unsupported content encoding '{}'",
            other
        ))),
    }
}

static META_CHARSET_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)<meta[^>]*?charset\s*=\s*["']?\s*([a-z0-9_.:\-]+)"#)
        .expect("meta charset pattern is valid")
});

/// the charset a page claims, from the Content-Type header or else a `<meta>` near the top
pub fn declared_charset(content_type: Option<&str>, body: &[u8]) -> Option<String> {
    let from_header = content_type.and_then(|value| {
        value.split(';').skip(1).find_map(|param| {
            let (key, charset) = param.split_once('=')?;
            key.trim()
                .eq_ignore_ascii_case("charset")
                .then(|| charset.trim().trim_matches('"').to_ascii_lowercase())
        })
    });
    if from_header.as_deref().is_some_and(|c| !c.is_empty()) {
        return from_header;
    }

    let head = String::from_utf8_lossy(&body[..body.len().min(1024)]);
    META_CHARSET_RE
        .captures(&head)
        .map(|caps| caps[1].to_ascii_lowercase())
}

fn is_utf8_label(charset: &str) -> bool {
    matches!(charset, "utf-8" | "utf8" | "unicode-1-1-utf-8")
}

#[async_trait]
impl HtmlFetcherTrait for HtmlFetcher {
    async fn fetch(&self, url: &Url, referer: Option<Url>) -> Result<FetchedPage, FetchError> {
        let mut request = self.http.get(url.clone());
        if let Some(referer) = referer {
            request = request.header(header::REFERER, referer.as_str());
        }

        debug!("Fetching embed page: {}", url);

        let mut response = request.send().await.map_err(|e| {
            warn!("Upstream request to {} failed: {}", url, e);
            FetchError::from(e)
        })?;

        let status = response.status();
        if !status.is_success() {
            warn!("Upstream {} returned {}", url, status);
            return Err(FetchError::Status(status.as_u16()));
        }

        if response
            .content_length()
            .is_some_and(|len| len as usize > MAX_PAGE_BYTES)
        {
            return Err(FetchError::TooLarge);
        }

        let final_url = response.url().clone();
        let header_value = |name: header::HeaderName| {
            response
                .headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(|s| s.to_string())
        };
        let content_encoding = header_value(header::CONTENT_ENCODING);
        let content_type = header_value(header::CONTENT_TYPE);

        // no Content-Length (chunked) or a lying one, so the cap is enforced while reading too
        let mut wire = Vec::new();
        while let Some(chunk) = response.chunk().await.map_err(FetchError::from)? {
            if wire.len() + chunk.len() > MAX_PAGE_BYTES {
                warn!("Upstream {} sent more than {} bytes", final_url, MAX_PAGE_BYTES);
                return Err(FetchError::TooLarge);
            }
            wire.extend_from_slice(&chunk);
        }
        let wire_len = wire.len();

        let body = tokio::task::spawn_blocking(move || {
            decode_body(&wire, content_encoding.as_deref())
        })
        .await
        .map_err(|e| FetchError::Decode(e.to_string()))??;

        if let Some(charset) = declared_charset(content_type.as_deref(), &body)
            .filter(|charset| !is_utf8_label(charset))
        {
            warn!(
                "Upstream {} declares charset {}, decoding as utf-8 anyway",
                final_url, charset
            );
        }

        debug!(
            "Fetched {} ({} bytes on the wire, {} decoded)",
            final_url,
            wire_len,
            body.len()
        );

        Ok(FetchedPage {
            html: String::from_utf8_lossy(&body).into_owned(),
            url: final_url,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::{Compression, write::GzEncoder};
    use std::io::Write;

    #[test]
    fn passes_identity_bodies_through() {
        assert_eq!(decode_body(b"<p>x</p>", None).unwrap(), b"<p>x</p>");
        assert_eq!(decode_body(b"<p>x</p>", Some("identity")).unwrap(), b"<p>x</p>");
    }

    #[test]
    fn decodes_gzip_and_zstd() {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(b"<html>gz</html>").unwrap();
        let gz = encoder.finish().unwrap();
        assert_eq!(decode_body(&gz, Some("gzip")).unwrap(), b"<html>gz</html>");

        let zst = zstd::encode_all(&b"<html>zstd</html>"[..], 3).unwrap();
        assert_eq!(decode_body(&zst, Some("ZSTD")).unwrap(), b"<html>zstd</html>");
    }

    #[test]
    fn decodes_zlib_and_raw_deflate() {
        let mut zlib = flate2::write::ZlibEncoder::new(Vec::new(), Compression::default());
        zlib.write_all(b"zlib body").unwrap();
        let zlib = zlib.finish().unwrap();
        assert_eq!(decode_body(&zlib, Some("deflate")).unwrap(), b"zlib body");

        let mut raw = flate2::write::DeflateEncoder::new(Vec::new(), Compression::default());
        raw.write_all(b"raw body").unwrap();
        let raw = raw.finish().unwrap();
        assert_eq!(decode_body(&raw, Some("deflate")).unwrap(), b"raw body");
    }

    #[test]
    fn rejects_garbage_and_unknown_encodings() {
        assert!(matches!(
            decode_body(b"not gzip", Some("gzip")),
            Err(FetchError::Decode(_))
        ));
        assert!(matches!(
            decode_body(b"x", Some("br")),
            Err(FetchError::Decode(_))
        ));
    }

    #[test]
    fn stops_inflating_past_the_page_cap() {
        // 64 MiB of zeros compresses to a few tens of KiB
        let zeros = vec![0u8; 1024 * 1024];
        let mut gz = GzEncoder::new(Vec::new(), Compression::best());
        for _ in 0..64 {
            gz.write_all(&zeros).unwrap();
        }
        let gz = gz.finish().unwrap();
        assert!(gz.len() < MAX_PAGE_BYTES / 16);
        assert_eq!(decode_body(&gz, Some("gzip")), Err(FetchError::TooLarge));

        let mut zst = zstd::stream::write::Encoder::new(Vec::new(), 3).unwrap();
        for _ in 0..64 {
            zst.write_all(&zeros).unwrap();
        }
        let zst = zst.finish().unwrap();
        assert_eq!(decode_body(&zst, Some("zstd")), Err(FetchError::TooLarge));

        let mut zlib = flate2::write::ZlibEncoder::new(Vec::new(), Compression::best());
        for _ in 0..8 {
            zlib.write_all(&zeros).unwrap();
        }
        let zlib = zlib.finish().unwrap();
        assert_eq!(decode_body(&zlib, Some("deflate")), Err(FetchError::TooLarge));
    }

    #[test]
    fn keeps_pages_right_at_the_cap() {
        let body = vec![b'a'; MAX_PAGE_BYTES];
        let mut gz = GzEncoder::new(Vec::new(), Compression::fast());
        gz.write_all(&body).unwrap();
        let gz = gz.finish().unwrap();

        assert_eq!(decode_body(&gz, Some("gzip")).unwrap().len(), MAX_PAGE_BYTES);
        assert_eq!(
            decode_body(&vec![b'a'; MAX_PAGE_BYTES + 1], None),
            Err(FetchError::TooLarge)
        );
    }

    #[test]
    fn reads_the_declared_charset() {
        assert_eq!(
            declared_charset(Some("text/html; charset=ISO-8859-1"), b"<p>x</p>").as_deref(),
            Some("iso-8859-1")
        );
        assert_eq!(
            declared_charset(Some(r#"text/html;charset="utf-8""#), b"").as_deref(),
            Some("utf-8")
        );
        assert_eq!(
            declared_charset(
                Some("text/html"),
                br#"<html><head><meta charset="windows-1251"></head>"#
            )
            .as_deref(),
            Some("windows-1251")
        );
        assert_eq!(
            declared_charset(
                None,
                br#"<meta http-equiv="Content-Type" content="text/html; charset=Shift_JIS">"#
            )
            .as_deref(),
            Some("shift_jis")
        );
        assert_eq!(declared_charset(Some("text/html"), b"<p>plain</p>"), None);

        assert!(is_utf8_label("utf-8"));
        assert!(!is_utf8_label("iso-8859-1"));
    }
}
