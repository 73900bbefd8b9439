use std::io::Write;
use std::net::SocketAddr;
use std::time::Duration;

use axum::{
    Router,
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Redirect},
    routing::get,
};
use flate2::{Compression, write::GzEncoder};
use tokio::net::TcpListener;
use url::Url;

use embed_proxy::server::services::fetch_services::{
    FetchError, HtmlFetcher, HtmlFetcherTrait, MAX_PAGE_BYTES,
};

/// a stand-in embed host on an ephemeral port
async fn start_upstream() -> SocketAddr {
    // 32 MiB of zeros, a few tens of KiB on the wire
    let zeros = vec![0u8; 1024 * 1024];
    let mut bomb = GzEncoder::new(Vec::new(), Compression::fast());
    for _ in 0..32 {
        bomb.write_all(&zeros).unwrap();
    }
    let bomb = bomb.finish().unwrap();

    let app = Router::new()
        .route("/page", get(|| async { "<html><body><p>player</p></body></html>" }))
        .route(
            "/gzip",
            get(|| async {
                let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
                encoder.write_all(b"<p>compressed</p>").unwrap();
                (
                    [(header::CONTENT_ENCODING, "gzip")],
                    encoder.finish().unwrap(),
                )
            }),
        )
        .route(
            "/headers",
            get(|headers: HeaderMap| async move {
                let value = |name: header::HeaderName| {
                    headers
                        .get(name)
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or("-")
                        .to_string()
                };
                format!(
                    "referer={} ua={} encoding={}",
                    value(header::REFERER),
                    value(header::USER_AGENT),
                    value(header::ACCEPT_ENCODING)
                )
            }),
        )
        .route(
            "/missing",
            get(|| async { (StatusCode::NOT_FOUND, "gone").into_response() }),
        )
        .route(
            "/slow",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(2)).await;
                "late"
            }),
        )
        .route(
            "/bomb",
            get(move || async move { ([(header::CONTENT_ENCODING, "gzip")], bomb) }),
        )
        .route(
            "/huge",
            get(|| async { vec![b'a'; MAX_PAGE_BYTES + 1] }),
        )
        .route("/redirect", get(|| async { Redirect::temporary("/page") }));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

fn url(addr: SocketAddr, path: &str) -> Url {
    Url::parse(&format!("http://{}{}", addr, path)).unwrap()
}

fn fetcher() -> HtmlFetcher {
    HtmlFetcher::new(Duration::from_millis(500), 5).unwrap()
}

#[tokio::test]
async fn test_fetches_a_page_and_keeps_its_final_url() {
    let addr = start_upstream().await;

    let page = fetcher().fetch(&url(addr, "/page"), None).await.unwrap();

    assert_eq!(page.html, "<html><body><p>player</p></body></html>");
    assert_eq!(page.url, url(addr, "/page"));
}

#[tokio::test]
async fn test_decodes_compressed_bodies() {
    let addr = start_upstream().await;

    let page = fetcher().fetch(&url(addr, "/gzip"), None).await.unwrap();

    assert_eq!(page.html, "<p>compressed</p>");
}

#[tokio::test]
async fn test_refuses_bodies_that_inflate_past_the_cap() {
    let addr = start_upstream().await;

    let err = fetcher().fetch(&url(addr, "/bomb"), None).await.unwrap_err();

    assert_eq!(err, FetchError::TooLarge);
}

#[tokio::test]
async fn test_refuses_oversized_bodies() {
    let addr = start_upstream().await;

    let err = fetcher().fetch(&url(addr, "/huge"), None).await.unwrap_err();

    assert_eq!(err, FetchError::TooLarge);
}

#[tokio::test]
async fn test_sends_browser_headers_and_referer() {
    let addr = start_upstream().await;
    let referer = Url::parse("https://vidsrc.xyz/embed/movie?tmdb=1").unwrap();

    let page = fetcher()
        .fetch(&url(addr, "/headers"), Some(referer))
        .await
        .unwrap();

    assert!(page.html.contains("referer=https://vidsrc.xyz/embed/movie?tmdb=1"));
    assert!(page.html.contains("ua=Mozilla/5.0"));
    assert!(page.html.contains("encoding=gzip, deflate, zstd"));

    let page = fetcher().fetch(&url(addr, "/headers"), None).await.unwrap();
    assert!(page.html.contains("referer=-"));
}

#[tokio::test]
async fn test_reports_non_success_status() {
    let addr = start_upstream().await;

    let err = fetcher().fetch(&url(addr, "/missing"), None).await.unwrap_err();

    assert_eq!(err, FetchError::Status(404));
}

#[tokio::test]
async fn test_times_out_slow_hosts() {
    let addr = start_upstream().await;

    let err = fetcher().fetch(&url(addr, "/slow"), None).await.unwrap_err();

    assert_eq!(err, FetchError::Timeout);
}

#[tokio::test]
async fn test_refuses_redirects_off_the_allowed_hosts() {
    let addr = start_upstream().await;

    let err = fetcher().fetch(&url(addr, "/redirect"), None).await.unwrap_err();

    assert_eq!(err, FetchError::Redirect);
}

#[tokio::test]
async fn test_reports_unreachable_hosts_as_network_errors() {
    // bind then drop to get a port nothing listens on
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let err = fetcher().fetch(&url(addr, "/page"), None).await.unwrap_err();

    assert!(matches!(err, FetchError::Network(_)));
}
