use std::sync::Arc;

use once_cell::sync::Lazy;
use scraper::{Html, Selector};
use tracing::{debug, info, warn};
use url::Url;

use crate::server::{
    error::{AppResult, Error},
    services::fetch_services::{DynHtmlFetcher, FetchedPage},
    utils::{
        host_utils::{is_allowed_url, is_web_url},
        sanitize_utils::Sanitizer,
    },
};

static IFRAME_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("iframe").expect("static selector should parse"));

/// the src of the first iframe on the page, resolved against the page url. relative and
/// protocol-relative srcs are fine, anything that isn't http(s) is ignored
pub fn first_iframe_src(page: &FetchedPage) -> Option<Url> {
    let document = Html::parse_document(&page.html);
    let src = document
        .select(&IFRAME_SELECTOR)
        .next()?
        .value()
        .attr("src")?
        .trim();

    if src.is_empty() {
        return None;
    }

    page.url.join(src).ok().filter(is_web_url)
}

pub type DynEmbedService = Arc<dyn EmbedServiceTrait + Send + Sync>;

#[async_trait::async_trait]
pub trait EmbedServiceTrait {
    /// fetch an already allowlisted embed url and return the sanitized player page
    async fn render(&self, target: &Url) -> AppResult<String>;
}

pub struct EmbedService {
    fetcher: DynHtmlFetcher,
    sanitizer: Sanitizer,
}

impl EmbedService {
    pub fn new(fetcher: DynHtmlFetcher, sanitizer: Sanitizer) -> Self {
        Self { fetcher, sanitizer }
    }

    /// embed hosts usually wrap the actual player in one more iframe. when that iframe points at
    /// an allowed host its page is fetched instead, with the outer page as referer. any failure
    /// keeps the outer page
    pub async fn resolve_player_page(&self, outer: FetchedPage) -> FetchedPage {
        let Some(inner_url) = first_iframe_src(&outer) else {
            return outer;
        };

        if inner_url == outer.url {
            return outer;
        }

        if !is_allowed_url(&inner_url) {
            debug!(
                "Nested frame {} is not on an allowed host, keeping outer page",
                inner_url
            );
            return outer;
        }

        match self
            .fetcher
            .fetch(&inner_url, Some(outer.url.clone()))
            .await
        {
            Ok(inner) => {
                debug!("Resolved nested player frame {}", inner.url);
                inner
            }
            Err(e) => {
                warn!(
                    "Nested frame {} failed ({}), keeping outer page",
                    inner_url, e
                );
                outer
            }
        }
    }
}

#[async_trait::async_trait]
impl EmbedServiceTrait for EmbedService {
    async fn render(&self, target: &Url) -> AppResult<String> {
        let outer = self.fetcher.fetch(target, None).await?;
        let page = self.resolve_player_page(outer).await;

        // parsing a few hundred kilobytes of html is real cpu work, keep it off the reactor
        let sanitizer = self.sanitizer.clone();
        let html = tokio::task::spawn_blocking(move || sanitizer.sanitize(&page.html, Some(&page.url)))
            .await
            .map_err(|e| Error::InternalServerErrorWithContext(format!("sanitize task failed: {}", e)))?;

        info!("Served sanitized embed for {}", target);

        Ok(html)
    }
}
