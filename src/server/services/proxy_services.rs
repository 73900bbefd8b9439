use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::{
    config::AppConfig,
    server::utils::{ad_pattern_utils::RegexAdMatcher, sanitize_utils::Sanitizer},
};

use super::{
    embed_services::{DynEmbedService, EmbedService},
    fetch_services::{DynHtmlFetcher, HtmlFetcher},
    rate_limit_services::{DynRateLimitService, MemoryRateLimitService, RateLimitConfig},
};

/// everything a handler needs, handed out through an axum Extension
#[derive(Clone)]
pub struct ProxyServices {
    pub embed: DynEmbedService,
    pub rate_limit: DynRateLimitService,
    pub config: Arc<AppConfig>,
}

impl ProxyServices {
    pub fn new(config: Arc<AppConfig>) -> anyhow::Result<Self> {
        info!("starting proxy services...");

        let fetcher = Arc::new(HtmlFetcher::new(
            Duration::from_secs(config.upstream_timeout_seconds),
            config.upstream_max_redirects,
        )?) as DynHtmlFetcher;

        let rate_limit = Arc::new(MemoryRateLimitService::new(RateLimitConfig::from(
            config.as_ref(),
        ))) as DynRateLimitService;

        info!(
            "upstream fetcher ok ({}s timeout, {} redirects), rate limit {} per {}s",
            config.upstream_timeout_seconds,
            config.upstream_max_redirects,
            config.rate_limit_max_requests,
            config.rate_limit_window_seconds
        );

        Ok(Self::from_parts(config, fetcher, rate_limit))
    }

    /// wire the services around a given fetcher and limiter, tests use this with mocks
    pub fn from_parts(
        config: Arc<AppConfig>,
        fetcher: DynHtmlFetcher,
        rate_limit: DynRateLimitService,
    ) -> Self {
        let sanitizer = Sanitizer::new(Arc::new(RegexAdMatcher::default()));
        let embed = Arc::new(EmbedService::new(fetcher, sanitizer)) as DynEmbedService;

        Self {
            embed,
            rate_limit,
            config,
        }
    }
}
