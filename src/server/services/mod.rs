pub mod embed_services;
pub mod fetch_services;
pub mod proxy_services;
pub mod rate_limit_services;

pub use embed_services::DynEmbedService;
pub use fetch_services::DynHtmlFetcher;
pub use proxy_services::ProxyServices;
pub use rate_limit_services::DynRateLimitService;
