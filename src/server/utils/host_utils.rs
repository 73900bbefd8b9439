use url::{Host, Url};

/// the only hosts the proxy will ever fetch from, anything else would turn this into an open proxy
pub const ALLOWED_HOSTS: [&str; 4] = ["vidsrc.xyz", "vidsrc.in", "vid-src.xyz", "vid-src.in"];

/// parses the string and checks the host, any parse failure is a no
pub fn is_allowed_host(url: &str) -> bool {
    Url::parse(url).map(|u| is_allowed_url(&u)).unwrap_or(false)
}

/// same as `is_allowed_host` for urls that are already parsed. the url crate lowercases domains
/// while parsing so an exact compare is enough here
pub fn is_allowed_url(url: &Url) -> bool {
    match url.host() {
        Some(Host::Domain(domain)) => ALLOWED_HOSTS.contains(&domain),
        _ => false,
    }
}

/// only plain web urls make sense as fetch targets
pub fn is_web_url(url: &Url) -> bool {
    matches!(url.scheme(), "http" | "https")
}
