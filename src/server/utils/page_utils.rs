// static html the service renders itself: error pages and the landing page
use super::host_utils::ALLOWED_HOSTS;

const EXAMPLE_EMBED: &str = "https://vidsrc.xyz/embed/movie?tmdb=385687";

/// escapes text for use in element bodies and quoted attributes
pub fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

/// black full-height page so it blends into the player frame it replaces
pub fn error_page(status: u16, title: &str, message: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="UTF-8">
  <meta name="viewport" content="width=device-width, initial-scale=1.0">
  <title>{title}</title>
  <style>
    body {{
      margin: 0;
      padding: 20px;
      font-family: Arial, sans-serif;
      background: #000;
      color: #fff;
      display: flex;
      justify-content: center;
      align-items: center;
      height: 100vh;
      box-sizing: border-box;
      text-align: center;
    }}
    small {{ color: #777; }}
  </style>
</head>
<body>
  <div>
    <h2>{title}</h2>
    <p>{message}</p>
    <small>{status}</small>
  </div>
</body>
</html>
"#,
        title = escape_html(title),
        message = escape_html(message),
        status = status,
    )
}

pub struct LandingInfo {
    pub version: &'static str,
    pub rate_limit_max_requests: u32,
    pub rate_limit_window_seconds: u64,
}

pub fn landing_page(info: &LandingInfo) -> String {
    let hosts = ALLOWED_HOSTS.join(", ");
    let example_proxy = format!("/api/embed?url={}", urlencoding::encode(EXAMPLE_EMBED));
    let rate_limit = if info.rate_limit_max_requests == 0 {
        "disabled".to_string()
    } else {
        format!(
            "{} requests per {} seconds per IP",
            info.rate_limit_max_requests, info.rate_limit_window_seconds
        )
    };

    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="UTF-8">
  <meta name="viewport" content="width=device-width, initial-scale=1.0">
  <title>Embed Proxy</title>
  <style>
    html, body {{
      margin: 0;
      min-height: 100%;
      font-family: -apple-system, BlinkMacSystemFont, "Segoe UI", Roboto, sans-serif;
      background: linear-gradient(135deg, #0f0f0f 0%, #1a1a1a 100%);
      color: #fff;
    }}
    main {{
      max-width: 700px;
      margin: 40px auto;
      padding: 2.5rem;
      background: #1a1a1a;
      border: 1px solid #333;
      border-radius: 16px;
    }}
    h1 {{ color: #ff0000; }}
    p, li {{ color: #ccc; line-height: 1.6; }}
    pre {{
      background: #111;
      padding: 1rem;
      border-left: 4px solid #ff0000;
      border-radius: 8px;
      overflow-x: auto;
    }}
    .notice {{
      border: 1px solid #ffc107;
      color: #ffc107;
      padding: 1rem;
      border-radius: 8px;
    }}
    .status {{ color: #28a745; font-weight: 600; }}
  </style>
</head>
<body>
  <main>
    <h1>Embed Proxy</h1>
    <p>Fetches embed pages from trusted hosts, strips scripts, inline handlers and ad containers,
    and serves the cleaned page for use inside an iframe.</p>

    <h3>Usage</h3>
    <pre><code>GET /api/embed?url=&lt;url-encoded embed url&gt;
GET /api/embed/movie?tmdb=&lt;id&gt;
GET /api/embed/tv?tmdb=&lt;id&gt;&amp;season=&lt;n&gt;&amp;episode=&lt;n&gt;</code></pre>

    <h3>Example</h3>
    <pre><code>&lt;iframe src="{example}" allowfullscreen&gt;&lt;/iframe&gt;</code></pre>

    <h3>Limits</h3>
    <ul>
      <li>Allowed hosts: {hosts}</li>
      <li>Rate limit: {rate_limit}</li>
    </ul>

    <p class="notice">Only embed content you are licensed to stream. Check the embed host's terms and
    the copyright law that applies to you before using this service.</p>

    <p class="status">Service online &middot; v{version}</p>
  </main>
</body>
</html>
"#,
        example = escape_html(&example_proxy),
        hosts = escape_html(&hosts),
        rate_limit = escape_html(&rate_limit),
        version = escape_html(info.version),
    )
}
