use tracing::debug;
use url::Url;

use super::ad_pattern_utils::{DynAdMatcher, RegexAdMatcher};
use super::html_tree::{Dom, HtmlTree, NodeId};

/// sandbox flags every surviving iframe gets, enough for the player to run and nothing more
pub const IFRAME_SANDBOX: &str = "allow-scripts allow-same-origin allow-presentation";

/// marker on the injected style block so a second pass doesn't stack another one
pub const SHIELD_MARKER: &str = "data-embed-shield";

/// second line of defense for containers the removal pass didn't catch
pub const AD_SHIELD_CSS: &str = concat!(
    ":not(html):not(body)[id*=\"ad\"],:not(html):not(body)[class*=\"ad\"],",
    ":not(html):not(body)[id*=\"banner\"],:not(html):not(body)[class*=\"banner\"],",
    ":not(html):not(body)[id*=\"popup\"],:not(html):not(body)[class*=\"popup\"],",
    ":not(html):not(body)[id*=\"overlay\"],:not(html):not(body)[class*=\"overlay\"]",
    "{display:none !important;visibility:hidden !important;pointer-events:none !important;}"
);

const STRIPPED_TAGS: [&str; 2] = ["script", "noscript"];
const MATCHED_ATTRS: [&str; 3] = ["id", "class", "src"];
// attributes a browser will navigate to, load or submit to
const URL_ATTRS: [&str; 9] = [
    "src",
    "href",
    "xlink:href",
    "action",
    "formaction",
    "data",
    "poster",
    "background",
    "lowsrc",
];
// schemes that run script in whatever document loads them
const SCRIPT_SCHEMES: [&str; 6] = [
    "javascript:",
    "vbscript:",
    "data:text/html",
    "data:application/xhtml+xml",
    "data:image/svg+xml",
    "data:text/xml",
];
// the document skeleton stays even when a site hangs an ad class on <body>
const PROTECTED_TAGS: [&str; 3] = ["html", "head", "body"];

/// what a sanitize pass actually did, mostly for logs and tests
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SanitizeReport {
    pub scripts_removed: usize,
    pub handlers_stripped: usize,
    pub urls_neutralized: usize,
    pub ads_removed: usize,
    pub iframes_hardened: usize,
    pub base_injected: bool,
    pub shield_injected: bool,
}

#[derive(Clone)]
pub struct Sanitizer {
    matcher: DynAdMatcher,
}

impl Default for Sanitizer {
    fn default() -> Self {
        Self::new(std::sync::Arc::new(RegexAdMatcher::default()))
    }
}

impl Sanitizer {
    pub fn new(matcher: DynAdMatcher) -> Self {
        Self { matcher }
    }

    /// parse, clean and serialize a whole page
    pub fn sanitize(&self, html: &str, base_url: Option<&Url>) -> String {
        let mut tree = HtmlTree::parse(html);
        let report = self.sanitize_dom(&mut tree, base_url.map(Url::as_str));

        debug!(
            "Sanitized page: {} scripts, {} handlers, {} ad elements removed, {} iframes hardened",
            report.scripts_removed,
            report.handlers_stripped,
            report.ads_removed,
            report.iframes_hardened
        );

        tree.to_html()
    }

    /// runs every pass in order over any tree
    pub fn sanitize_dom<D: Dom>(&self, dom: &mut D, base_href: Option<&str>) -> SanitizeReport {
        let mut report = SanitizeReport {
            scripts_removed: Self::strip_scripts(dom),
            handlers_stripped: Self::strip_event_handlers(dom),
            urls_neutralized: Self::neutralize_script_urls(dom),
            ..Default::default()
        };

        report.ads_removed = self.remove_ad_elements(dom);
        report.ads_removed += self.remove_ad_iframes(dom);
        report.iframes_hardened = Self::harden_iframes(dom);

        if let Some(href) = base_href {
            report.base_injected = Self::inject_base(dom, href);
        }
        report.shield_injected = Self::inject_shield(dom);

        report
    }

    fn strip_scripts<D: Dom>(dom: &mut D) -> usize {
        let mut removed = 0;
        for tag in STRIPPED_TAGS {
            for id in dom.elements_by_tag(tag) {
                if dom.is_attached(id) {
                    dom.remove(id);
                    removed += 1;
                }
            }
        }
        removed
    }

    fn strip_event_handlers<D: Dom>(dom: &mut D) -> usize {
        let mut stripped = 0;
        for id in dom.elements() {
            for name in dom.attr_names(id) {
                if name.get(..2).is_some_and(|prefix| prefix.eq_ignore_ascii_case("on")) {
                    dom.remove_attr(id, &name);
                    stripped += 1;
                }
            }
        }
        stripped
    }

    /// drops `srcdoc` and any url attribute with a script-capable scheme, a sandboxed iframe
    /// with allow-scripts would otherwise run it
    fn neutralize_script_urls<D: Dom>(dom: &mut D) -> usize {
        let mut neutralized = 0;
        for id in dom.elements() {
            for name in dom.attr_names(id) {
                let lowered = name.to_ascii_lowercase();
                let drop = lowered == "srcdoc"
                    || (URL_ATTRS.contains(&lowered.as_str())
                        && dom.attr(id, &name).is_some_and(is_script_url));
                if drop {
                    debug!("Dropping {}=\"{}\"", name, dom.attr(id, &name).unwrap_or_default());
                    dom.remove_attr(id, &name);
                    neutralized += 1;
                }
            }
        }
        neutralized
    }

    fn matching_attr<D: Dom>(&self, dom: &D, id: NodeId, attrs: &[&str]) -> Option<String> {
        attrs.iter().find_map(|attr| {
            let value = dom.attr(id, attr)?;
            self.matcher
                .find_match(value)
                .map(|pattern| format!("{}=\"{}\" ~ /{}/", attr, value, pattern))
        })
    }

    fn remove_ad_elements<D: Dom>(&self, dom: &mut D) -> usize {
        let mut removed = 0;
        for id in dom.elements() {
            if !dom.is_attached(id) {
                continue;
            }
            if dom
                .tag_name(id)
                .is_some_and(|tag| PROTECTED_TAGS.contains(&tag))
            {
                continue;
            }
            if let Some(reason) = self.matching_attr(dom, id, &MATCHED_ATTRS) {
                debug!("Removing ad element: {}", reason);
                dom.remove(id);
                removed += 1;
            }
        }
        removed
    }

    /// iframes are where most injected ads live, so their src gets its own pass even though the
    /// general pass already looks at src
    fn remove_ad_iframes<D: Dom>(&self, dom: &mut D) -> usize {
        let mut removed = 0;
        for id in dom.elements_by_tag("iframe") {
            if !dom.is_attached(id) {
                continue;
            }
            if let Some(reason) = self.matching_attr(dom, id, &["src"]) {
                debug!("Removing ad iframe: {}", reason);
                dom.remove(id);
                removed += 1;
            }
        }
        removed
    }

    fn harden_iframes<D: Dom>(dom: &mut D) -> usize {
        let iframes = dom.elements_by_tag("iframe");
        for &id in &iframes {
            dom.set_attr(id, "sandbox", IFRAME_SANDBOX);
            dom.set_attr(id, "allowfullscreen", "");
            dom.set_attr(id, "frameborder", "0");
            dom.set_attr(id, "referrerpolicy", "no-referrer");
        }
        iframes.len()
    }

    fn ensure_head<D: Dom>(dom: &mut D) -> NodeId {
        if let Some(head) = dom.first_by_tag("head") {
            return head;
        }

        let head = dom.create_element("head", &[]);
        let parent = dom.first_by_tag("html").unwrap_or_else(|| dom.root());
        dom.prepend_child(parent, head);
        head
    }

    fn inject_base<D: Dom>(dom: &mut D, href: &str) -> bool {
        if dom.first_by_tag("base").is_some() {
            return false;
        }

        let head = Self::ensure_head(dom);
        let base = dom.create_element("base", &[("href", href)]);
        dom.prepend_child(head, base);
        true
    }

    fn inject_shield<D: Dom>(dom: &mut D) -> bool {
        let already_there = dom
            .elements_by_tag("style")
            .into_iter()
            .any(|id| dom.attr(id, SHIELD_MARKER).is_some());
        if already_there {
            return false;
        }

        let head = Self::ensure_head(dom);
        let style = dom.create_element("style", &[(SHIELD_MARKER, "")]);
        dom.append_text(style, AD_SHIELD_CSS);
        dom.append_child(head, style);
        true
    }
}

/// browsers skip leading whitespace and controls and ignore tabs and newlines anywhere in a
/// url, so `" java\tscript:"` still runs
fn is_script_url(value: &str) -> bool {
    let normalized: String = value
        .trim_start_matches(|c: char| c.is_ascii_control() || c == ' ')
        .chars()
        .filter(|c| !matches!(c, '\t' | '\n' | '\r'))
        .take(32)
        .collect::<String>()
        .to_ascii_lowercase();

    SCRIPT_SCHEMES
        .iter()
        .any(|scheme| normalized.starts_with(scheme))
}
