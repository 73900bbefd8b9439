use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::{Regex, RegexBuilder};

/// default heuristics, checked in order against id / class / src values. these are loose on
/// purpose, a false positive costs a banner-shaped hole in the page while a false negative costs
/// a popup
pub const DEFAULT_AD_PATTERNS: &[&str] = &[
    r"(?:^|[^a-z0-9])ad(?:s|box|slot|unit|frame|zone|block|container|wrapper)?(?:[^a-z0-9]|$)",
    r"advert",
    r"banner",
    r"pop-?(?:up|under)",
    r"overlay",
    r"sponsor",
    r"(?:^|[^a-z0-9])skip",
    r"doubleclick|googlesyndication|googleadservices|adservice|adnxs|popads|popcash|propellerads|exoclick|adsterra|juicyads|hilltopads|taboola|outbrain",
];

static DEFAULT_REGEXES: Lazy<Vec<Regex>> = Lazy::new(|| {
    DEFAULT_AD_PATTERNS
        .iter()
        .map(|pattern| compile(pattern).expect("built-in ad pattern should compile"))
        .collect()
});

fn compile(pattern: &str) -> Result<Regex, regex::Error> {
    RegexBuilder::new(pattern).case_insensitive(true).build()
}

pub type DynAdMatcher = Arc<dyn AdMatcher + Send + Sync>;

/// decides whether an attribute value looks like ad content
pub trait AdMatcher {
    /// returns the pattern that matched so callers can log why something got dropped
    fn find_match(&self, value: &str) -> Option<&str>;

    fn is_ad(&self, value: &str) -> bool {
        self.find_match(value).is_some()
    }
}

#[derive(Clone)]
pub struct RegexAdMatcher {
    patterns: Vec<Regex>,
}

impl RegexAdMatcher {
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Result<Self, regex::Error> {
        let patterns = patterns
            .iter()
            .map(|p| compile(p.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { patterns })
    }

    /// extends the current list, new patterns are checked last
    pub fn with_patterns<S: AsRef<str>>(mut self, extra: &[S]) -> Result<Self, regex::Error> {
        for pattern in extra {
            self.patterns.push(compile(pattern.as_ref())?);
        }
        Ok(self)
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

impl Default for RegexAdMatcher {
    fn default() -> Self {
        Self {
            patterns: DEFAULT_REGEXES.clone(),
        }
    }
}

impl AdMatcher for RegexAdMatcher {
    fn find_match(&self, value: &str) -> Option<&str> {
        self.patterns
            .iter()
            .find(|re| re.is_match(value))
            .map(|re| re.as_str())
    }
}
