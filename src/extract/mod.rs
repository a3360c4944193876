//! Extraction rules: the mapping from a rendered results page to the
//! normalized records in [`crate::models`].
//!
//! Every field is looked up through a [`SelectorChain`], an ordered list of
//! alternative CSS selectors tried until one matches. A field nothing matches is
//! left empty; it never fails the extraction.

pub mod images;
pub mod news;
pub mod videos;
pub mod web;

use once_cell::sync::Lazy;
use reqwest::Url;
use scraper::{ElementRef, Selector};

use crate::error::SelectorError;

pub use images::ImageRules;
pub use news::NewsRules;
pub use videos::VideoRules;
pub use web::WebRules;

static FALLBACK_BASE: Lazy<Url> =
    Lazy::new(|| Url::parse("https://www.google.com/").expect("fallback base is a valid url"));

/// One serialized DOM pass plus the address it was taken from.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub html: String,
    pub url: String,
}

impl Snapshot {
    /// Base for resolving relative links; falls back to the engine's origin for
    /// `about:` pages and other non-hierarchical addresses.
    pub fn base_url(&self) -> Url {
        Url::parse(&self.url)
            .ok()
            .filter(|u| !u.cannot_be_a_base())
            .unwrap_or_else(|| FALLBACK_BASE.clone())
    }
}

/// Ordered alternatives for one field, first match wins.
#[derive(Debug, Clone)]
pub struct SelectorChain {
    sources: Vec<String>,
    alternatives: Vec<Selector>,
    union: Selector,
}

impl SelectorChain {
    pub fn parse(css: &[&str]) -> Result<Self, SelectorError> {
        let alternatives = css
            .iter()
            .map(|s| compile(s))
            .collect::<Result<Vec<_>, _>>()?;
        let union = compile(&css.join(", "))?;
        Ok(Self {
            sources: css.iter().map(|s| s.to_string()).collect(),
            alternatives,
            union,
        })
    }

    pub fn sources(&self) -> &[String] {
        &self.sources
    }

    /// First element of the earliest alternative that matches anything.
    pub fn first<'a>(&self, scope: ElementRef<'a>) -> Option<ElementRef<'a>> {
        self.alternatives
            .iter()
            .find_map(|selector| scope.select(selector).next())
    }

    /// All matches of the earliest alternative that matches anything.
    pub fn all<'a>(&self, scope: ElementRef<'a>) -> Vec<ElementRef<'a>> {
        for selector in &self.alternatives {
            let found: Vec<_> = scope.select(selector).collect();
            if !found.is_empty() {
                return found;
            }
        }
        Vec::new()
    }

    /// Matches of every alternative, in document order.
    pub fn union<'a>(&self, scope: ElementRef<'a>) -> Vec<ElementRef<'a>> {
        scope.select(&self.union).collect()
    }

    /// First non-empty normalized text across the alternatives.
    pub fn text(&self, scope: ElementRef<'_>) -> Option<String> {
        self.alternatives
            .iter()
            .flat_map(|selector| scope.select(selector))
            .map(clean_text)
            .find(|text| !text.is_empty())
    }

    /// First non-empty attribute value across the alternatives.
    pub fn attr(&self, scope: ElementRef<'_>, name: &str) -> Option<String> {
        self.alternatives
            .iter()
            .flat_map(|selector| scope.select(selector))
            .filter_map(|el| el.value().attr(name))
            .map(str::trim)
            .find(|value| !value.is_empty())
            .map(str::to_string)
    }
}

fn compile(css: &str) -> Result<Selector, SelectorError> {
    Selector::parse(css).map_err(|e| SelectorError {
        selector: css.to_string(),
        reason: format!("{:?}", e),
    })
}

/// The full rule catalog, compiled once per process.
#[derive(Debug, Clone)]
pub struct ExtractionRules {
    pub web: WebRules,
    pub images: ImageRules,
    pub videos: VideoRules,
    pub news: NewsRules,
}

impl ExtractionRules {
    /// Selectors for Google's result markup.
    pub fn google() -> Result<Self, SelectorError> {
        Ok(Self {
            web: WebRules::google()?,
            images: ImageRules::google()?,
            videos: VideoRules::google()?,
            news: NewsRules::google()?,
        })
    }
}

// ============================================================================
// Shared helpers
// ============================================================================

/// Element text with whitespace runs collapsed.
pub fn clean_text(el: ElementRef<'_>) -> String {
    el.text()
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn non_empty(text: String) -> Option<String> {
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

fn is_google_host(url: &Url) -> bool {
    url.host_str()
        .map(|host| host == "google.com" || host.contains(".google.") || host.starts_with("google."))
        .unwrap_or(false)
}

/// Resolves an anchor `href` against the page address and unwraps the engine's
/// redirect links (`/url?q=`, `/imgres?imgrefurl=`). Only absolute http(s)
/// destinations survive.
pub fn resolve_link(base: &Url, href: &str) -> Option<String> {
    let href = href.trim();
    if href.is_empty() || href.starts_with('#') || href.starts_with("javascript:") {
        return None;
    }

    let mut url = base.join(href).ok()?;
    if is_google_host(&url) {
        let wrapped_param = match url.path() {
            "/url" => Some(["q", "url"]),
            "/imgres" => Some(["imgrefurl", "imgurl"]),
            _ => None,
        };
        if let Some(keys) = wrapped_param {
            let target = keys.iter().find_map(|key| {
                url.query_pairs()
                    .find(|(k, _)| k == key)
                    .map(|(_, v)| v.into_owned())
            })?;
            url = Url::parse(&target).ok()?;
        }
    }

    match url.scheme() {
        "http" | "https" => Some(url.to_string()),
        _ => None,
    }
}

/// True for links back into the engine's own results pages.
pub fn is_search_page(link: &str) -> bool {
    Url::parse(link)
        .map(|u| is_google_host(&u) && u.path().starts_with("/search"))
        .unwrap_or(false)
}

/// Image source as rendered: inline `data:` URIs are kept verbatim, everything
/// else is made absolute.
pub fn resolve_src(base: &Url, src: &str) -> String {
    let src = src.trim();
    if src.starts_with("data:") {
        return src.to_string();
    }
    base.join(src)
        .map(|u| u.to_string())
        .unwrap_or_else(|_| src.to_string())
}

pub fn image_src(img: ElementRef<'_>) -> Option<&str> {
    ["src", "data-src", "data-iurl"]
        .iter()
        .filter_map(|name| img.value().attr(name))
        .map(str::trim)
        .find(|v| !v.is_empty())
}

/// `href` of the element itself when it is a link, otherwise of the first
/// match of `chain` inside it.
pub fn block_href(block: ElementRef<'_>, chain: &SelectorChain) -> Option<String> {
    block
        .value()
        .attr("href")
        .map(str::to_string)
        .or_else(|| chain.attr(block, "href"))
}

/// Nearest enclosing `<a href>`.
pub fn enclosing_href<'a>(el: ElementRef<'a>) -> Option<&'a str> {
    el.ancestors()
        .filter_map(ElementRef::wrap)
        .find(|a| a.value().name() == "a")
        .and_then(|a| a.value().attr("href"))
}

pub fn host_of(link: &str) -> Option<String> {
    Url::parse(link)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.trim_start_matches("www.").to_string()))
}
