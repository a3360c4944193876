use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Url;
use scraper::{ElementRef, Html};

use super::{
    block_href, clean_text, enclosing_href, image_src, is_search_page, non_empty, resolve_link,
    resolve_src, SelectorChain, Snapshot,
};
use crate::config::Limits;
use crate::error::SelectorError;
use crate::models::{
    FeaturedSnippet, InlineImage, InlineNews, InlineVideo, KnowledgeFact, KnowledgePanel,
    OrganicResult, RelatedQuestion, RelatedSearch, SearchData, SearchInfo, SiteLink,
};

static TOTAL_RESULTS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)([0-9][0-9,.\s]*)\s+results?").expect("valid regex"));
static SEARCH_TIME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\(([0-9]+(?:[.,][0-9]+)?)\s*sec").expect("valid regex"));

#[derive(Debug, Clone)]
pub struct WebRules {
    pub result_block: SelectorChain,
    pub title: SelectorChain,
    pub link: SelectorChain,
    pub display_url: SelectorChain,
    pub snippet: SelectorChain,
    pub favicon: SelectorChain,
    pub site_link: SelectorChain,
    pub stats: SelectorChain,

    pub featured_block: SelectorChain,
    pub featured_content: SelectorChain,
    pub featured_title: SelectorChain,
    pub featured_link: SelectorChain,
    pub featured_source: SelectorChain,

    pub panel_block: SelectorChain,
    pub panel_title: SelectorChain,
    pub panel_subtitle: SelectorChain,
    pub panel_description: SelectorChain,
    pub panel_source: SelectorChain,
    pub panel_image: SelectorChain,
    pub panel_fact: SelectorChain,
    pub fact_label: SelectorChain,
    pub fact_value: SelectorChain,

    pub question_block: SelectorChain,
    pub question_text: SelectorChain,
    pub related_search: SelectorChain,

    pub inline_image: SelectorChain,
    pub video_block: SelectorChain,
    pub video_title: SelectorChain,
    pub video_source: SelectorChain,
    pub video_duration: SelectorChain,
    pub news_block: SelectorChain,
    pub news_title: SelectorChain,
    pub news_source: SelectorChain,
    pub news_published: SelectorChain,

    pub any_link: SelectorChain,
    pub any_image: SelectorChain,
}

impl WebRules {
    pub fn google() -> Result<Self, SelectorError> {
        let chain = SelectorChain::parse;
        Ok(Self {
            result_block: chain(&["#search div.g", "#rso div.MjjYud", "#rso > div"])?,
            title: chain(&["h3", "[role='heading']"])?,
            link: chain(&["div.yuRUbf a[href]", "a[jsname][href]", "a[href]"])?,
            display_url: chain(&["cite", ".VuuXrf", ".byrV5b"])?,
            snippet: chain(&[".VwiC3b", "[data-sncf]", "div[style*='-webkit-line-clamp']", ".IsZvec"])?,
            favicon: chain(&["img.XNo5Ab", ".eqA2re img", ".H9lube img"])?,
            site_link: chain(&[".HiHjCd a[href]", ".usJj9c a[href]", "table a[href]"])?,
            stats: chain(&["#result-stats"])?,

            featured_block: chain(&[".xpdopen .ifM9O", "div.c2xzTb", "block-component"])?,
            featured_content: chain(&[".hgKElc", ".LGOjhe", "[data-attrid='wa:/description']"])?,
            featured_title: chain(&["h3", "[role='heading']"])?,
            featured_link: chain(&[".yuRUbf a[href]", "a[href]"])?,
            featured_source: chain(&["cite", ".VuuXrf"])?,

            panel_block: chain(&["#rhs .kp-wholepage", "#rhs .knowledge-panel", ".kp-wholepage", "#rhs"])?,
            panel_title: chain(&["[data-attrid='title']", "h2[data-attrid]", ".qrShPb", "h2"])?,
            panel_subtitle: chain(&["[data-attrid='subtitle']", ".wwUB2c"])?,
            panel_description: chain(&[".kno-rdesc span", "[data-attrid='description'] span"])?,
            panel_source: chain(&[".kno-rdesc a", "[data-attrid='description'] a"])?,
            panel_image: chain(&["g-img img", "[data-attrid='image'] img", "img"])?,
            panel_fact: chain(&[".wDYxhc[data-attrid^='kc:/']", ".rVusze"])?,
            fact_label: chain(&[".w8qArf", ".fl"])?,
            fact_value: chain(&[".LrzXr", ".kno-fv"])?,

            question_block: chain(&[".related-question-pair", "[jsname='Cpkphb']"])?,
            question_text: chain(&["[role='heading'] span", ".CSkcDe", "span"])?,
            related_search: chain(&["#bres a[href]", "a.ngTNl", ".k8XOCe", ".s75CSd"])?,

            inline_image: chain(&["#iur img", "g-img img", "div[data-lpage] img"])?,
            video_block: chain(&["video-voyager", "g-inner-card", ".RzdJxc"])?,
            video_title: chain(&[".cHaqb", "[role='heading']", "h3"])?,
            video_source: chain(&[".pcJO7e span", ".Zg1NU", "cite"])?,
            video_duration: chain(&[".J1mWY", ".c8rnLc"])?,
            news_block: chain(&["g-section-with-header a.WlydOe", "a.WlydOe", "div.JJZKK"])?,
            news_title: chain(&["[role='heading']", ".mCBkyc", ".n0jPhd"])?,
            news_source: chain(&[".CEMjEf span", ".NUnG9d span", ".MgUUmf span"])?,
            news_published: chain(&[".OSrXXb span", ".ZE0LJd span", "span[data-ts]"])?,

            any_link: chain(&["a[href]"])?,
            any_image: chain(&["img"])?,
        })
    }
}

/// Single pass over a regular results page. Every block is optional.
pub fn extract(query: &str, snapshot: &Snapshot, rules: &WebRules, limits: &Limits) -> SearchData {
    let document = Html::parse_document(&snapshot.html);
    let root = document.root_element();
    let base = snapshot.base_url();

    let blocks = rules.result_block.all(root);
    if blocks.is_empty() {
        tracing::debug!(selectors = ?rules.result_block.sources(), "no result blocks matched");
    }

    let mut organic_results = Vec::new();
    let mut top_block = None;
    for block in blocks {
        if let Some(mut entry) = organic_entry(block, rules, &base) {
            entry.position = organic_results.len() + 1;
            top_block.get_or_insert((block, entry.url.clone()));
            organic_results.push(entry);
        }
    }

    let site_links = top_block
        .map(|(block, url)| site_links(block, &url, rules, &base))
        .unwrap_or_default();

    SearchData {
        query: query.to_string(),
        search_info: rules
            .stats
            .text(root)
            .map(|text| parse_search_info(&text))
            .unwrap_or_default(),
        organic_results,
        featured_snippet: featured_snippet(root, rules, &base),
        knowledge_panel: knowledge_panel(root, rules, &base),
        people_also_ask: people_also_ask(root, rules),
        related_searches: related_searches(root, rules, &base),
        images: inline_images(root, rules, &base, limits.inline_images),
        videos: inline_videos(root, rules, &base),
        news: inline_news(root, rules, &base),
        site_links,
    }
}

/// A block without a title or a navigable destination is layout, not a result.
fn organic_entry(block: ElementRef<'_>, rules: &WebRules, base: &Url) -> Option<OrganicResult> {
    let title = rules.title.text(block)?;
    let url = rules
        .link
        .attr(block, "href")
        .and_then(|href| resolve_link(base, &href))
        .filter(|url| !is_search_page(url))?;

    Some(OrganicResult {
        position: 0,
        title,
        display_url: rules.display_url.text(block).unwrap_or_default(),
        snippet: rules.snippet.text(block).unwrap_or_default(),
        favicon: rules
            .favicon
            .first(block)
            .and_then(image_src)
            .map(|src| resolve_src(base, src)),
        url,
    })
}

fn site_links(block: ElementRef<'_>, main_url: &str, rules: &WebRules, base: &Url) -> Vec<SiteLink> {
    rules
        .site_link
        .all(block)
        .into_iter()
        .filter_map(|a| {
            let title = non_empty(clean_text(a))?;
            let url = resolve_link(base, a.value().attr("href")?)?;
            (url != main_url).then_some(SiteLink { title, url })
        })
        .collect()
}

/// Parses lines such as `About 1,230,000 results (0.42 seconds)`.
pub fn parse_search_info(text: &str) -> SearchInfo {
    let total_results = TOTAL_RESULTS.captures(text).and_then(|caps| {
        let digits: String = caps[1].chars().filter(char::is_ascii_digit).collect();
        digits.parse().ok()
    });
    let search_time = SEARCH_TIME
        .captures(text)
        .and_then(|caps| caps[1].replace(',', ".").parse().ok());

    SearchInfo {
        total_results,
        search_time,
        raw_text: non_empty(text.trim().to_string()),
    }
}

fn featured_snippet(root: ElementRef<'_>, rules: &WebRules, base: &Url) -> Option<FeaturedSnippet> {
    let block = rules.featured_block.first(root)?;
    let content = rules
        .featured_content
        .text(block)
        .or_else(|| non_empty(clean_text(block)))?;

    Some(FeaturedSnippet {
        title: rules.featured_title.text(block).unwrap_or_default(),
        content,
        url: rules
            .featured_link
            .attr(block, "href")
            .and_then(|href| resolve_link(base, &href)),
        source: rules.featured_source.text(block),
    })
}

fn knowledge_panel(root: ElementRef<'_>, rules: &WebRules, base: &Url) -> Option<KnowledgePanel> {
    let block = rules.panel_block.first(root)?;
    let title = rules.panel_title.text(block)?;

    let facts = rules
        .panel_fact
        .all(block)
        .into_iter()
        .filter_map(|row| {
            let label = rules.fact_label.text(row)?;
            let value = rules.fact_value.text(row)?;
            let label = label.trim_end_matches(':').trim().to_string();
            (!label.is_empty()).then_some(KnowledgeFact { label, value })
        })
        .collect();

    Some(KnowledgePanel {
        title,
        subtitle: rules.panel_subtitle.text(block),
        description: rules.panel_description.text(block),
        source: rules.panel_source.text(block),
        image: rules
            .panel_image
            .first(block)
            .and_then(image_src)
            .map(|src| resolve_src(base, src)),
        facts,
    })
}

fn people_also_ask(root: ElementRef<'_>, rules: &WebRules) -> Vec<RelatedQuestion> {
    rules
        .question_block
        .all(root)
        .into_iter()
        .filter_map(|block| {
            let question = block
                .value()
                .attr("data-q")
                .map(|q| q.trim().to_string())
                .and_then(non_empty)
                .or_else(|| rules.question_text.text(block))?;
            Some(RelatedQuestion { question })
        })
        .collect()
}

fn related_searches(root: ElementRef<'_>, rules: &WebRules, base: &Url) -> Vec<RelatedSearch> {
    rules
        .related_search
        .all(root)
        .into_iter()
        .filter_map(|el| {
            let query = non_empty(clean_text(el))?;
            let url = block_href(el, &rules.any_link).and_then(|href| resolve_link(base, &href));
            Some(RelatedSearch { query, url })
        })
        .collect()
}

fn inline_images(root: ElementRef<'_>, rules: &WebRules, base: &Url, cap: usize) -> Vec<InlineImage> {
    rules
        .inline_image
        .all(root)
        .into_iter()
        .filter_map(|img| {
            let thumbnail = resolve_src(base, image_src(img)?);
            Some(InlineImage {
                title: img.value().attr("alt").unwrap_or_default().trim().to_string(),
                thumbnail,
                url: enclosing_href(img).and_then(|href| resolve_link(base, href)),
            })
        })
        .take(cap)
        .collect()
}

fn inline_videos(root: ElementRef<'_>, rules: &WebRules, base: &Url) -> Vec<InlineVideo> {
    rules
        .video_block
        .all(root)
        .into_iter()
        .filter_map(|block| {
            let title = rules.video_title.text(block)?;
            let url = block_href(block, &rules.any_link).and_then(|href| resolve_link(base, &href))?;
            Some(InlineVideo {
                title,
                url,
                source: rules.video_source.text(block),
                duration: rules.video_duration.text(block),
                thumbnail: rules
                    .any_image
                    .first(block)
                    .and_then(image_src)
                    .map(|src| resolve_src(base, src)),
            })
        })
        .collect()
}

fn inline_news(root: ElementRef<'_>, rules: &WebRules, base: &Url) -> Vec<InlineNews> {
    rules
        .news_block
        .all(root)
        .into_iter()
        .filter_map(|block| {
            let title = rules.news_title.text(block)?;
            let url = block_href(block, &rules.any_link).and_then(|href| resolve_link(base, &href))?;
            Some(InlineNews {
                title,
                url,
                source: rules.news_source.text(block),
                published_at: rules.news_published.text(block),
            })
        })
        .collect()
}
