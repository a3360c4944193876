use scraper::Html;

use super::{block_href, image_src, resolve_link, resolve_src, SelectorChain, Snapshot};
use crate::error::SelectorError;
use crate::models::{NewsArticle, NewsSearchData};

#[derive(Debug, Clone)]
pub struct NewsRules {
    /// Card markup differs between layout experiments; every alternative is
    /// collected, not just the first that matches.
    pub block: SelectorChain,
    pub title: SelectorChain,
    pub link: SelectorChain,
    pub source: SelectorChain,
    pub published: SelectorChain,
    pub snippet: SelectorChain,
    pub thumbnail: SelectorChain,
}

impl NewsRules {
    pub fn google() -> Result<Self, SelectorError> {
        let chain = SelectorChain::parse;
        Ok(Self {
            block: chain(&["div.SoaBEf", "div.dbsr", "div.xuvV6b", "g-card.ftSUBd"])?,
            title: chain(&["[role='heading']", ".mCBkyc", ".n0jPhd", "h3"])?,
            link: chain(&["a.WlydOe[href]", "a[href]"])?,
            source: chain(&[".MgUUmf span", ".CEMjEf span", ".NUnG9d span", ".XTjFC span"])?,
            published: chain(&[".OSrXXb span", ".ZE0LJd span", ".WG9SHc span", "time"])?,
            snippet: chain(&[".GI74Re", ".Y3v8qd", ".st"])?,
            thumbnail: chain(&["g-img img", "img"])?,
        })
    }
}

pub fn extract(query: &str, snapshot: &Snapshot, rules: &NewsRules) -> NewsSearchData {
    let document = Html::parse_document(&snapshot.html);
    let base = snapshot.base_url();

    let mut articles = Vec::new();
    for block in rules.block.union(document.root_element()) {
        let Some(title) = rules.title.text(block) else {
            continue;
        };
        let url = block_href(block, &rules.link)
            .and_then(|href| resolve_link(&base, &href))
            .unwrap_or_default();

        articles.push(NewsArticle {
            position: articles.len() + 1,
            title,
            url,
            source: rules.source.text(block),
            published_at: rules.published.text(block),
            snippet: rules.snippet.text(block),
            thumbnail: rules
                .thumbnail
                .first(block)
                .and_then(image_src)
                .map(|src| resolve_src(&base, src)),
        });
    }

    NewsSearchData {
        query: query.to_string(),
        total_articles: articles.len(),
        articles,
    }
}
