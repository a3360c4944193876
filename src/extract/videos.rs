use scraper::Html;

use super::{block_href, image_src, resolve_link, resolve_src, SelectorChain, Snapshot};
use crate::error::SelectorError;
use crate::models::{VideoResult, VideoSearchData};

#[derive(Debug, Clone)]
pub struct VideoRules {
    pub block: SelectorChain,
    pub title: SelectorChain,
    pub link: SelectorChain,
    pub thumbnail: SelectorChain,
    pub source: SelectorChain,
    pub duration: SelectorChain,
    pub upload_date: SelectorChain,
    pub description: SelectorChain,
}

impl VideoRules {
    pub fn google() -> Result<Self, SelectorError> {
        let chain = SelectorChain::parse;
        Ok(Self {
            block: chain(&["#search div.g", "#rso div.MjjYud", "div[data-vid]"])?,
            title: chain(&["h3", "[role='heading']"])?,
            link: chain(&["div.yuRUbf a[href]", "a[href]"])?,
            thumbnail: chain(&["g-img img", "img"])?,
            source: chain(&[".gqF9jc span", ".NJU16b span", "cite"])?,
            duration: chain(&[".J1mWY", ".c8rnLc", ".O1CVkc"])?,
            upload_date: chain(&[".fG8Fp span", ".P7xzyf span", ".LEwnzc span"])?,
            description: chain(&[".Uroaid", ".ITZIwc", ".VwiC3b"])?,
        })
    }
}

/// Video tiles in document order; a tile without a heading is skipped.
pub fn extract(query: &str, snapshot: &Snapshot, rules: &VideoRules) -> VideoSearchData {
    let document = Html::parse_document(&snapshot.html);
    let base = snapshot.base_url();

    let mut videos = Vec::new();
    for block in rules.block.all(document.root_element()) {
        let Some(title) = rules.title.text(block) else {
            continue;
        };
        let url = block_href(block, &rules.link)
            .and_then(|href| resolve_link(&base, &href))
            .unwrap_or_default();

        videos.push(VideoResult {
            position: videos.len() + 1,
            title,
            url,
            thumbnail: rules
                .thumbnail
                .first(block)
                .and_then(image_src)
                .map(|src| resolve_src(&base, src)),
            source: rules.source.text(block),
            duration: rules.duration.text(block),
            upload_date: rules.upload_date.text(block),
            description: rules.description.text(block),
        });
    }

    VideoSearchData {
        query: query.to_string(),
        total_videos: videos.len(),
        videos,
    }
}
