use scraper::{ElementRef, Html};

use super::{enclosing_href, host_of, image_src, resolve_link, resolve_src, SelectorChain, Snapshot};
use crate::config::Limits;
use crate::error::SelectorError;
use crate::models::{ImageResult, ImageSearchData};

/// Attributes stamped on every `<img>` before the snapshot, holding the
/// rendered box size in pixels. Raw HTML carries no layout information.
pub const RENDERED_WIDTH_ATTR: &str = "data-rendered-width";
pub const RENDERED_HEIGHT_ATTR: &str = "data-rendered-height";

/// Records the rendered size of each image on the element itself.
pub const STAMP_DIMENSIONS_SCRIPT: &str = r#"
    (() => {
        const images = document.querySelectorAll('img');
        images.forEach(img => {
            const rect = img.getBoundingClientRect();
            img.setAttribute('data-rendered-width', Math.round(rect.width));
            img.setAttribute('data-rendered-height', Math.round(rect.height));
        });
        return images.length;
    })()
"#;

#[derive(Debug, Clone)]
pub struct ImageRules {
    pub image: SelectorChain,
    pub title: SelectorChain,
}

impl ImageRules {
    pub fn google() -> Result<Self, SelectorError> {
        Ok(Self {
            image: SelectorChain::parse(&["img"])?,
            title: SelectorChain::parse(&[".toI8Rb", ".Ww4FFb", "h3"])?,
        })
    }
}

pub fn extract(query: &str, snapshot: &Snapshot, rules: &ImageRules, limits: &Limits) -> ImageSearchData {
    let document = Html::parse_document(&snapshot.html);
    let base = snapshot.base_url();

    let candidates: Vec<_> = rules
        .image
        .all(document.root_element())
        .into_iter()
        .filter_map(|img| {
            let (width, height) = rendered_size(img)?;
            (width > limits.image_min_dimension && height > limits.image_min_dimension)
                .then_some((img, width, height))
        })
        .collect();

    let total_images = candidates.len();
    let images = candidates
        .into_iter()
        .take(limits.image_results)
        .enumerate()
        .map(|(i, (img, width, height))| {
            let url = enclosing_href(img).and_then(|href| resolve_link(&base, href));
            ImageResult {
                position: i + 1,
                title: image_title(img, rules),
                thumbnail: image_src(img)
                    .map(|src| resolve_src(&base, src))
                    .unwrap_or_default(),
                source: url.as_deref().and_then(host_of),
                url,
                width,
                height,
            }
        })
        .collect();

    tracing::debug!(total_images, "image candidates after size filter");

    ImageSearchData {
        query: query.to_string(),
        total_images,
        images,
    }
}

fn rendered_size(img: ElementRef<'_>) -> Option<(u32, u32)> {
    let read = |name: &str| img.value().attr(name)?.trim().parse::<f64>().ok();
    let width = read(RENDERED_WIDTH_ATTR)?;
    let height = read(RENDERED_HEIGHT_ATTR)?;
    Some((width.max(0.0).round() as u32, height.max(0.0).round() as u32))
}

/// Alt text, or the caption of the enclosing result tile.
fn image_title(img: ElementRef<'_>, rules: &ImageRules) -> String {
    if let Some(alt) = img.value().attr("alt").map(str::trim).filter(|a| !a.is_empty()) {
        return alt.to_string();
    }
    img.ancestors()
        .filter_map(ElementRef::wrap)
        .take(4)
        .find_map(|tile| rules.title.text(tile))
        .unwrap_or_default()
}
