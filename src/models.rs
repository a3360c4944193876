use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

// ============================================================================
// Web results
// ============================================================================

/// Everything extracted from a regular web results page.
#[derive(Debug, Serialize, Deserialize, Clone, Default, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SearchData {
    pub query: String,
    pub search_info: SearchInfo,
    pub organic_results: Vec<OrganicResult>,
    pub featured_snippet: Option<FeaturedSnippet>,
    pub knowledge_panel: Option<KnowledgePanel>,
    pub people_also_ask: Vec<RelatedQuestion>,
    pub related_searches: Vec<RelatedSearch>,
    pub images: Vec<InlineImage>,
    pub videos: Vec<InlineVideo>,
    pub news: Vec<InlineNews>,
    pub site_links: Vec<SiteLink>,
}

/// Parsed "About N results (T seconds)" line.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SearchInfo {
    pub total_results: Option<u64>,
    pub search_time: Option<f64>,
    pub raw_text: Option<String>,
}

/// Organic (non-paid) listing. `title` and `url` are never empty.
#[derive(Debug, Serialize, Deserialize, Clone, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OrganicResult {
    pub position: usize,
    pub title: String,
    pub url: String,
    pub display_url: String,
    pub snippet: String,
    pub favicon: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct FeaturedSnippet {
    pub title: String,
    pub content: String,
    pub url: Option<String>,
    pub source: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct KnowledgePanel {
    pub title: String,
    pub subtitle: Option<String>,
    pub description: Option<String>,
    pub source: Option<String>,
    pub image: Option<String>,
    pub facts: Vec<KnowledgeFact>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, ToSchema)]
pub struct KnowledgeFact {
    pub label: String,
    pub value: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, ToSchema)]
pub struct RelatedQuestion {
    pub question: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, ToSchema)]
pub struct RelatedSearch {
    pub query: String,
    pub url: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, ToSchema)]
pub struct InlineImage {
    pub title: String,
    pub thumbnail: String,
    pub url: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, ToSchema)]
pub struct InlineVideo {
    pub title: String,
    pub url: String,
    pub source: Option<String>,
    pub duration: Option<String>,
    pub thumbnail: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct InlineNews {
    pub title: String,
    pub url: String,
    pub source: Option<String>,
    pub published_at: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, ToSchema)]
pub struct SiteLink {
    pub title: String,
    pub url: String,
}

// ============================================================================
// Vertical searches
// ============================================================================

#[derive(Debug, Serialize, Deserialize, Clone, Default, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ImageSearchData {
    pub query: String,
    /// Size-filtered candidates before the result cap was applied.
    pub total_images: usize,
    pub images: Vec<ImageResult>,
}

#[derive(Debug, Serialize, Deserialize, Clone, ToSchema)]
pub struct ImageResult {
    pub position: usize,
    pub title: String,
    pub thumbnail: String,
    pub url: Option<String>,
    pub source: Option<String>,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct VideoSearchData {
    pub query: String,
    pub total_videos: usize,
    pub videos: Vec<VideoResult>,
}

#[derive(Debug, Serialize, Deserialize, Clone, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct VideoResult {
    pub position: usize,
    pub title: String,
    pub url: String,
    pub thumbnail: Option<String>,
    pub source: Option<String>,
    pub duration: Option<String>,
    pub upload_date: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct NewsSearchData {
    pub query: String,
    pub total_articles: usize,
    pub articles: Vec<NewsArticle>,
}

#[derive(Debug, Serialize, Deserialize, Clone, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct NewsArticle {
    pub position: usize,
    pub title: String,
    pub url: String,
    pub source: Option<String>,
    pub published_at: Option<String>,
    pub snippet: Option<String>,
    pub thumbnail: Option<String>,
}
