use axum::{
    async_trait,
    extract::{FromRequestParts, Query, State},
    http::{header, request::Parts, Method},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use utoipa::{IntoParams, OpenApi, ToSchema};
use utoipa_swagger_ui::SwaggerUi;
use uuid::Uuid;

use crate::crawler::{SearchMode, SerpCrawler};
use crate::error::{ApiError, ErrorBody, ExtractionError};
use crate::models::*;

pub const SERVICE_NAME: &str = "serp-crawler";
pub const ENDPOINTS: [&str; 5] = ["/health", "/search", "/images", "/videos", "/news"];

#[derive(OpenApi)]
#[openapi(
    paths(health, search, images, videos, news),
    components(
        schemas(
            Health,
            ErrorBody,
            SearchEnvelope,
            ImageEnvelope,
            VideoEnvelope,
            NewsEnvelope,
            SearchData,
            SearchInfo,
            OrganicResult,
            FeaturedSnippet,
            KnowledgePanel,
            KnowledgeFact,
            RelatedQuestion,
            RelatedSearch,
            InlineImage,
            InlineVideo,
            InlineNews,
            SiteLink,
            ImageSearchData,
            ImageResult,
            VideoSearchData,
            VideoResult,
            NewsSearchData,
            NewsArticle
        )
    ),
    tags(
        (name = "search", description = "Rendered search result extraction"),
        (name = "service", description = "Service status")
    )
)]
pub struct ApiDoc;

#[derive(Clone)]
pub struct AppState {
    pub crawler: Arc<SerpCrawler>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct SearchParams {
    /// Search query, required and non-blank.
    pub q: Option<String>,
}

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for SearchParams {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let Query(pairs) = Query::<Vec<(String, String)>>::try_from_uri(&parts.uri)
            .map_err(|_| ApiError::MissingQuery)?;
        Ok(Self::from_pairs(pairs))
    }
}

impl SearchParams {
    /// Takes the first `q` from the raw pairs; repeated keys are not an error.
    pub fn from_pairs(pairs: Vec<(String, String)>) -> Self {
        Self {
            q: pairs.into_iter().find(|(key, _)| key == "q").map(|(_, value)| value),
        }
    }

    fn into_query(self) -> Result<String, ApiError> {
        self.q
            .map(|q| q.trim().to_string())
            .filter(|q| !q.is_empty())
            .ok_or(ApiError::MissingQuery)
    }
}

#[derive(Debug, Serialize, ToSchema)]
#[aliases(
    SearchEnvelope = Envelope<SearchData>,
    ImageEnvelope = Envelope<ImageSearchData>,
    VideoEnvelope = Envelope<VideoSearchData>,
    NewsEnvelope = Envelope<NewsSearchData>
)]
pub struct Envelope<T> {
    pub success: bool,
    /// ISO-8601, UTC.
    pub timestamp: String,
    pub data: T,
}

impl<T> Envelope<T> {
    pub fn new(data: T) -> Self {
        Self {
            success: true,
            timestamp: chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
            data,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct Health {
    pub status: String,
    pub service: String,
    pub version: String,
    pub endpoints: Vec<String>,
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .route("/", get(health).fallback(method_not_allowed))
        .route("/health", get(health).fallback(method_not_allowed))
        .route("/search", get(search).fallback(method_not_allowed))
        .route("/images", get(images).fallback(method_not_allowed))
        .route("/videos", get(videos).fallback(method_not_allowed))
        .route("/news", get(news).fallback(method_not_allowed))
        .fallback(not_found)
        .with_state(Arc::new(state))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

#[utoipa::path(
    get,
    path = "/health",
    tag = "service",
    responses((status = 200, description = "Service is up", body = Health))
)]
pub async fn health() -> Json<Health> {
    Json(Health {
        status: "ok".to_string(),
        service: SERVICE_NAME.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        endpoints: ENDPOINTS.iter().map(|e| e.to_string()).collect(),
    })
}

#[utoipa::path(
    get,
    path = "/search",
    tag = "search",
    params(SearchParams),
    responses(
        (status = 200, description = "Web results", body = SearchEnvelope),
        (status = 400, description = "Missing query", body = ErrorBody),
        (status = 500, description = "Render or extraction failed", body = ErrorBody)
    )
)]
pub async fn search(
    State(state): State<Arc<AppState>>,
    params: SearchParams,
) -> Result<Json<Envelope<SearchData>>, ApiError> {
    let query = params.into_query()?;
    let data = run_extraction(&state, SearchMode::Web, query, SerpCrawler::search).await?;
    Ok(Json(Envelope::new(data)))
}

#[utoipa::path(
    get,
    path = "/images",
    tag = "search",
    params(SearchParams),
    responses(
        (status = 200, description = "Image results", body = ImageEnvelope),
        (status = 400, description = "Missing query", body = ErrorBody),
        (status = 500, description = "Render or extraction failed", body = ErrorBody)
    )
)]
pub async fn images(
    State(state): State<Arc<AppState>>,
    params: SearchParams,
) -> Result<Json<Envelope<ImageSearchData>>, ApiError> {
    let query = params.into_query()?;
    let data = run_extraction(&state, SearchMode::Images, query, SerpCrawler::images).await?;
    Ok(Json(Envelope::new(data)))
}

#[utoipa::path(
    get,
    path = "/videos",
    tag = "search",
    params(SearchParams),
    responses(
        (status = 200, description = "Video results", body = VideoEnvelope),
        (status = 400, description = "Missing query", body = ErrorBody),
        (status = 500, description = "Render or extraction failed", body = ErrorBody)
    )
)]
pub async fn videos(
    State(state): State<Arc<AppState>>,
    params: SearchParams,
) -> Result<Json<Envelope<VideoSearchData>>, ApiError> {
    let query = params.into_query()?;
    let data = run_extraction(&state, SearchMode::Videos, query, SerpCrawler::videos).await?;
    Ok(Json(Envelope::new(data)))
}

#[utoipa::path(
    get,
    path = "/news",
    tag = "search",
    params(SearchParams),
    responses(
        (status = 200, description = "News results", body = NewsEnvelope),
        (status = 400, description = "Missing query", body = ErrorBody),
        (status = 500, description = "Render or extraction failed", body = ErrorBody)
    )
)]
pub async fn news(
    State(state): State<Arc<AppState>>,
    params: SearchParams,
) -> Result<Json<Envelope<NewsSearchData>>, ApiError> {
    let query = params.into_query()?;
    let data = run_extraction(&state, SearchMode::News, query, SerpCrawler::news).await?;
    Ok(Json(Envelope::new(data)))
}

async fn not_found() -> ApiError {
    ApiError::NotFound
}

async fn method_not_allowed() -> ApiError {
    ApiError::MethodNotAllowed
}

/// Runs a blocking extraction off the async executor, inside a request span.
async fn run_extraction<T, F>(
    state: &AppState,
    mode: SearchMode,
    query: String,
    job: F,
) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce(&SerpCrawler, &str) -> Result<T, ExtractionError> + Send + 'static,
{
    let crawler = state.crawler.clone();
    let span = tracing::info_span!(
        "extract",
        request_id = %Uuid::new_v4(),
        %mode,
        query = %query
    );

    let result = tokio::task::spawn_blocking(move || {
        let _entered = span.enter();
        let result = job(crawler.as_ref(), query.as_str());
        if let Err(e) = &result {
            tracing::warn!(error = ?e, "extraction failed");
        }
        result
    })
    .await
    .map_err(|e| ExtractionError::Worker(e.to_string()))?;

    Ok(result?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_queries_are_rejected() {
        for q in [None, Some(""), Some("   ")] {
            let params = SearchParams { q: q.map(str::to_string) };
            assert!(matches!(params.into_query(), Err(ApiError::MissingQuery)));
        }
    }

    #[test]
    fn first_query_wins_when_repeated() {
        let pairs = vec![
            ("hl".to_string(), "en".to_string()),
            ("q".to_string(), "first".to_string()),
            ("q".to_string(), "second".to_string()),
        ];
        assert_eq!(SearchParams::from_pairs(pairs).into_query().unwrap(), "first");
        assert!(SearchParams::from_pairs(vec![]).q.is_none());
    }

    #[test]
    fn query_is_trimmed() {
        let params = SearchParams { q: Some("  openai ".to_string()) };
        assert_eq!(params.into_query().unwrap(), "openai");
    }

    #[test]
    fn envelope_serializes_camel_case_payload() {
        let envelope = Envelope::new(ImageSearchData {
            query: "cats".to_string(),
            total_images: 0,
            images: vec![],
        });
        let json = serde_json::to_value(&envelope).unwrap();
        assert_eq!(json["success"], true);
        assert_eq!(json["data"]["totalImages"], 0);
        assert!(json["timestamp"].as_str().unwrap().ends_with('Z'));
    }
}
