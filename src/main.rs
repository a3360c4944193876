use std::sync::Arc;

use dotenv::dotenv;
use tracing_subscriber::EnvFilter;

use serp_crawler::api::{self, AppState};
use serp_crawler::browser::ChromeSession;
use serp_crawler::config::Settings;
use serp_crawler::crawler::SerpCrawler;
use serp_crawler::extract::ExtractionRules;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("serp_crawler=info,tower_http=info")),
        )
        .init();

    let settings = Settings::from_env()?;
    let rules = ExtractionRules::google()?;

    // Browser is attached lazily on the first request.
    let renderer = Arc::new(ChromeSession::new(settings.browser.clone()));
    let crawler = SerpCrawler::new(renderer, rules, settings.crawl.clone());
    let app = api::router(AppState {
        crawler: Arc::new(crawler),
    });

    let addr = format!("0.0.0.0:{}", settings.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Listening on {}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}
