use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::browser::{PageGuard, RenderedPage, Renderer};
use crate::config::CrawlSettings;
use crate::error::ExtractionError;
use crate::extract::{self, images::STAMP_DIMENSIONS_SCRIPT, ExtractionRules, Snapshot};
use crate::models::{ImageSearchData, NewsSearchData, SearchData, VideoSearchData};

const SEARCH_URL: &str = "https://www.google.com/search";
const SCROLL_TO_BOTTOM_SCRIPT: &str = "window.scrollTo(0, document.body.scrollHeight); document.body.scrollHeight";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchMode {
    Web,
    Images,
    Videos,
    News,
}

impl SearchMode {
    pub fn as_str(self) -> &'static str {
        match self {
            SearchMode::Web => "web",
            SearchMode::Images => "images",
            SearchMode::Videos => "videos",
            SearchMode::News => "news",
        }
    }

    /// Results page for `query` in this vertical.
    pub fn target_url(self, query: &str) -> String {
        let vertical = match self {
            SearchMode::Web => "",
            SearchMode::Images => "&tbm=isch",
            SearchMode::Videos => "&tbm=vid",
            SearchMode::News => "&tbm=nws",
        };
        format!("{}?q={}&hl=en{}", SEARCH_URL, urlencoding::encode(query), vertical)
    }

    /// Element whose presence means the results container has rendered.
    pub fn ready_selector(self) -> &'static str {
        match self {
            SearchMode::Images => "#search img, #islrg img",
            SearchMode::Web | SearchMode::Videos | SearchMode::News => "#search",
        }
    }
}

impl fmt::Display for SearchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Drives one page per call through navigate, wait, snapshot and extract.
///
/// All methods block on the browser and belong on a blocking thread.
pub struct SerpCrawler {
    renderer: Arc<dyn Renderer>,
    rules: ExtractionRules,
    settings: CrawlSettings,
}

impl SerpCrawler {
    pub fn new(renderer: Arc<dyn Renderer>, rules: ExtractionRules, settings: CrawlSettings) -> Self {
        Self {
            renderer,
            rules,
            settings,
        }
    }

    pub fn search(&self, query: &str) -> Result<SearchData, ExtractionError> {
        self.render(SearchMode::Web, query, |snapshot| {
            extract::web::extract(query, snapshot, &self.rules.web, &self.settings.limits)
        })
    }

    pub fn images(&self, query: &str) -> Result<ImageSearchData, ExtractionError> {
        self.render(SearchMode::Images, query, |snapshot| {
            extract::images::extract(query, snapshot, &self.rules.images, &self.settings.limits)
        })
    }

    pub fn videos(&self, query: &str) -> Result<VideoSearchData, ExtractionError> {
        self.render(SearchMode::Videos, query, |snapshot| {
            extract::videos::extract(query, snapshot, &self.rules.videos)
        })
    }

    pub fn news(&self, query: &str) -> Result<NewsSearchData, ExtractionError> {
        self.render(SearchMode::News, query, |snapshot| {
            extract::news::extract(query, snapshot, &self.rules.news)
        })
    }

    /// Shared page lifecycle. The page is closed when the guard leaves scope,
    /// after extraction or at the first failing step.
    fn render<T>(
        &self,
        mode: SearchMode,
        query: &str,
        extract: impl FnOnce(&Snapshot) -> T,
    ) -> Result<T, ExtractionError> {
        let started = Instant::now();
        let url = mode.target_url(query);

        let page = self
            .renderer
            .open_page()
            .map(PageGuard::new)
            .map_err(|e| ExtractionError::Browser(format!("{:#}", e)))?;

        page.set_user_agent(&self.settings.user_agent)
            .map_err(|e| ExtractionError::Browser(format!("{:#}", e)))?;

        tracing::debug!(%url, "navigating");
        page.navigate(&url, self.settings.navigation_timeout)
            .map_err(|e| ExtractionError::Navigation {
                url: url.clone(),
                reason: format!("{:#}", e),
            })?;

        let marker = mode.ready_selector();
        page.wait_for(marker, self.settings.ready_timeout)
            .map_err(|e| ExtractionError::NotReady {
                selector: marker.to_string(),
                reason: format!("{:#}", e),
            })?;

        if mode == SearchMode::Images {
            self.settle_lazy_images(&*page)?;
        }

        let html = page
            .content()
            .map_err(|e| ExtractionError::Evaluation(format!("{:#}", e)))?;
        let snapshot = Snapshot {
            html,
            url: page.url(),
        };

        let data = extract(&snapshot);
        tracing::info!(
            %mode,
            html_len = snapshot.html.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "extraction finished"
        );
        Ok(data)
    }

    /// Scrolls to the bottom a few times so lazily loaded thumbnails render, then
    /// records each image's rendered size on the element.
    fn settle_lazy_images(&self, page: &dyn RenderedPage) -> Result<(), ExtractionError> {
        let limits = &self.settings.limits;
        for pass in 1..=limits.scroll_passes {
            let height = page
                .evaluate(SCROLL_TO_BOTTOM_SCRIPT)
                .map_err(|e| ExtractionError::Evaluation(format!("{:#}", e)))?;
            tracing::debug!(pass, %height, "scrolled");
            std::thread::sleep(limits.scroll_delay);
        }

        let stamped = page
            .evaluate(STAMP_DIMENSIONS_SCRIPT)
            .map_err(|e| ExtractionError::Evaluation(format!("{:#}", e)))?;
        tracing::debug!(%stamped, "image sizes recorded");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Limits;
    use anyhow::{anyhow, Result};
    use serde_json::Value;
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct Script {
        html: String,
        fail_navigation: bool,
        fail_wait: bool,
        fail_open: bool,
    }

    #[derive(Default)]
    struct Log {
        calls: Vec<String>,
        closes: usize,
    }

    struct FakeRenderer {
        script: Script,
        log: Arc<Mutex<Log>>,
    }

    struct FakePage {
        html: String,
        fail_navigation: bool,
        fail_wait: bool,
        log: Arc<Mutex<Log>>,
    }

    impl FakePage {
        fn record(&self, call: String) {
            self.log.lock().unwrap().calls.push(call);
        }
    }

    impl Renderer for FakeRenderer {
        fn open_page(&self) -> Result<Box<dyn RenderedPage>> {
            if self.script.fail_open {
                return Err(anyhow!("browser unavailable"));
            }
            Ok(Box::new(FakePage {
                html: self.script.html.clone(),
                fail_navigation: self.script.fail_navigation,
                fail_wait: self.script.fail_wait,
                log: self.log.clone(),
            }))
        }
    }

    impl RenderedPage for FakePage {
        fn set_user_agent(&self, user_agent: &str) -> Result<()> {
            self.record(format!("ua {}", user_agent));
            Ok(())
        }
        fn navigate(&self, url: &str, timeout: Duration) -> Result<()> {
            self.record(format!("goto {} {}", url, timeout.as_secs()));
            if self.fail_navigation {
                return Err(anyhow!("navigation timed out"));
            }
            Ok(())
        }
        fn wait_for(&self, selector: &str, timeout: Duration) -> Result<()> {
            self.record(format!("wait {} {}", selector, timeout.as_secs()));
            if self.fail_wait {
                return Err(anyhow!("element not found"));
            }
            Ok(())
        }
        fn evaluate(&self, script: &str) -> Result<Value> {
            let kind = if script.contains("scrollTo") { "scroll" } else { "stamp" };
            self.record(format!("eval {}", kind));
            Ok(Value::from(1))
        }
        fn content(&self) -> Result<String> {
            self.record("content".to_string());
            Ok(self.html.clone())
        }
        fn url(&self) -> String {
            "https://www.google.com/search?q=test".to_string()
        }
        fn close(&self) -> Result<()> {
            self.log.lock().unwrap().closes += 1;
            Ok(())
        }
    }

    fn crawler(script: Script) -> (SerpCrawler, Arc<Mutex<Log>>) {
        let log = Arc::new(Mutex::new(Log::default()));
        let renderer = Arc::new(FakeRenderer { script, log: log.clone() });
        let settings = CrawlSettings {
            user_agent: "test-agent".to_string(),
            limits: Limits { scroll_delay: Duration::ZERO, ..Limits::default() },
            ..CrawlSettings::default()
        };
        let rules = ExtractionRules::google().unwrap();
        (SerpCrawler::new(renderer, rules, settings), log)
    }

    #[test]
    fn target_urls_encode_the_query() {
        assert_eq!(
            SearchMode::Web.target_url("rust & c++"),
            "https://www.google.com/search?q=rust%20%26%20c%2B%2B&hl=en"
        );
        assert!(SearchMode::Images.target_url("x").ends_with("&tbm=isch"));
        assert!(SearchMode::Videos.target_url("x").ends_with("&tbm=vid"));
        assert!(SearchMode::News.target_url("x").ends_with("&tbm=nws"));
    }

    #[test]
    fn web_lifecycle_runs_in_order_and_closes_once() {
        let html = r#"<html><body><div id="search"><div class="g">
            <a href="https://example.com/"><h3>Example</h3></a></div></div></body></html>"#;
        let (crawler, log) = crawler(Script { html: html.to_string(), ..Script::default() });

        let data = crawler.search("example").unwrap();
        assert_eq!(data.query, "example");
        assert_eq!(data.organic_results.len(), 1);

        let log = log.lock().unwrap();
        assert_eq!(
            log.calls,
            vec![
                "ua test-agent".to_string(),
                "goto https://www.google.com/search?q=example&hl=en 30".to_string(),
                "wait #search 10".to_string(),
                "content".to_string(),
            ]
        );
        assert_eq!(log.closes, 1);
    }

    #[test]
    fn image_mode_scrolls_then_stamps_sizes() {
        let (crawler, log) = crawler(Script::default());
        let data = crawler.images("cats").unwrap();
        assert_eq!(data.total_images, 0);

        let log = log.lock().unwrap();
        let evals: Vec<&str> = log
            .calls
            .iter()
            .filter(|c| c.starts_with("eval"))
            .map(String::as_str)
            .collect();
        assert_eq!(evals, vec!["eval scroll", "eval scroll", "eval scroll", "eval stamp"]);
        assert_eq!(log.calls.last().map(String::as_str), Some("content"));
        assert_eq!(log.closes, 1);
    }

    #[test]
    fn navigation_failure_closes_the_page_once() {
        let (crawler, log) = crawler(Script { fail_navigation: true, ..Script::default() });
        let err = crawler.videos("rust").unwrap_err();
        assert!(matches!(err, ExtractionError::Navigation { .. }));
        assert_eq!(err.to_string(), "navigation timed out");

        let log = log.lock().unwrap();
        assert_eq!(log.closes, 1);
        assert!(!log.calls.iter().any(|c| c.starts_with("wait")));
    }

    #[test]
    fn readiness_timeout_closes_the_page_once() {
        let (crawler, log) = crawler(Script { fail_wait: true, ..Script::default() });
        let err = crawler.news("rust").unwrap_err();
        assert!(matches!(err, ExtractionError::NotReady { .. }));
        assert_eq!(err.to_string(), "element not found");
        assert_eq!(log.lock().unwrap().closes, 1);
    }

    #[test]
    fn browser_unavailable_is_an_error_without_a_page() {
        let (crawler, log) = crawler(Script { fail_open: true, ..Script::default() });
        let err = crawler.search("rust").unwrap_err();
        assert_eq!(err.to_string(), "browser unavailable");
        assert_eq!(log.lock().unwrap().closes, 0);
    }
}
