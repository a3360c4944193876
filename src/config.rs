use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;

pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/123.0.0.0 Safari/537.36";

/// Where the shared browser session comes from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BrowserSettings {
    /// DevTools websocket of an already running browser.
    pub ws_endpoint: Option<String>,
    /// HTTP DevTools address (`http://host:9222`); the websocket is discovered from it.
    pub discovery_url: Option<String>,
    /// Chrome binary for local launches.
    pub chrome_path: Option<PathBuf>,
}

/// Heuristic thresholds for the extraction rules.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Limits {
    /// Both rendered dimensions must exceed this to count as a result image.
    pub image_min_dimension: u32,
    pub image_results: usize,
    pub inline_images: usize,
    pub scroll_passes: u32,
    pub scroll_delay: Duration,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            image_min_dimension: 100,
            image_results: 50,
            inline_images: 20,
            scroll_passes: 3,
            scroll_delay: Duration::from_secs(1),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlSettings {
    pub user_agent: String,
    pub navigation_timeout: Duration,
    pub ready_timeout: Duration,
    pub limits: Limits,
}

impl Default for CrawlSettings {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_string(),
            navigation_timeout: Duration::from_secs(30),
            ready_timeout: Duration::from_secs(10),
            limits: Limits::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub port: u16,
    pub browser: BrowserSettings,
    pub crawl: CrawlSettings,
}

impl Settings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds settings from an arbitrary key lookup, falling back to defaults for
    /// unset or blank keys.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = CrawlSettings::default();

        let limits = Limits {
            image_min_dimension: parse_or(&get, "IMAGE_MIN_DIMENSION", defaults.limits.image_min_dimension)?,
            image_results: parse_or(&get, "IMAGE_RESULT_LIMIT", defaults.limits.image_results)?,
            inline_images: parse_or(&get, "INLINE_IMAGE_LIMIT", defaults.limits.inline_images)?,
            scroll_passes: parse_or(&get, "IMAGE_SCROLL_PASSES", defaults.limits.scroll_passes)?,
            scroll_delay: Duration::from_millis(parse_or(&get, "IMAGE_SCROLL_DELAY_MS", 1000u64)?),
        };

        let crawl = CrawlSettings {
            user_agent: get("USER_AGENT").unwrap_or(defaults.user_agent),
            navigation_timeout: Duration::from_secs(parse_or(&get, "NAVIGATION_TIMEOUT_SECS", 30u64)?),
            ready_timeout: Duration::from_secs(parse_or(&get, "READY_TIMEOUT_SECS", 10u64)?),
            limits,
        };

        let browser = BrowserSettings {
            ws_endpoint: get("BROWSER_WS_ENDPOINT"),
            discovery_url: get("BROWSER_URL"),
            chrome_path: get("CHROME_PATH").map(PathBuf::from),
        };

        Ok(Self {
            port: parse_or(&get, "PORT", 3000u16)?,
            browser,
            crawl,
        })
    }
}

fn parse_or<T, G>(get: &G, var: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    match get(var) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            var,
            value: raw.clone(),
            reason: e.to_string(),
        }),
    }
}
