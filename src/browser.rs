//! Rendering client: the seam between the extraction engine and a real browser.
//!
//! `Renderer` leases pages, `RenderedPage` is one tab. The production
//! implementation drives Chrome over the DevTools protocol with `headless_chrome`,
//! either launched locally or attached to a remote instance.

use std::ops::Deref;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use headless_chrome::{Browser, LaunchOptions, Tab};
use serde::Deserialize;
use serde_json::Value;

use crate::config::BrowserSettings;

/// Source of fresh pages. Implementations must be usable from several request
/// threads at once; each call returns an independent page.
pub trait Renderer: Send + Sync {
    fn open_page(&self) -> Result<Box<dyn RenderedPage>>;
}

/// One browser tab. All calls block until the browser answers.
pub trait RenderedPage: Send {
    fn set_user_agent(&self, user_agent: &str) -> Result<()>;
    /// Navigates and waits for the load to settle, bounded by `timeout`.
    fn navigate(&self, url: &str, timeout: Duration) -> Result<()>;
    fn wait_for(&self, selector: &str, timeout: Duration) -> Result<()>;
    fn evaluate(&self, script: &str) -> Result<Value>;
    /// Serialized live DOM.
    fn content(&self) -> Result<String>;
    fn url(&self) -> String;
    fn close(&self) -> Result<()>;
}

/// Owns a leased page and closes it when dropped, whichever way the caller exits.
pub struct PageGuard {
    page: Box<dyn RenderedPage>,
}

impl PageGuard {
    pub fn new(page: Box<dyn RenderedPage>) -> Self {
        Self { page }
    }
}

impl Deref for PageGuard {
    type Target = dyn RenderedPage;

    fn deref(&self) -> &Self::Target {
        self.page.as_ref()
    }
}

impl Drop for PageGuard {
    fn drop(&mut self) {
        if let Err(e) = self.page.close() {
            tracing::warn!(error = %e, "failed to close page");
        }
    }
}

/// Lazily created shared handle that is replaced when it goes stale.
///
/// The lock is only held to read or swap the handle; liveness checks run on a
/// cloned `Arc` with the lock released.
pub struct SessionSlot<T> {
    current: Mutex<Option<Arc<T>>>,
}

impl<T> SessionSlot<T> {
    pub fn new() -> Self {
        Self {
            current: Mutex::new(None),
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Option<Arc<T>>>> {
        self.current
            .lock()
            .map_err(|_| anyhow!("browser session lock poisoned"))
    }

    /// Returns a live handle, connecting when the slot is empty or `is_alive`
    /// rejects the cached one.
    pub fn lease<A, C>(&self, is_alive: A, connect: C) -> Result<Arc<T>>
    where
        A: Fn(&T) -> bool,
        C: FnOnce() -> Result<T>,
    {
        let cached = self.lock()?.clone();
        if let Some(handle) = &cached {
            if is_alive(handle) {
                return Ok(handle.clone());
            }
            tracing::warn!("browser connection lost, reconnecting");
        }

        let mut slot = self.lock()?;
        // Another lease may have reconnected while the check ran.
        if let Some(current) = slot.as_ref() {
            let replaced = cached.as_ref().map_or(true, |stale| !Arc::ptr_eq(stale, current));
            if replaced {
                return Ok(current.clone());
            }
        }
        let fresh = Arc::new(connect()?);
        *slot = Some(fresh.clone());
        Ok(fresh)
    }

    /// Drops `stale` so the next lease reconnects. A newer handle is left alone.
    pub fn invalidate(&self, stale: &Arc<T>) {
        if let Ok(mut slot) = self.lock() {
            if slot.as_ref().is_some_and(|current| Arc::ptr_eq(current, stale)) {
                *slot = None;
            }
        }
    }
}

impl<T> Default for SessionSlot<T> {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// headless_chrome implementation
// ============================================================================

/// Browser session shared by every request of the process.
pub struct ChromeSession {
    settings: BrowserSettings,
    browser: SessionSlot<Browser>,
}

impl ChromeSession {
    pub fn new(settings: BrowserSettings) -> Self {
        Self {
            settings,
            browser: SessionSlot::new(),
        }
    }

    fn connect(&self) -> Result<Browser> {
        if let Some(ws) = &self.settings.ws_endpoint {
            tracing::info!(endpoint = %ws, "connecting to remote browser");
            return Browser::connect(ws.clone()).context("failed to connect to remote browser");
        }

        if let Some(base) = &self.settings.discovery_url {
            let ws = discover_ws_endpoint(base)?;
            tracing::info!(endpoint = %ws, "connecting to discovered browser");
            return Browser::connect(ws).context("failed to connect to remote browser");
        }

        tracing::info!("launching local headless browser");
        let args = vec![
            std::ffi::OsStr::new("--no-sandbox"),
            std::ffi::OsStr::new("--disable-dev-shm-usage"),
            std::ffi::OsStr::new("--disable-gpu"),
            std::ffi::OsStr::new("--lang=en-US"),
        ];
        Browser::new(LaunchOptions {
            headless: true,
            window_size: Some((1920, 1080)),
            path: self.settings.chrome_path.clone(),
            idle_browser_timeout: Duration::from_secs(60 * 60),
            args,
            ..Default::default()
        })
        .context("failed to launch browser")
    }
}

impl Renderer for ChromeSession {
    fn open_page(&self) -> Result<Box<dyn RenderedPage>> {
        let browser = self
            .browser
            .lease(|b| b.get_version().is_ok(), || self.connect())?;
        match browser.new_tab() {
            Ok(tab) => Ok(Box::new(ChromePage { tab })),
            Err(e) => {
                self.browser.invalidate(&browser);
                Err(e.context("failed to open browser tab"))
            }
        }
    }
}

#[derive(Deserialize)]
struct VersionInfo {
    #[serde(rename = "webSocketDebuggerUrl")]
    web_socket_debugger_url: String,
}

/// Resolves the browser websocket from a DevTools HTTP address (`/json/version`).
fn discover_ws_endpoint(base: &str) -> Result<String> {
    let url = format!("{}/json/version", base.trim_end_matches('/'));
    let client = reqwest::blocking::Client::builder()
        .timeout(Duration::from_secs(10))
        .build()?;
    let info: VersionInfo = client
        .get(&url)
        .send()
        .and_then(|resp| resp.error_for_status())
        .and_then(|resp| resp.json())
        .with_context(|| format!("browser discovery via {} failed", url))?;
    Ok(info.web_socket_debugger_url)
}

struct ChromePage {
    tab: Arc<Tab>,
}

impl RenderedPage for ChromePage {
    fn set_user_agent(&self, user_agent: &str) -> Result<()> {
        self.tab.set_user_agent(user_agent, Some("en-US,en;q=0.9"), None)
    }

    fn navigate(&self, url: &str, timeout: Duration) -> Result<()> {
        self.tab.set_default_timeout(timeout);
        self.tab.navigate_to(url)?;
        self.tab.wait_until_navigated()?;
        Ok(())
    }

    fn wait_for(&self, selector: &str, timeout: Duration) -> Result<()> {
        self.tab.wait_for_element_with_custom_timeout(selector, timeout)?;
        Ok(())
    }

    fn evaluate(&self, script: &str) -> Result<Value> {
        let result = self.tab.evaluate(script, false)?;
        Ok(result.value.unwrap_or(Value::Null))
    }

    fn content(&self) -> Result<String> {
        self.tab.get_content()
    }

    fn url(&self) -> String {
        self.tab.get_url()
    }

    fn close(&self) -> Result<()> {
        self.tab.close(false)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingPage {
        closes: Arc<AtomicUsize>,
        fail_close: bool,
    }

    impl RenderedPage for CountingPage {
        fn set_user_agent(&self, _: &str) -> Result<()> {
            Ok(())
        }
        fn navigate(&self, url: &str, _: Duration) -> Result<()> {
            Err(anyhow!("navigation to {} timed out", url))
        }
        fn wait_for(&self, _: &str, _: Duration) -> Result<()> {
            Ok(())
        }
        fn evaluate(&self, _: &str) -> Result<Value> {
            Ok(Value::Null)
        }
        fn content(&self) -> Result<String> {
            Ok(String::new())
        }
        fn url(&self) -> String {
            "about:blank".to_string()
        }
        fn close(&self) -> Result<()> {
            self.closes.fetch_add(1, Ordering::SeqCst);
            if self.fail_close {
                Err(anyhow!("target already gone"))
            } else {
                Ok(())
            }
        }
    }

    fn guard(closes: &Arc<AtomicUsize>, fail_close: bool) -> PageGuard {
        PageGuard::new(Box::new(CountingPage {
            closes: closes.clone(),
            fail_close,
        }))
    }

    #[test]
    fn guard_closes_once_on_scope_exit() {
        let closes = Arc::new(AtomicUsize::new(0));
        {
            let page = guard(&closes, false);
            assert_eq!(page.url(), "about:blank");
        }
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn guard_closes_once_on_error_path() {
        let closes = Arc::new(AtomicUsize::new(0));
        let outcome = (|| -> Result<()> {
            let page = guard(&closes, false);
            page.navigate("https://example.com", Duration::from_secs(1))?;
            Ok(())
        })();
        assert!(outcome.is_err());
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn close_failure_does_not_panic() {
        let closes = Arc::new(AtomicUsize::new(0));
        drop(guard(&closes, true));
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn slot_connects_once_and_reuses_live_handle() {
        let slot = SessionSlot::new();
        let connects = AtomicUsize::new(0);
        let connect = || {
            connects.fetch_add(1, Ordering::SeqCst);
            Ok(7u32)
        };
        let first = slot.lease(|_| true, connect).unwrap();
        let second = slot.lease(|_| true, || Ok(8u32)).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(connects.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn liveness_check_runs_without_the_lock() {
        let slot = SessionSlot::new();
        slot.lease(|_| true, || Ok(1u32)).unwrap();
        let leased = slot
            .lease(
                |_| {
                    // A concurrent lease must be able to read the slot meanwhile.
                    assert!(slot.current.try_lock().is_ok());
                    true
                },
                || Ok(2u32),
            )
            .unwrap();
        assert_eq!(*leased, 1);
    }

    #[test]
    fn dead_handle_is_replaced() {
        let slot = SessionSlot::new();
        slot.lease(|_| true, || Ok(1u32)).unwrap();
        let leased = slot.lease(|v| *v != 1, || Ok(2u32)).unwrap();
        assert_eq!(*leased, 2);
        assert_eq!(*slot.lease(|_| true, || Ok(3u32)).unwrap(), 2);
    }

    #[test]
    fn failed_connect_leaves_slot_empty() {
        let slot: SessionSlot<u32> = SessionSlot::new();
        assert!(slot.lease(|_| true, || Err(anyhow!("no browser"))).is_err());
        assert_eq!(*slot.lease(|_| true, || Ok(4u32)).unwrap(), 4);
    }

    #[test]
    fn invalidate_only_drops_the_stale_handle() {
        let slot = SessionSlot::new();
        let old = slot.lease(|_| true, || Ok(1u32)).unwrap();
        slot.invalidate(&old);
        let fresh = slot.lease(|_| true, || Ok(2u32)).unwrap();
        assert_eq!(*fresh, 2);

        slot.invalidate(&old);
        assert!(Arc::ptr_eq(&fresh, &slot.lease(|_| true, || Ok(3u32)).unwrap()));
    }
}
