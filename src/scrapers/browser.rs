use crate::scrapers::traits::{Extractor, ResultPager};
use crate::scrapers::types::{
    RawComplexTable, RawCoordinates, RawListing, ResultPage, Vacancy,
};
use crate::scrapers::ur;
use crate::sync::throttle::Throttle;
use anyhow::{Context, Result};
use async_trait::async_trait;
use headless_chrome::{Browser, LaunchOptions, Tab};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info};

const RESULT_TIMEOUT: Duration = Duration::from_secs(15);
const ROOM_TIMEOUT: Duration = Duration::from_secs(10);
const COMPLEX_TIMEOUT: Duration = Duration::from_secs(10);
const COMPLEX_LINK_TIMEOUT: Duration = Duration::from_secs(10);
const HEADING_TIMEOUT: Duration = Duration::from_secs(5);
const VACANCY_TIMEOUT: Duration = Duration::from_secs(15);
const NAVIGATION_TIMEOUT: Duration = Duration::from_secs(60);
const IDLE_TIMEOUT: Duration = Duration::from_secs(600);
const AREA_SETTLE: Duration = Duration::from_secs(2);
const MAP_SETTLE: Duration = Duration::from_secs(1);

const RESULT_READY_SELECTOR: &str = "a[href*='_room.html']";

const SELECT_ALL_AREAS_JS: &str = r#"
    document.querySelectorAll("input[type='checkbox']:not(:disabled)").forEach(b => {
        b.checked = true;
        b.dispatchEvent(new Event('change', { bubbles: true }));
    });
"#;

const CLICK_NEXT_JS: &str = r#"
    (() => {
        const candidates = [
            ...document.querySelectorAll("li.next a"),
            ...[...document.querySelectorAll("a")].filter(a => a.textContent.includes("次へ")),
        ];
        const next = candidates.find(a => a.offsetParent !== null);
        if (!next) return false;
        next.click();
        return true;
    })()
"#;

/// ur-net.go.jp driven through headless Chrome.
///
/// Result pages live in one tab and detail pages in another, so walking a
/// result page never loses its pagination state.
pub struct UrBrowser {
    _browser: Browser,
    list_tab: Arc<Tab>,
    detail_tab: Arc<Tab>,
    /// Next-page flag of the result page last read
    has_next: Mutex<bool>,
    detail_throttle: Throttle,
    page_settle: Duration,
}

impl UrBrowser {
    pub fn new(headless: bool, detail_interval: Duration, page_settle: Duration) -> Result<Self> {
        let mode = if headless { "headless" } else { "visible" };
        info!("Launching {} Chrome...", mode);

        let options = LaunchOptions::default_builder()
            .headless(headless)
            .idle_browser_timeout(IDLE_TIMEOUT)
            .build()
            .context("Failed to build launch options")?;

        let browser = Browser::new(options).context("Failed to launch Chrome browser")?;
        let list_tab = browser.new_tab().context("Failed to open result tab")?;
        let detail_tab = browser.new_tab().context("Failed to open detail tab")?;
        list_tab.set_default_timeout(NAVIGATION_TIMEOUT);
        detail_tab.set_default_timeout(NAVIGATION_TIMEOUT);

        Ok(Self {
            _browser: browser,
            list_tab,
            detail_tab,
            has_next: Mutex::new(false),
            detail_throttle: Throttle::new(detail_interval),
            page_settle,
        })
    }

    async fn on_detail<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Tab) -> Result<T> + Send + 'static,
    {
        self.detail_throttle.wait().await;
        blocking(&self.detail_tab, f).await
    }

    async fn read_results(
        &self,
        ready: &'static str,
        timeout: Duration,
        parse: fn(&str) -> ResultPage,
    ) -> Result<Vec<String>> {
        let page = blocking(&self.list_tab, move |tab| {
            if let Err(e) = tab.wait_for_element_with_custom_timeout(ready, timeout) {
                debug!("No result links rendered: {}", e);
                return Ok(ResultPage::default());
            }
            let html = tab.get_content()?;
            Ok(parse(&html))
        })
        .await?;

        if let Ok(mut has_next) = self.has_next.lock() {
            *has_next = page.has_next;
        }
        Ok(page.links)
    }
}

/// headless_chrome is synchronous; keep its calls off the async workers
async fn blocking<T, F>(tab: &Arc<Tab>, f: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce(&Tab) -> Result<T> + Send + 'static,
{
    let tab = Arc::clone(tab);
    tokio::task::spawn_blocking(move || f(&tab))
        .await
        .context("Browser task panicked")?
}

fn open(tab: &Tab, url: &str) -> Result<()> {
    tab.navigate_to(url)
        .with_context(|| format!("Failed to navigate to {}", url))?;
    tab.wait_until_navigated()
        .with_context(|| format!("Timed out loading {}", url))?;
    Ok(())
}

#[async_trait]
impl ResultPager for UrBrowser {
    async fn open_area(&self, area: &str) -> Result<()> {
        let area_url = ur::area_url(area);
        let result_url = ur::result_url(area);
        let settle = AREA_SETTLE;

        blocking(&self.list_tab, move |tab| {
            open(tab, &area_url)?;
            tab.evaluate(SELECT_ALL_AREAS_JS, false)
                .context("Failed to select sub-areas")?;
            std::thread::sleep(settle);
            open(tab, &result_url)
        })
        .await
    }

    async fn result_links(&self) -> Result<Vec<String>> {
        self.read_results(RESULT_READY_SELECTOR, RESULT_TIMEOUT, ur::parse_result_page)
            .await
    }

    async fn complex_links(&self) -> Result<Vec<String>> {
        self.read_results(
            ur::COMPLEX_LINK_SELECTOR,
            COMPLEX_LINK_TIMEOUT,
            ur::parse_complex_result_page,
        )
        .await
    }

    async fn next_page(&self) -> Result<bool> {
        let has_next = self.has_next.lock().map(|flag| *flag).unwrap_or(false);
        if !has_next {
            return Ok(false);
        }
        let settle = self.page_settle;
        blocking(&self.list_tab, move |tab| {
            let clicked = tab
                .evaluate(CLICK_NEXT_JS, false)
                .context("Failed to click next page")?
                .value
                .and_then(|v| v.as_bool())
                .unwrap_or(false);
            if clicked {
                std::thread::sleep(settle);
            }
            Ok(clicked)
        })
        .await
    }
}

#[async_trait]
impl Extractor for UrBrowser {
    async fn extract_listing(&self, url: &str) -> Result<RawListing> {
        let url = url.to_string();
        self.on_detail(move |tab| {
            open(tab, &url)?;
            tab.wait_for_element_with_custom_timeout(ur::ROOM_READY_SELECTOR, ROOM_TIMEOUT)
                .with_context(|| format!("Price element missing on {}", url))?;
            let html = tab.get_content()?;
            Ok(ur::parse_room_page(&url, &html))
        })
        .await
    }

    async fn extract_coordinates(&self, url: &str) -> Result<Option<RawCoordinates>> {
        let url = url.to_string();
        self.on_detail(move |tab| {
            open(tab, &url)?;
            std::thread::sleep(MAP_SETTLE);
            let html = tab.get_content()?;
            Ok(ur::parse_coordinates(&html))
        })
        .await
    }

    async fn extract_complex(&self, url: &str) -> Result<RawComplexTable> {
        let url = url.to_string();
        self.on_detail(move |tab| {
            open(tab, &url)?;
            tab.wait_for_element_with_custom_timeout(ur::COMPLEX_READY_SELECTOR, COMPLEX_TIMEOUT)
                .with_context(|| format!("Overview table missing on {}", url))?;
            let html = tab.get_content()?;
            Ok(ur::parse_complex_table(&url, &html))
        })
        .await
    }

    async fn extract_complex_name(&self, url: &str) -> Result<String> {
        let url = url.to_string();
        self.on_detail(move |tab| {
            open(tab, &url)?;
            tab.wait_for_element_with_custom_timeout(ur::COMPLEX_HEADING_SELECTOR, HEADING_TIMEOUT)
                .with_context(|| format!("Heading missing on {}", url))?;
            let html = tab.get_content()?;
            ur::parse_complex_name(&html).with_context(|| format!("No complex name on {}", url))
        })
        .await
    }

    async fn check_vacancy(&self, url: &str) -> Result<Vacancy> {
        let url = url.to_string();
        self.on_detail(move |tab| {
            open(tab, &url)?;
            // Room rows load lazily once the list scrolls into view
            tab.evaluate("window.scrollBy(0, 500)", false)?;
            let selector = ur::VACANCY_READY_SELECTOR;
            if let Err(e) = tab.wait_for_element_with_custom_timeout(selector, VACANCY_TIMEOUT) {
                debug!("Vacancy markers not rendered on {}: {}", url, e);
            }
            std::thread::sleep(MAP_SETTLE);
            let html = tab.get_content()?;
            Ok(ur::classify_vacancy(&html))
        })
        .await
    }
}
