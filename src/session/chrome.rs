use anyhow::{Context, Result};
use headless_chrome::protocol::cdp::Network::CookieParam;
use headless_chrome::{Browser, LaunchOptions, Tab};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{login_wall_present, BrowserSurface, LoginOutcome};

const USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Headless-Chrome implementation of the browsing surface.
///
/// Works the way the scraped platform expects a human to: navigates,
/// waits for dynamic content, and reads state back out of the captured
/// page HTML instead of poking at live elements more than necessary.
pub struct ChromeSurface {
    // Keeps the Chrome process alive for the tab below.
    #[allow(dead_code)]
    browser: Browser,
    tab: Arc<Tab>,
    base_url: String,
    login_url: String,
}

impl ChromeSurface {
    pub fn new(base_url: &str) -> Result<Self> {
        info!("launching headless Chrome...");

        let options = LaunchOptions::default_builder()
            .headless(true)
            .build()
            .context("Failed to build launch options")?;

        let browser = Browser::new(options).context("Failed to launch Chrome browser")?;
        let tab = browser.new_tab()?;
        tab.set_user_agent(USER_AGENT, None, None)?;

        Ok(Self {
            browser,
            tab,
            base_url: base_url.trim_end_matches('/').to_string(),
            login_url: format!("{}/login", base_url.trim_end_matches('/')),
        })
    }

    fn goto(&self, url: &str) -> Result<()> {
        self.tab.navigate_to(url)?;
        self.tab.wait_until_navigated()?;
        // Feed content arrives after navigation settles.
        thread::sleep(Duration::from_secs(3));
        Ok(())
    }

    fn capture_html(&self) -> Result<String> {
        let result = self
            .tab
            .evaluate("document.documentElement.outerHTML", false)?;
        Ok(result
            .value
            .as_ref()
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .to_string())
    }

    fn checkpoint_present(html: &str) -> bool {
        html.contains("checkpoint")
    }
}

impl BrowserSurface for ChromeSurface {
    fn restore(&mut self, blob: &str) -> Result<bool> {
        let cookies: Vec<CookieParam> =
            serde_json::from_str(blob).context("stored session blob is not a cookie list")?;
        if cookies.is_empty() {
            return Ok(false);
        }
        self.tab.set_cookies(cookies)?;
        debug!("cookies imported, probing session");
        self.probe()
    }

    fn login(&mut self, email: &str, password: &str) -> Result<LoginOutcome> {
        info!("opening login page");
        self.goto(&self.login_url.clone())?;

        self.tab
            .wait_for_element("input[name=\"email\"]")
            .context("login form did not appear")?
            .click()?;
        self.tab.type_str(email)?;

        self.tab
            .find_element("input[name=\"pass\"]")
            .context("password field missing from login form")?
            .click()?;
        self.tab.type_str(password)?;

        self.tab
            .find_element("button[name=\"login\"]")
            .context("login button missing")?
            .click()?;

        // Let the post-login redirect settle before judging the outcome.
        thread::sleep(Duration::from_secs(5));

        let html = self.capture_html()?;
        if Self::checkpoint_present(&html) {
            warn!("security checkpoint encountered during login");
            return Ok(LoginOutcome::Challenged);
        }
        if login_wall_present(&html) {
            warn!("still on the login form after submit");
            return Ok(LoginOutcome::BadCredentials);
        }
        Ok(LoginOutcome::Success)
    }

    fn probe(&mut self) -> Result<bool> {
        self.goto(&self.base_url.clone())?;
        let html = self.capture_html()?;
        Ok(!login_wall_present(&html))
    }

    fn export(&mut self) -> Result<String> {
        let cookies = self.tab.get_cookies()?;
        Ok(serde_json::to_string(&cookies)?)
    }

    fn collect_feed_html(&mut self, url: &str, scroll_budget: u32) -> Result<Vec<String>> {
        // Chronological sorting sidesteps interstitial "highlights" views.
        let feed_url = if url.contains('?') {
            format!("{url}&sorting_setting=CHRONOLOGICAL")
        } else {
            format!("{url}?sorting_setting=CHRONOLOGICAL")
        };

        info!(url = %feed_url, "opening feed");
        self.goto(&feed_url)?;

        let mut snapshots = Vec::with_capacity(scroll_budget as usize + 1);
        snapshots.push(self.capture_html()?);

        for step in 0..scroll_budget {
            self.tab.evaluate("window.scrollBy(0, 1000)", false)?;
            thread::sleep(Duration::from_millis(1500));
            let html = self.capture_html()?;
            debug!(step, bytes = html.len(), "captured feed snapshot");
            snapshots.push(html);
        }

        Ok(snapshots)
    }
}
