//! Orchestration loop
//!
//! Drives the end-to-end pass: skip filter, selector switch, settle delay,
//! probe with one retry, and accumulation of name → annotation results.

use crate::check::{CheckOutcome, IpChecker, ERROR_DISPLAY};
use crate::clash::ClashController;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

/// Annotation recorded when the selector switch itself fails
pub const SWITCH_ERROR_DISPLAY: &str = "【❌ Switch Error】";

/// Settle delay after a switch and between probe attempts
const SETTLE_DELAY: Duration = Duration::from_secs(2);

/// Probe attempts per node
const MAX_ATTEMPTS: usize = 2;

/// Name fragments marking informational/status nodes (traffic banners,
/// expiry notices, announcements) that are never real egress proxies
pub const SKIP_KEYWORDS: &[&str] = &[
    "剩余", "重置", "到期", "有效期", "官网", "网址", "更新", "公告",
];

/// Whether a node name marks a status node that must never be probed
pub fn should_skip(name: &str) -> bool {
    SKIP_KEYWORDS.iter().any(|kw| name.contains(kw))
}

/// Annotation recorded for a node once its retries are exhausted
///
/// A reading whose cleanliness score stayed unknown gets the fixed error
/// marker rather than a partial composite.
fn final_display(outcome: &CheckOutcome) -> String {
    if outcome.score_known() {
        outcome.display_string()
    } else {
        ERROR_DISPLAY.to_string()
    }
}

/// Sequential per-node switch+probe driver
pub struct Runner {
    controller: ClashController,
    checker: IpChecker,
    selector: String,
    page_url: String,
    cancel: Arc<AtomicBool>,
}

impl Runner {
    /// `cancel` is the cooperative interrupt flag shared with the signal
    /// handler; it is checked between node iterations only, so an in-flight
    /// probe always finishes
    pub fn new(
        controller: ClashController,
        checker: IpChecker,
        selector: String,
        page_url: String,
        cancel: Arc<AtomicBool>,
    ) -> Self {
        Self {
            controller,
            checker,
            selector,
            page_url,
            cancel,
        }
    }

    /// Run the full pass and return the accumulated name → annotation map
    ///
    /// An interrupt stops the loop early but whatever has been accumulated is
    /// still returned for saving.
    pub async fn run(&mut self, names: &[String]) -> HashMap<String, String> {
        let mut results = HashMap::new();
        let total = names.len();

        for (i, name) in names.iter().enumerate() {
            if self.cancel.load(Ordering::SeqCst) {
                println!("\nStopping at node {}/{}; saving progress.", i + 1, total);
                break;
            }
            if should_skip(name) {
                println!("\n[{}/{}] Skipping (Status Node): {}", i + 1, total, name);
                continue;
            }

            println!("\n[{}/{}] Testing: {}", i + 1, total, name);
            let display = self.test_node(name).await;
            results.insert(name.clone(), display);
        }

        results
    }

    /// Switch the selector to a node, settle, probe with one retry, and
    /// return the display string to record for it
    async fn test_node(&mut self, name: &str) -> String {
        println!("  -> Switching {} ...", self.selector);
        if !self.controller.switch_proxy(&self.selector, name).await {
            println!("  -> Switch failed, skipping IP check.");
            return SWITCH_ERROR_DISPLAY.to_string();
        }

        // Let the daemon's routing table take effect before probing
        sleep(SETTLE_DELAY).await;

        println!("  -> Running IP Check...");
        let mut outcome = CheckOutcome::Failed("no probe attempt completed".to_string());
        for attempt in 0..MAX_ATTEMPTS {
            outcome = self.checker.check(&self.page_url).await;
            if let CheckOutcome::Failed(msg) = &outcome {
                println!("     Check error: {}", msg);
            }
            if outcome.score_known() {
                break;
            }
            if attempt + 1 < MAX_ATTEMPTS {
                println!("     Retrying IP check...");
                sleep(SETTLE_DELAY).await;
            }
        }

        let display = final_display(&outcome);
        println!("  -> Result: {}", display);
        if let Some(report) = outcome.report() {
            println!(
                "  -> Details: IP: {} | Score: {} | Bot: {}",
                report.ip, report.pure_score, report.bot_score
            );
        }
        display
    }

    /// Release the browser session
    pub fn shutdown(&mut self) {
        self.checker.stop();
    }
}
