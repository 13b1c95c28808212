//! Quality check result models

use crate::check::score::{tier_for, UNKNOWN_TIER};

/// Sentinel for fields the probe could not determine
pub const UNKNOWN: &str = "❓";

/// Display string for a probe that failed outright
pub const ERROR_DISPLAY: &str = "【❌ Error】";

/// Placeholder used when neither attribute nor source could be read
const UNKNOWN_INFO: &str = "未知";

/// Structured reputation reading for a single egress IP
///
/// Every field defaults to the ❓ sentinel; extraction fills in whatever the
/// page text yields. A reading is "complete" once both the IP and the
/// cleanliness score are known.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QualityReport {
    /// Egress IP the reading belongs to
    pub ip: String,
    /// Cleanliness score percentage, e.g. "20%"
    pub pure_score: String,
    /// Bot traffic ratio percentage, e.g. "5%"
    pub bot_score: String,
    /// IP attribute line, e.g. "机房"
    pub ip_attr: String,
    /// IP source line, e.g. "广播"
    pub ip_src: String,
}

impl QualityReport {
    /// Create a report with every field unknown except an optional IP
    pub fn unknown_with_ip(ip: Option<String>) -> Self {
        Self {
            ip: ip.unwrap_or_else(|| UNKNOWN.to_string()),
            pure_score: UNKNOWN.to_string(),
            bot_score: UNKNOWN.to_string(),
            ip_attr: UNKNOWN.to_string(),
            ip_src: UNKNOWN.to_string(),
        }
    }

    pub fn ip_known(&self) -> bool {
        self.ip != UNKNOWN
    }

    pub fn score_known(&self) -> bool {
        self.pure_score != UNKNOWN
    }

    /// A complete reading has both an IP and a cleanliness score, and is the
    /// only kind admitted into the probe cache
    pub fn is_complete(&self) -> bool {
        self.ip_known() && self.score_known()
    }

    /// Human-readable summary: two tier glyphs plus `attr|src`
    pub fn display_string(&self) -> String {
        let pure_tier = if self.score_known() {
            tier_for(&self.pure_score)
        } else {
            UNKNOWN_TIER
        };
        let bot_tier = if self.bot_score != UNKNOWN {
            tier_for(&self.bot_score)
        } else {
            UNKNOWN_TIER
        };

        let attr = if self.ip_attr != UNKNOWN { self.ip_attr.as_str() } else { "" };
        let src = if self.ip_src != UNKNOWN { self.ip_src.as_str() } else { "" };
        let mut info = format!("{}|{}", attr, src).trim().to_string();
        if info == "|" || info.is_empty() {
            info = UNKNOWN_INFO.to_string();
        }

        format!("【{}{} {}】", pure_tier, bot_tier, info)
    }
}

/// Outcome of a single probe call
#[derive(Debug, Clone)]
pub enum CheckOutcome {
    /// IP and cleanliness score both known; eligible for caching
    Complete(QualityReport),
    /// Page reached but one or more fields stayed unknown
    Partial(QualityReport),
    /// Navigation or extraction failed outright
    Failed(String),
}

impl CheckOutcome {
    /// Wrap a report in the variant its completeness dictates
    pub fn from_report(report: QualityReport) -> Self {
        if report.is_complete() {
            CheckOutcome::Complete(report)
        } else {
            CheckOutcome::Partial(report)
        }
    }

    pub fn report(&self) -> Option<&QualityReport> {
        match self {
            CheckOutcome::Complete(r) | CheckOutcome::Partial(r) => Some(r),
            CheckOutcome::Failed(_) => None,
        }
    }

    pub fn is_complete(&self) -> bool {
        matches!(self, CheckOutcome::Complete(_))
    }

    /// Whether the cleanliness score was determined; the orchestrator retries
    /// attempts where it was not
    pub fn score_known(&self) -> bool {
        self.report().map_or(false, QualityReport::score_known)
    }

    /// Collapse to the presentation string appended to node names
    pub fn display_string(&self) -> String {
        match self {
            CheckOutcome::Complete(r) | CheckOutcome::Partial(r) => r.display_string(),
            CheckOutcome::Failed(_) => ERROR_DISPLAY.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_string_full_reading() {
        let report = QualityReport {
            ip: "1.2.3.4".to_string(),
            pure_score: "20%".to_string(),
            bot_score: "5%".to_string(),
            ip_attr: "机房".to_string(),
            ip_src: "广播".to_string(),
        };
        assert_eq!(report.display_string(), "【🟢⚪ 机房|广播】");
    }

    #[test]
    fn test_display_string_unknown_info_collapses() {
        let report = QualityReport {
            pure_score: "8%".to_string(),
            bot_score: "12%".to_string(),
            ..QualityReport::unknown_with_ip(Some("1.2.3.4".to_string()))
        };
        assert_eq!(report.display_string(), "【⚪🟢 未知】");
    }

    #[test]
    fn test_display_string_partial_info() {
        let report = QualityReport {
            pure_score: "20%".to_string(),
            ip_attr: "机房".to_string(),
            ..QualityReport::unknown_with_ip(None)
        };
        assert_eq!(report.display_string(), "【🟢❓ 机房|】");
    }

    #[test]
    fn test_failed_outcome_display() {
        let outcome = CheckOutcome::Failed("net::ERR_TIMED_OUT".to_string());
        assert_eq!(outcome.display_string(), ERROR_DISPLAY);
        assert!(!outcome.score_known());
        assert!(outcome.report().is_none());
    }

    #[test]
    fn test_completeness_requires_ip_and_score() {
        let mut report = QualityReport::unknown_with_ip(Some("1.2.3.4".to_string()));
        assert!(!report.is_complete());
        report.pure_score = "30%".to_string();
        assert!(report.is_complete());

        let no_ip = QualityReport {
            pure_score: "30%".to_string(),
            ..QualityReport::unknown_with_ip(None)
        };
        assert!(!no_ip.is_complete());
    }

    #[test]
    fn test_outcome_from_report_tags_by_completeness() {
        let complete = QualityReport {
            pure_score: "30%".to_string(),
            ..QualityReport::unknown_with_ip(Some("1.2.3.4".to_string()))
        };
        assert!(CheckOutcome::from_report(complete).is_complete());

        let partial = QualityReport::unknown_with_ip(None);
        assert!(matches!(
            CheckOutcome::from_report(partial),
            CheckOutcome::Partial(_)
        ));
    }
}
