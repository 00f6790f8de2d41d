//! Error diagnostics: per-site counters plus a bounded log of recent failures.

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, error};

use crate::domain::AppError;

/// Number of recent occurrences kept in memory
pub const RECENT_ERRORS_CAPACITY: usize = 100;

/// Aggregate statistics for one error site
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorSiteStats {
    pub count: u64,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

/// One recorded failure
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorRecord {
    pub site_id: String,
    pub kind: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<Value>,
    pub date: DateTime<Utc>,
}

/// What `log_error` recorded, returned to the caller
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorReport {
    pub record: ErrorRecord,
    pub stats: ErrorSiteStats,
}

/// Thread-safe error log shared by every service
#[derive(Debug, Default)]
pub struct ErrorLog {
    stats: DashMap<String, ErrorSiteStats>,
    recent: Mutex<VecDeque<ErrorRecord>>,
}

impl ErrorLog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a failure under a stable `site_id` (e.g. "geo.lookup").
    pub fn log_error(&self, site_id: &str, err: &AppError, context: Option<Value>) -> ErrorReport {
        let now = Utc::now();

        let stats = {
            let mut entry = self
                .stats
                .entry(site_id.to_string())
                .or_insert_with(|| ErrorSiteStats {
                    count: 0,
                    first_seen: now,
                    last_seen: now,
                });
            entry.count += 1;
            entry.last_seen = now;
            entry.value().clone()
        };

        let record = ErrorRecord {
            site_id: site_id.to_string(),
            kind: err.kind(),
            message: err.to_string(),
            context,
            date: now,
        };

        error!(
            site_id = %site_id,
            kind = record.kind,
            count = stats.count,
            error = %err,
            "Error recorded"
        );
        if let Some(context) = &record.context {
            debug!(site_id = %site_id, context = %context, "Error context");
        }

        let mut recent = self.recent.lock().unwrap_or_else(PoisonError::into_inner);
        recent.push_back(record.clone());
        while recent.len() > RECENT_ERRORS_CAPACITY {
            recent.pop_front();
        }
        drop(recent);

        ErrorReport { record, stats }
    }

    /// Statistics for one site, if it ever failed
    pub fn site_stats(&self, site_id: &str) -> Option<ErrorSiteStats> {
        self.stats.get(site_id).map(|entry| entry.value().clone())
    }

    /// Most recent failures, oldest first
    pub fn recent_errors(&self) -> Vec<ErrorRecord> {
        self.recent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }

    pub fn total_errors(&self) -> u64 {
        self.stats.iter().map(|entry| entry.value().count).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ExternalServiceError;
    use serde_json::json;

    fn network_error() -> AppError {
        AppError::ExternalService(ExternalServiceError::Network("timeout".to_string()))
    }

    #[test]
    fn test_log_error_counts_per_site() {
        let log = ErrorLog::new();
        log.log_error("rates.primary", &network_error(), None);
        let report = log.log_error("rates.primary", &network_error(), None);
        log.log_error("geo.lookup", &network_error(), Some(json!({"ip": "1.2.3.4"})));

        assert_eq!(report.stats.count, 2);
        assert_eq!(report.record.kind, "external_service");
        assert_eq!(log.site_stats("rates.primary").unwrap().count, 2);
        assert_eq!(log.site_stats("geo.lookup").unwrap().count, 1);
        assert!(log.site_stats("miner").is_none());
        assert_eq!(log.total_errors(), 3);
    }

    #[test]
    fn test_first_seen_is_preserved() {
        let log = ErrorLog::new();
        let first = log.log_error("site", &network_error(), None);
        let second = log.log_error("site", &network_error(), None);
        assert_eq!(first.stats.first_seen, second.stats.first_seen);
        assert!(second.stats.last_seen >= first.stats.last_seen);
    }

    #[test]
    fn test_recent_errors_are_bounded() {
        let log = ErrorLog::new();
        for i in 0..(RECENT_ERRORS_CAPACITY + 25) {
            log.log_error(&format!("site-{i}"), &network_error(), None);
        }

        let recent = log.recent_errors();
        assert_eq!(recent.len(), RECENT_ERRORS_CAPACITY);
        assert_eq!(recent[0].site_id, "site-25");
        assert_eq!(
            recent.last().unwrap().site_id,
            format!("site-{}", RECENT_ERRORS_CAPACITY + 24)
        );
    }

    #[test]
    fn test_context_is_kept_on_record() {
        let log = ErrorLog::new();
        let report = log.log_error("geo.lookup", &network_error(), Some(json!({"ip": "8.8.8.8"})));
        assert_eq!(report.record.context, Some(json!({"ip": "8.8.8.8"})));
        assert!(report.record.message.contains("timeout"));
    }
}
