//! Health report types. Reports are ephemeral: the latest one is cached
//! and served, older ones are dropped.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CheckName {
    UnbondedTransfers,
    UnsettledBundles,
    LowBonderBalance,
    LowAvailableLiquidity,
    UnsyncedDataSources,
    IncompleteSettlements,
    UnresolvableGaps,
    UnrelayedMessages,
    InvalidBondWithdrawals,
    UncommittedBonds,
    MissedEvents,
}

impl CheckName {
    pub const ALL: [CheckName; 11] = [
        CheckName::UnbondedTransfers,
        CheckName::UnsettledBundles,
        CheckName::LowBonderBalance,
        CheckName::LowAvailableLiquidity,
        CheckName::UnsyncedDataSources,
        CheckName::IncompleteSettlements,
        CheckName::UnresolvableGaps,
        CheckName::UnrelayedMessages,
        CheckName::InvalidBondWithdrawals,
        CheckName::UncommittedBonds,
        CheckName::MissedEvents,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            CheckName::UnbondedTransfers => "unbondedTransfers",
            CheckName::UnsettledBundles => "unsettledBundles",
            CheckName::LowBonderBalance => "lowBonderBalance",
            CheckName::LowAvailableLiquidity => "lowAvailableLiquidity",
            CheckName::UnsyncedDataSources => "unsyncedDataSources",
            CheckName::IncompleteSettlements => "incompleteSettlements",
            CheckName::UnresolvableGaps => "unresolvableGaps",
            CheckName::UnrelayedMessages => "unrelayedMessages",
            CheckName::InvalidBondWithdrawals => "invalidBondWithdrawals",
            CheckName::UncommittedBonds => "uncommittedBonds",
            CheckName::MissedEvents => "missedEvents",
        }
    }
}

impl fmt::Display for CheckName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One offending entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckItem {
    pub subject: String,
    pub detail: String,
}

impl CheckItem {
    pub fn new(subject: impl ToString, detail: impl Into<String>) -> Self {
        Self {
            subject: subject.to_string(),
            detail: detail.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckResult {
    pub check: CheckName,
    pub healthy: bool,
    /// Number of offending items, or the check's own measure.
    pub metric: f64,
    pub items: Vec<CheckItem>,
    /// Set when the data behind the check could not be read.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CheckResult {
    /// Healthy exactly when `items` is empty.
    pub fn from_items(check: CheckName, items: Vec<CheckItem>) -> Self {
        Self {
            check,
            healthy: items.is_empty(),
            metric: items.len() as f64,
            items,
            error: None,
        }
    }

    pub fn failed(check: CheckName, error: impl fmt::Display) -> Self {
        Self {
            check,
            healthy: false,
            metric: 0.0,
            items: Vec::new(),
            error: Some(error.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthCheckReport {
    pub id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub window_days: u64,
    pub results: Vec<CheckResult>,
}

impl HealthCheckReport {
    pub fn new(generated_at: u64, window_days: u64, results: Vec<CheckResult>) -> Self {
        let generated_at = i64::try_from(generated_at)
            .ok()
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
            .unwrap_or_default();
        Self {
            id: Uuid::new_v4(),
            generated_at,
            window_days,
            results,
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.results.iter().all(|r| r.healthy)
    }

    pub fn failing(&self) -> impl Iterator<Item = &CheckResult> {
        self.results.iter().filter(|r| !r.healthy)
    }

    pub fn result(&self, check: CheckName) -> Option<&CheckResult> {
        self.results.iter().find(|r| r.check == check)
    }
}
