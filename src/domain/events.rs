//! Stage and run reporting
//!
//! Each pipeline stage reports created/updated/skipped/deleted counters; the
//! orchestrator aggregates them into a run report that is persisted once per
//! pipeline pass.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Ordered stages of the sync pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StageName {
    CategoryTag,
    VendorIdentity,
    Product,
    VariantOffer,
    VendorLink,
    Blog,
}

impl StageName {
    pub fn as_str(&self) -> &'static str {
        match self {
            StageName::CategoryTag => "category_tag",
            StageName::VendorIdentity => "vendor_identity",
            StageName::Product => "product",
            StageName::VariantOffer => "variant_offer",
            StageName::VendorLink => "vendor_link",
            StageName::Blog => "blog",
        }
    }
}

impl std::fmt::Display for StageName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-stage counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageReport {
    pub created: u32,
    pub updated: u32,
    pub skipped: u32,
    pub deleted: u32,
}

impl StageReport {
    pub fn total(&self) -> u32 {
        self.created + self.updated + self.skipped + self.deleted
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageOutcome {
    pub stage: StageName,
    pub report: StageReport,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunStatus {
    Completed,
    Failed,
    Cancelled,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
            RunStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(value: &str) -> Self {
        match value {
            "completed" => RunStatus::Completed,
            "cancelled" => RunStatus::Cancelled,
            _ => RunStatus::Failed,
        }
    }
}

/// Final result of one pipeline pass, persisted to the `sync_runs` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: String,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub stages: Vec<StageOutcome>,
    pub error: Option<String>,
}

impl RunReport {
    pub fn stage_report(&self, stage: StageName) -> Option<&StageReport> {
        self.stages.iter().find(|s| s.stage == stage).map(|s| &s.report)
    }
}
