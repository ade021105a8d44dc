//! Repository for persisted run summaries

use std::sync::Arc;

use sqlx::{Row, SqlitePool};

use crate::domain::errors::SyncResult;
use crate::domain::events::{RunReport, RunStatus, StageOutcome};

#[derive(Clone)]
pub struct SyncRunRepository {
    pool: Arc<SqlitePool>,
}

impl SyncRunRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool: Arc::new(pool) }
    }

    pub async fn insert(&self, report: &RunReport) -> SyncResult<()> {
        let stage_reports =
            serde_json::to_string(&report.stages).unwrap_or_else(|_| "[]".to_string());
        sqlx::query(
            r#"
            INSERT INTO sync_runs (id, status, started_at, finished_at, stage_reports, error)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&report.run_id)
        .bind(report.status.as_str())
        .bind(report.started_at)
        .bind(report.finished_at)
        .bind(stage_reports)
        .bind(&report.error)
        .execute(&*self.pool)
        .await?;
        Ok(())
    }

    /// Most recent runs, newest first.
    pub async fn recent(&self, limit: i64) -> SyncResult<Vec<RunReport>> {
        let rows = sqlx::query(
            r#"
            SELECT id, status, started_at, finished_at, stage_reports, error
            FROM sync_runs ORDER BY started_at DESC LIMIT ?
            "#,
        )
        .bind(limit)
        .fetch_all(&*self.pool)
        .await?;

        let reports = rows
            .into_iter()
            .map(|row| {
                let stages: Vec<StageOutcome> =
                    serde_json::from_str(row.get::<String, _>("stage_reports").as_str())
                        .unwrap_or_default();
                RunReport {
                    run_id: row.get("id"),
                    status: RunStatus::parse(row.get::<String, _>("status").as_str()),
                    started_at: row.get("started_at"),
                    finished_at: row.get("finished_at"),
                    stages,
                    error: row.get("error"),
                }
            })
            .collect();
        Ok(reports)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::domain::events::{StageName, StageReport};
    use crate::test_support::test_database;

    #[tokio::test]
    async fn run_report_round_trips() {
        let (_dir, db) = test_database().await;
        let repo = SyncRunRepository::new(db.pool().clone());
        let now = Utc::now();
        let report = RunReport {
            run_id: "run-1".into(),
            status: RunStatus::Completed,
            started_at: now,
            finished_at: now,
            stages: vec![StageOutcome {
                stage: StageName::CategoryTag,
                report: StageReport { created: 3, updated: 1, skipped: 0, deleted: 0 },
            }],
            error: None,
        };

        repo.insert(&report).await.unwrap();
        let recent = repo.recent(10).await.unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].status, RunStatus::Completed);
        assert_eq!(recent[0].stages[0].report.created, 3);
    }
}
