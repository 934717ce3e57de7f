use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::params;

use crate::db::Database;

impl Database {
    pub async fn insert_break_credit(&self, minutes: u32, credited_at: DateTime<Utc>) -> Result<()> {
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO break_credits (minutes, credited_at) VALUES (?1, ?2)",
                params![minutes, credited_at.to_rfc3339()],
            )
            .context("failed to insert break credit")?;
            Ok(())
        })
        .await
    }

    /// Break minutes earned across all properly completed sessions.
    pub async fn total_break_credit(&self) -> Result<u64> {
        self.execute(|conn| {
            let total: i64 = conn.query_row(
                "SELECT COALESCE(SUM(minutes), 0) FROM break_credits",
                [],
                |row| row.get(0),
            )?;
            Ok(total.max(0) as u64)
        })
        .await
    }
}
