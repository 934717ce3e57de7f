use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::{params, Row};

use crate::{
    db::{
        helpers::{parse_datetime, parse_outcome, to_u32, to_usize},
        Database,
    },
    plan::SessionPlan,
    recorder::SessionRecord,
};

const SELECT_COLUMNS: &str = "id, status, total_planned_minutes, total_study_minutes, total_break_minutes,
     actual_study_minutes, actual_break_minutes, plan_json, total_phases, completed_phases,
     completion_percentage, properly_completed, abnormal, started_at, ended_at";

fn row_to_record(row: &Row) -> Result<SessionRecord> {
    let status: String = row.get("status")?;
    let plan_json: String = row.get("plan_json")?;
    let started_at: String = row.get("started_at")?;
    let ended_at: String = row.get("ended_at")?;
    let plan: SessionPlan =
        serde_json::from_str(&plan_json).context("failed to parse stored plan")?;

    Ok(SessionRecord {
        id: row.get("id")?,
        status: parse_outcome(&status)?,
        total_planned_minutes: to_u32(row.get("total_planned_minutes")?, "total_planned_minutes")?,
        total_study_minutes: to_u32(row.get("total_study_minutes")?, "total_study_minutes")?,
        total_break_minutes: to_u32(row.get("total_break_minutes")?, "total_break_minutes")?,
        actual_study_minutes: to_u32(row.get("actual_study_minutes")?, "actual_study_minutes")?,
        actual_break_minutes: to_u32(row.get("actual_break_minutes")?, "actual_break_minutes")?,
        plan,
        total_phases: to_usize(row.get("total_phases")?, "total_phases")?,
        completed_phases: to_usize(row.get("completed_phases")?, "completed_phases")?,
        completion_percentage: to_u32(row.get("completion_percentage")?, "completion_percentage")?,
        properly_completed: row.get("properly_completed")?,
        abnormal: row.get("abnormal")?,
        started_at: parse_datetime(&started_at, "started_at")?,
        ended_at: parse_datetime(&ended_at, "ended_at")?,
    })
}

impl Database {
    /// Insert a finished session. Returns `false` when a record with the same
    /// id already exists; the stored row is left untouched.
    pub async fn insert_focus_session(&self, record: &SessionRecord) -> Result<bool> {
        let record = record.clone();
        self.execute(move |conn| {
            let plan_json = serde_json::to_string(&record.plan)?;
            let inserted = conn
                .execute(
                    "INSERT INTO focus_sessions (
                        id, status, total_planned_minutes, total_study_minutes, total_break_minutes,
                        actual_study_minutes, actual_break_minutes, plan_json, total_phases,
                        completed_phases, completion_percentage, properly_completed, abnormal,
                        started_at, ended_at, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)
                     ON CONFLICT(id) DO NOTHING",
                    params![
                        record.id,
                        record.status.as_str(),
                        record.total_planned_minutes,
                        record.total_study_minutes,
                        record.total_break_minutes,
                        record.actual_study_minutes,
                        record.actual_break_minutes,
                        plan_json,
                        record.total_phases as i64,
                        record.completed_phases as i64,
                        record.completion_percentage,
                        record.properly_completed,
                        record.abnormal,
                        record.started_at.to_rfc3339(),
                        record.ended_at.to_rfc3339(),
                        Utc::now().to_rfc3339(),
                    ],
                )
                .with_context(|| format!("failed to insert focus session {}", record.id))?;
            Ok(inserted == 1)
        })
        .await
    }

    pub async fn get_focus_session(&self, session_id: &str) -> Result<Option<SessionRecord>> {
        let session_id = session_id.to_string();
        self.execute(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {SELECT_COLUMNS} FROM focus_sessions WHERE id = ?1"
            ))?;

            let mut rows = stmt.query(params![session_id])?;
            let record = match rows.next()? {
                Some(row) => Some(row_to_record(row)?),
                None => None,
            };
            Ok(record)
        })
        .await
    }

    /// Most recent sessions first.
    pub async fn list_focus_sessions(&self, limit: usize) -> Result<Vec<SessionRecord>> {
        self.execute(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {SELECT_COLUMNS} FROM focus_sessions
                 ORDER BY started_at DESC
                 LIMIT ?1"
            ))?;

            let mut rows = stmt.query(params![limit as i64])?;
            let mut records = Vec::new();
            while let Some(row) = rows.next()? {
                records.push(row_to_record(row)?);
            }
            Ok(records)
        })
        .await
    }
}
