use anyhow::{bail, Result};
use chrono::Utc;
use rusqlite::{params, OptionalExtension};

use crate::{
    db::{helpers::to_u32, Database},
    store::ParentSettings,
};

impl Database {
    /// Stored parent ratio, or the 30/15 default when none was saved yet.
    pub async fn load_parent_settings(&self) -> Result<ParentSettings> {
        self.execute(|conn| {
            let row: Option<(i64, i64)> = conn
                .query_row(
                    "SELECT study_minutes_per_phase, break_minutes_per_phase
                     FROM parent_settings WHERE id = 1",
                    [],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?;

            match row {
                Some((study, brk)) => Ok(ParentSettings {
                    study_minutes_per_phase: to_u32(study, "study_minutes_per_phase")?,
                    break_minutes_per_phase: to_u32(brk, "break_minutes_per_phase")?,
                }),
                None => Ok(ParentSettings::default()),
            }
        })
        .await
    }

    pub async fn save_parent_settings(&self, settings: ParentSettings) -> Result<()> {
        if settings.study_minutes_per_phase == 0 || settings.break_minutes_per_phase == 0 {
            bail!("phase lengths must be positive");
        }

        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO parent_settings (id, study_minutes_per_phase, break_minutes_per_phase, updated_at)
                 VALUES (1, ?1, ?2, ?3)
                 ON CONFLICT(id) DO UPDATE SET
                     study_minutes_per_phase = excluded.study_minutes_per_phase,
                     break_minutes_per_phase = excluded.break_minutes_per_phase,
                     updated_at = excluded.updated_at",
                params![
                    settings.study_minutes_per_phase,
                    settings.break_minutes_per_phase,
                    Utc::now().to_rfc3339(),
                ],
            )?;
            Ok(())
        })
        .await
    }
}
