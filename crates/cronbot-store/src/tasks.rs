//! Task store operations.

use chrono::{DateTime, Utc};
use rusqlite::{Row, params};

use cronbot_types::{OutputMode, Schedule, Task};

use crate::{CronDb, Result, StoreError, schedule};

fn task_from_row(row: &Row) -> rusqlite::Result<Task> {
    let id: i64 = row.get(0)?;
    let job_name: String = row.get(1)?;
    let cron: Option<String> = row.get(2)?;
    let next_fire: String = row.get(3)?;
    let paused: bool = row.get::<_, i64>(4)? != 0;
    let output: String = row.get(5)?;

    let next_fire: DateTime<Utc> = next_fire.parse().unwrap_or_else(|_| Utc::now());
    let schedule = match cron {
        Some(expr) => Schedule::Cron { expr, next_fire },
        None => Schedule::Once {
            fire_at: next_fire,
        },
    };

    Ok(Task {
        id,
        job_name,
        schedule,
        paused,
        output: OutputMode::parse(&output).unwrap_or_default(),
    })
}

const TASK_COLUMNS: &str = "id, job_name, cron, next_fire, paused, output";

impl CronDb {
    /// Create a one-shot task firing at a fixed instant.
    pub fn create_once(
        &self,
        job_name: &str,
        fire_at: DateTime<Utc>,
        output: OutputMode,
    ) -> Result<Task> {
        self.insert_task(job_name, None, fire_at, output)
    }

    /// Create a cron-recurring task. The initial fire time is computed here;
    /// an expression with no future occurrence is rejected outright.
    pub fn create_cron(
        &self,
        job_name: &str,
        expr: &str,
        timezone: Option<&str>,
        output: OutputMode,
    ) -> Result<Task> {
        let next = schedule::next_fire(expr, Utc::now(), timezone)?;
        self.insert_task(job_name, Some(expr), next, output)
    }

    fn insert_task(
        &self,
        job_name: &str,
        cron: Option<&str>,
        next_fire: DateTime<Utc>,
        output: OutputMode,
    ) -> Result<Task> {
        self.conn().execute(
            "INSERT INTO tasks (job_name, cron, next_fire, paused, output)
             VALUES (?1, ?2, ?3, 0, ?4)",
            params![job_name, cron, next_fire.to_rfc3339(), output.as_str()],
        )?;
        let id = self.conn().last_insert_rowid();
        tracing::info!(task = id, job = job_name, "Task scheduled for {next_fire}");
        self.get_task(id)
    }

    /// Look up a task by id.
    pub fn get_task(&self, id: i64) -> Result<Task> {
        match self.conn().query_row(
            &format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?1"),
            params![id],
            task_from_row,
        ) {
            Ok(task) => Ok(task),
            Err(rusqlite::Error::QueryReturnedNoRows) => Err(StoreError::TaskNotFound(id)),
            Err(e) => Err(e.into()),
        }
    }

    /// Snapshot of all tasks at call time.
    pub fn list_tasks(&self) -> Result<Vec<Task>> {
        let mut stmt = self
            .conn()
            .prepare(&format!("SELECT {TASK_COLUMNS} FROM tasks ORDER BY id"))?;
        let tasks = stmt
            .query_map([], task_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(tasks)
    }

    /// Delete a task by id.
    pub fn delete_task(&self, id: i64) -> Result<()> {
        let count = self
            .conn()
            .execute("DELETE FROM tasks WHERE id = ?1", params![id])?;
        if count == 0 {
            return Err(StoreError::TaskNotFound(id));
        }
        tracing::info!(task = id, "Task unscheduled");
        Ok(())
    }

    /// Pause or resume a task. Does not touch the fire time.
    pub fn set_paused(&self, id: i64, paused: bool) -> Result<()> {
        let count = self.conn().execute(
            "UPDATE tasks SET paused = ?1 WHERE id = ?2",
            params![paused as i64, id],
        )?;
        if count == 0 {
            return Err(StoreError::TaskNotFound(id));
        }
        Ok(())
    }

    /// Change a task's output mode.
    pub fn set_output(&self, id: i64, output: OutputMode) -> Result<()> {
        let count = self.conn().execute(
            "UPDATE tasks SET output = ?1 WHERE id = ?2",
            params![output.as_str(), id],
        )?;
        if count == 0 {
            return Err(StoreError::TaskNotFound(id));
        }
        Ok(())
    }

    /// Recompute a cron task's next fire time from the current instant.
    ///
    /// Returns `false` without touching anything for a one-shot task.
    pub fn reschedule(&self, id: i64, timezone: Option<&str>) -> Result<bool> {
        let task = self.get_task(id)?;
        let Some(expr) = task.schedule.cron_expr() else {
            return Ok(false);
        };

        let next = schedule::next_fire(expr, Utc::now(), timezone)?;
        self.conn().execute(
            "UPDATE tasks SET next_fire = ?1 WHERE id = ?2",
            params![next.to_rfc3339(), id],
        )?;
        tracing::info!(task = id, "Task rescheduled for {next}");
        Ok(true)
    }
}
