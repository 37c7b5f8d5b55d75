//! Job registry operations.

use std::collections::HashMap;

use rusqlite::{Row, params};

use cronbot_types::Job;

use crate::{CronDb, Result, StoreError};

fn job_from_row(row: &Row) -> rusqlite::Result<Job> {
    let name: String = row.get(0)?;
    let command: String = row.get(1)?;
    let env: String = row.get(2)?;
    Ok(Job {
        name,
        command: serde_json::from_str(&command).unwrap_or_default(),
        env: serde_json::from_str(&env).unwrap_or_default(),
    })
}

impl CronDb {
    /// Register a new job. The name must be unused and the command non-empty.
    pub fn create_job(
        &self,
        name: &str,
        command: Vec<String>,
        env: HashMap<String, String>,
    ) -> Result<Job> {
        if command.is_empty() {
            return Err(StoreError::InvalidArgument("job command is empty".into()));
        }

        let exists: bool = self.conn().query_row(
            "SELECT EXISTS(SELECT 1 FROM jobs WHERE name = ?1)",
            params![name],
            |row| row.get(0),
        )?;
        if exists {
            return Err(StoreError::AlreadyExists(name.to_string()));
        }

        let job = Job {
            name: name.to_string(),
            command,
            env,
        };
        self.conn().execute(
            "INSERT INTO jobs (name, command, env) VALUES (?1, ?2, ?3)",
            params![
                job.name,
                serde_json::to_string(&job.command)?,
                serde_json::to_string(&job.env)?,
            ],
        )?;
        Ok(job)
    }

    /// Look up a job by name.
    pub fn get_job(&self, name: &str) -> Result<Job> {
        match self.conn().query_row(
            "SELECT name, command, env FROM jobs WHERE name = ?1",
            params![name],
            job_from_row,
        ) {
            Ok(job) => Ok(job),
            Err(rusqlite::Error::QueryReturnedNoRows) => {
                Err(StoreError::JobNotFound(name.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// List all registered jobs.
    pub fn list_jobs(&self) -> Result<Vec<Job>> {
        let mut stmt = self
            .conn()
            .prepare("SELECT name, command, env FROM jobs")?;
        let jobs = stmt
            .query_map([], job_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(jobs)
    }

    /// Set one environment variable on a job. Key and value must be
    /// non-blank after trimming.
    pub fn set_job_env(&self, name: &str, key: &str, value: &str) -> Result<Job> {
        let key = key.trim();
        let value = value.trim();
        if key.is_empty() || value.is_empty() {
            return Err(StoreError::InvalidArgument(
                "the key or value is blank".into(),
            ));
        }

        let mut job = self.get_job(name)?;
        job.env.insert(key.to_string(), value.to_string());
        self.conn().execute(
            "UPDATE jobs SET env = ?1 WHERE name = ?2",
            params![serde_json::to_string(&job.env)?, name],
        )?;
        Ok(job)
    }

    /// Delete a job by name. Deleting an absent job is an error, not a no-op.
    pub fn delete_job(&self, name: &str) -> Result<()> {
        let count = self
            .conn()
            .execute("DELETE FROM jobs WHERE name = ?1", params![name])?;
        if count == 0 {
            return Err(StoreError::JobNotFound(name.to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ping_cmd() -> Vec<String> {
        vec!["echo".into(), "ok".into()]
    }

    #[test]
    fn test_create_and_get_job() {
        let db = CronDb::open_in_memory().unwrap();
        let created = db.create_job("ping", ping_cmd(), HashMap::new()).unwrap();
        let loaded = db.get_job("ping").unwrap();
        assert_eq!(created, loaded);
        assert_eq!(loaded.command, ping_cmd());
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let db = CronDb::open_in_memory().unwrap();
        db.create_job("ping", ping_cmd(), HashMap::new()).unwrap();
        let err = db
            .create_job("ping", vec!["true".into()], HashMap::new())
            .unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists(_)));
    }

    #[test]
    fn test_empty_command_rejected() {
        let db = CronDb::open_in_memory().unwrap();
        let err = db.create_job("ping", vec![], HashMap::new()).unwrap_err();
        assert!(matches!(err, StoreError::InvalidArgument(_)));
    }

    #[test]
    fn test_get_missing_job() {
        let db = CronDb::open_in_memory().unwrap();
        assert!(matches!(
            db.get_job("nope"),
            Err(StoreError::JobNotFound(_))
        ));
    }

    #[test]
    fn test_set_env_persists() {
        let db = CronDb::open_in_memory().unwrap();
        db.create_job("ping", ping_cmd(), HashMap::new()).unwrap();
        let job = db.set_job_env("ping", " token ", "abc").unwrap();
        assert_eq!(job.env.get("token").map(String::as_str), Some("abc"));

        let loaded = db.get_job("ping").unwrap();
        assert_eq!(loaded.env.get("token").map(String::as_str), Some("abc"));
    }

    #[test]
    fn test_set_env_rejects_blank() {
        let db = CronDb::open_in_memory().unwrap();
        db.create_job("ping", ping_cmd(), HashMap::new()).unwrap();
        assert!(matches!(
            db.set_job_env("ping", "  ", "abc"),
            Err(StoreError::InvalidArgument(_))
        ));
        assert!(matches!(
            db.set_job_env("ping", "key", " "),
            Err(StoreError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_delete_job_not_idempotent() {
        let db = CronDb::open_in_memory().unwrap();
        db.create_job("ping", ping_cmd(), HashMap::new()).unwrap();
        db.delete_job("ping").unwrap();
        assert!(matches!(
            db.delete_job("ping"),
            Err(StoreError::JobNotFound(_))
        ));
    }

    #[test]
    fn test_list_jobs() {
        let db = CronDb::open_in_memory().unwrap();
        assert!(db.list_jobs().unwrap().is_empty());
        db.create_job("a", ping_cmd(), HashMap::new()).unwrap();
        db.create_job("b", ping_cmd(), HashMap::new()).unwrap();
        assert_eq!(db.list_jobs().unwrap().len(), 2);
    }
}
