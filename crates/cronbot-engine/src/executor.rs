//! Job executor — spawns a job's command, captures its output and renders
//! the report for the task's output mode.

use tokio::process::Command;

use cronbot_types::{ExecutionReport, Job, OutputMode};

/// Run a job to completion and produce its report.
///
/// Blocks until the subprocess exits; there is no timeout. Job env entries
/// are layered on top of the ambient process environment with upper-cased
/// names. A spawn failure or non-zero exit is a failed report, never an
/// error to the caller.
pub async fn run_job(job: &Job, mode: OutputMode) -> ExecutionReport {
    if job.command.is_empty() {
        // Guarded upstream by job registration; kept as a failed report.
        return render(job, false, Some("job has no command".into()), "", mode);
    }

    let result = Command::new(&job.command[0])
        .args(&job.command[1..])
        .envs(job.env_overlay())
        .output()
        .await;

    let (succeeded, failure, combined) = match result {
        Ok(output) => {
            let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
            combined.push_str(&String::from_utf8_lossy(&output.stderr));
            if output.status.success() {
                (true, None, combined)
            } else {
                (false, Some(output.status.to_string()), combined)
            }
        }
        Err(e) => (false, Some(format!("spawn failed: {e}")), String::new()),
    };

    render(job, succeeded, failure, &combined, mode)
}

fn render(
    job: &Job,
    succeeded: bool,
    failure: Option<String>,
    combined: &str,
    mode: OutputMode,
) -> ExecutionReport {
    // A failure must never be silent.
    let mode = if !succeeded && mode == OutputMode::None {
        OutputMode::LastLine
    } else {
        mode
    };

    let message = match mode {
        OutputMode::None => None,
        _ => {
            let mut msg = String::from(if succeeded { "✅ " } else { "❌ " });

            if matches!(mode, OutputMode::Result | OutputMode::Full) {
                match &failure {
                    Some(err) => msg.push_str(&format!("Job '{}' failed: {err}", job.name)),
                    None => msg.push_str(&format!("Job '{}' completed", job.name)),
                }
            }

            if mode == OutputMode::Full {
                msg.push_str(&format!("\n\n{combined}"));
            }

            if mode == OutputMode::LastLine {
                if let Some(line) = last_non_blank_line(combined) {
                    msg.push_str(line);
                }
            }

            Some(msg)
        }
    };

    ExecutionReport {
        job_name: job.name.clone(),
        succeeded,
        message,
    }
}

/// Last non-blank line of the captured output, scanning from the end.
fn last_non_blank_line(out: &str) -> Option<&str> {
    out.lines().rev().find(|line| !line.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn job(command: &[&str]) -> Job {
        Job {
            name: "test".into(),
            command: command.iter().map(|s| s.to_string()).collect(),
            env: HashMap::new(),
        }
    }

    #[test]
    fn test_last_non_blank_line() {
        assert_eq!(last_non_blank_line("a\nb\n\n"), Some("b"));
        assert_eq!(last_non_blank_line("only"), Some("only"));
        assert_eq!(last_non_blank_line("\n  \n\n"), None);
        assert_eq!(last_non_blank_line(""), None);
    }

    #[tokio::test]
    async fn test_success_full_output() {
        let report = run_job(&job(&["echo", "ok"]), OutputMode::Full).await;
        assert!(report.succeeded);
        let msg = report.message.unwrap();
        assert!(msg.starts_with("✅ "));
        assert!(msg.contains("Job 'test' completed"));
        assert!(msg.contains("ok"));
    }

    #[tokio::test]
    async fn test_nonzero_exit_is_failed_report() {
        let report = run_job(&job(&["false"]), OutputMode::Result).await;
        assert!(!report.succeeded);
        let msg = report.message.unwrap();
        assert!(msg.starts_with("❌ "));
        assert!(msg.contains("Job 'test' failed"));
    }

    #[tokio::test]
    async fn test_spawn_failure_is_failed_report() {
        let report = run_job(&job(&["/no/such/binary"]), OutputMode::Result).await;
        assert!(!report.succeeded);
        assert!(report.message.unwrap().contains("spawn failed"));
    }

    #[tokio::test]
    async fn test_none_mode_silent_on_success() {
        let report = run_job(&job(&["echo", "ok"]), OutputMode::None).await;
        assert!(report.succeeded);
        assert!(report.message.is_none());
    }

    #[tokio::test]
    async fn test_none_mode_escalates_on_failure() {
        let report = run_job(&job(&["sh", "-c", "echo boom; exit 1"]), OutputMode::None).await;
        assert!(!report.succeeded);
        let msg = report.message.unwrap();
        assert!(msg.starts_with("❌ "));
        assert!(msg.ends_with("boom"));
    }

    #[tokio::test]
    async fn test_last_line_mode() {
        let report = run_job(
            &job(&["sh", "-c", "printf 'a\\nb\\n\\n'"]),
            OutputMode::LastLine,
        )
        .await;
        assert!(report.succeeded);
        assert_eq!(report.message.unwrap(), "✅ b");
    }

    #[tokio::test]
    async fn test_last_line_mode_blank_output() {
        let report = run_job(&job(&["true"]), OutputMode::LastLine).await;
        assert!(report.succeeded);
        assert_eq!(report.message.unwrap(), "✅ ");
    }

    #[tokio::test]
    async fn test_env_overlay_reaches_subprocess() {
        let mut j = job(&["sh", "-c", "echo $GREETING"]);
        j.env.insert("greeting".into(), "hello".into());
        let report = run_job(&j, OutputMode::LastLine).await;
        assert_eq!(report.message.unwrap(), "✅ hello");
    }

    #[tokio::test]
    async fn test_stderr_is_captured() {
        let report = run_job(&job(&["sh", "-c", "echo oops >&2"]), OutputMode::Full).await;
        assert!(report.succeeded);
        assert!(report.message.unwrap().contains("oops"));
    }
}
