//! Operator command parsing and dispatch.
//!
//! Every command resolves to a single reply string; malformed input yields a
//! usage reply, never an error to the polling loop.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;

use cronbot_engine::Scheduler;
use cronbot_store::StoreError;
use cronbot_types::OutputMode;

const HELP: &str = "Welcome! Help:\n\n\
*Jobs*\n\
_Jobs are commands that can be run_\n\
/jobs - Get all jobs\n\
/newjob - Create a new job\n\
/deljob - Remove a job\n\
/run - Manually run a job\n\
/set - Set a job environment variable\n\
/get - Get a job environment variable\n\n\
*Tasks*\n\
_Tasks are scheduled jobs_\n\
/tasks - Get all tasks\n\
/newtask - Create a new task\n\
/deltask - Remove a task\n\
/pause - Temporarily stop a task\n\
/resume - Start a paused task\n\
/setoutput - Set the verbosity of a task";

/// Dispatch one operator command and produce the reply text.
pub async fn dispatch(scheduler: &Scheduler, text: &str) -> String {
    let text = text.trim();
    let (command, payload) = match text.split_once(char::is_whitespace) {
        Some((command, payload)) => (command, payload.trim()),
        None => (text, ""),
    };
    // Group chats address commands as /cmd@botname.
    let command = command.split('@').next().unwrap_or(command);

    match command {
        "/start" | "/help" => HELP.to_string(),
        "/jobs" => list_jobs(scheduler).await,
        "/newjob" => new_job(scheduler, payload).await,
        "/deljob" => del_job(scheduler, payload).await,
        "/run" => run_now(scheduler, payload).await,
        "/set" => set_env(scheduler, payload).await,
        "/get" => get_env(scheduler, payload).await,
        "/tasks" => list_tasks(scheduler).await,
        "/newtask" => new_task(scheduler, payload).await,
        "/deltask" => del_task(scheduler, payload).await,
        "/pause" => pause(scheduler, payload).await,
        "/resume" => resume(scheduler, payload).await,
        "/setoutput" => set_output(scheduler, payload).await,
        _ => format!("Unknown command {command}. Send /start for help"),
    }
}

async fn list_jobs(scheduler: &Scheduler) -> String {
    let jobs = match scheduler.list_jobs().await {
        Ok(jobs) => jobs,
        Err(e) => return format!("Problem getting jobs: {e}"),
    };

    if jobs.is_empty() {
        return "There are no jobs defined".to_string();
    }

    let mut out = format!("There are {} jobs:", jobs.len());
    for job in &jobs {
        let env: Vec<String> = job
            .env_overlay()
            .into_iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect();
        out.push_str(&format!(
            "\n- {}\n    Cmd: `{:?}`\n    Env: `{}`",
            job.name,
            job.command,
            env.join(",")
        ));
    }
    out
}

async fn new_job(scheduler: &Scheduler, payload: &str) -> String {
    let args: Vec<&str> = payload.split_whitespace().collect();
    if args.len() < 2 {
        return "Usage: /newjob <job name> <command...>".to_string();
    }

    let command: Vec<String> = args[1..].iter().map(|s| s.to_string()).collect();
    match scheduler.create_job(args[0], command).await {
        Ok(job) => format!("New job '{}' created:\n`{:?}`", job.name, job.command),
        Err(e) => format!("Error saving job: {e}"),
    }
}

async fn del_job(scheduler: &Scheduler, payload: &str) -> String {
    let args: Vec<&str> = payload.split_whitespace().collect();
    if args.is_empty() {
        return "Usage: /deljob <job name>".to_string();
    }

    match scheduler.delete_job(args[0]).await {
        Ok(()) => format!("Job '{}' deleted", args[0]),
        Err(e) => format!("Error deleting job: {e}"),
    }
}

async fn run_now(scheduler: &Scheduler, payload: &str) -> String {
    let args: Vec<&str> = payload.split_whitespace().collect();
    if args.is_empty() {
        return "Usage: /run <job name>".to_string();
    }

    match scheduler.run_job_now(args[0]).await {
        Ok(report) => report
            .message
            .unwrap_or_else(|| format!("Job '{}' produced no report", report.job_name)),
        Err(e) => format!("Error finding job: {e}"),
    }
}

async fn set_env(scheduler: &Scheduler, payload: &str) -> String {
    let args: Vec<&str> = payload.split_whitespace().collect();
    if args.len() < 3 {
        return "Usage: /set <job name> <key> <value>".to_string();
    }

    match scheduler.set_job_env(args[0], args[1], args[2]).await {
        Ok(job) => format!(
            "'{}' has been set to '{}' on job '{}'",
            args[1], args[2], job.name
        ),
        Err(StoreError::InvalidArgument(_)) => "The key or value is blank".to_string(),
        Err(e) => format!("Error saving job: {e}"),
    }
}

async fn get_env(scheduler: &Scheduler, payload: &str) -> String {
    let args: Vec<&str> = payload.split_whitespace().collect();
    if args.is_empty() {
        return "Usage: /get <job name> <key?>".to_string();
    }

    let job = match scheduler.get_job(args[0]).await {
        Ok(job) => job,
        Err(e) => return format!("Error finding job: {e}"),
    };

    match args.get(1) {
        None => {
            let mut out = format!(
                "Job '{}' has the following environment variables:\n\n",
                job.name
            );
            for (k, v) in &job.env {
                out.push_str(&format!("- '{k}' = '{v}'\n"));
            }
            out
        }
        Some(key) => match job.env.get(*key) {
            Some(value) => format!("Job '{}' has '{}' set as '{}'", job.name, key, value),
            None => format!("Job '{}' does not have '{}' set", job.name, key),
        },
    }
}

async fn list_tasks(scheduler: &Scheduler) -> String {
    let tasks = match scheduler.list_tasks().await {
        Ok(tasks) => tasks,
        Err(e) => return format!("Error getting tasks: {e}"),
    };

    if tasks.is_empty() {
        return "There are no tasks scheduled".to_string();
    }

    let mut out = format!("There are {} tasks scheduled:", tasks.len());
    for task in &tasks {
        let state = if task.paused { "PAUSED" } else { "" };
        out.push_str(&format!(
            "\n\n*ID: {}*\n_{}_\nJob: {}\nCron: `{}`\nOutput: {}\nNext Run: {}",
            task.id,
            state,
            task.job_name,
            task.schedule.cron_expr().unwrap_or("-"),
            task.output,
            task.schedule.fire_at().to_rfc2822()
        ));
    }
    out
}

async fn new_task(scheduler: &Scheduler, payload: &str) -> String {
    let args: Vec<&str> = payload.split_whitespace().collect();
    if args.len() < 3 {
        return "Usage: /newtask <job name> once <hhmm> <yyyymmdd: optional>\n\
                /newtask <job name> cron <cron expression>"
            .to_string();
    }

    let result = match args[1] {
        "once" => {
            let fire_at =
                match parse_once_time(args[2], args.get(3).copied(), scheduler.timezone()) {
                    Ok(fire_at) => fire_at,
                    Err(e) => return format!("Error parsing date: {e}"),
                };
            scheduler
                .create_once_task(args[0], fire_at, OutputMode::Full)
                .await
        }
        "cron" => {
            let expr = args[2..].join(" ");
            scheduler
                .create_cron_task(args[0], &expr, OutputMode::Full)
                .await
        }
        _ => return "Whoops! The second argument must be once or cron".to_string(),
    };

    match result {
        Ok(task) => format!(
            "Task {} is scheduled for {}",
            task.id,
            task.schedule.fire_at().to_rfc2822()
        ),
        Err(e) => format!("Could not create task: {e}"),
    }
}

async fn del_task(scheduler: &Scheduler, payload: &str) -> String {
    let id = match parse_task_id(payload, "/deltask <id>") {
        Ok(id) => id,
        Err(reply) => return reply,
    };

    match scheduler.delete_task(id).await {
        Ok(()) => format!("Task {id} deleted"),
        Err(e) => format!("Error deleting task: {e}"),
    }
}

async fn pause(scheduler: &Scheduler, payload: &str) -> String {
    let id = match parse_task_id(payload, "/pause <id>") {
        Ok(id) => id,
        Err(reply) => return reply,
    };

    match scheduler.pause_task(id).await {
        Ok(()) => format!("Task {id} paused"),
        Err(e) => format!("Error pausing task: {e}"),
    }
}

async fn resume(scheduler: &Scheduler, payload: &str) -> String {
    let id = match parse_task_id(payload, "/resume <id>") {
        Ok(id) => id,
        Err(reply) => return reply,
    };

    match scheduler.resume_task(id).await {
        Ok(()) => format!("Task {id} resumed"),
        Err(e) => format!("Error resuming task: {e}"),
    }
}

async fn set_output(scheduler: &Scheduler, payload: &str) -> String {
    let args: Vec<&str> = payload.split_whitespace().collect();
    if args.len() < 2 {
        return "Usage: /setoutput <id> <type>".to_string();
    }

    let id = match parse_task_id(args[0], "/setoutput <id> <type>") {
        Ok(id) => id,
        Err(reply) => return reply,
    };

    let Some(mode) = OutputMode::parse(args[1]) else {
        return "Unknown output type. It can be 'none', 'result', 'last' or 'all'.".to_string();
    };

    match scheduler.set_task_output(id, mode).await {
        Ok(()) => format!("Task {id} output set to {mode}"),
        Err(e) => format!("Error saving task: {e}"),
    }
}

fn parse_task_id(payload: &str, usage: &str) -> Result<i64, String> {
    let arg = payload.split_whitespace().next().unwrap_or("");
    if arg.is_empty() {
        return Err(format!("Usage: {usage}"));
    }
    arg.parse::<i64>()
        .map_err(|e| format!("Error parsing task id: {e}"))
}

/// Interpret `hhmm` (and an optional `yyyymmdd`, defaulting to today) in the
/// configured timezone.
fn parse_once_time(
    raw_time: &str,
    raw_date: Option<&str>,
    timezone: Option<&str>,
) -> Result<DateTime<Utc>, String> {
    let tz: Tz = match timezone {
        Some(name) => name
            .parse()
            .map_err(|_| format!("unknown timezone '{name}'"))?,
        None => chrono_tz::UTC,
    };

    let date = match raw_date {
        Some(date) => date.to_string(),
        None => Utc::now().with_timezone(&tz).format("%Y%m%d").to_string(),
    };

    let naive = NaiveDateTime::parse_from_str(&format!("{raw_time} {date}"), "%H%M %Y%m%d")
        .map_err(|e| e.to_string())?;

    tz.from_local_datetime(&naive)
        .single()
        .map(|t| t.with_timezone(&Utc))
        .ok_or_else(|| "ambiguous local time".to_string())
}
