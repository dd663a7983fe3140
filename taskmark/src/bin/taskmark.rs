// taskmark: CLI for the taskmark daemon
//
// Every command is one request over the daemon socket. The daemon is started
// on demand, except for `ping` and `shutdown` which only talk to a running one.

use std::io::{self, Read};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use taskmark_lib::config::Config;
use taskmark_lib::daemon::client;
use taskmark_lib::daemon::protocol::{DaemonRequest, DaemonResponse};
use taskmark_lib::workspace::models::format_size;

#[derive(Debug, Parser)]
#[command(name = "taskmark", version, about = "Markdown task directories with one-step file recovery")]
struct Cli {
    /// Print the raw daemon response as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Manage projects
    #[command(subcommand)]
    Project(ProjectCommand),
    /// Manage tasks within a project
    #[command(subcommand)]
    Task(TaskCommand),
    /// Read and edit files within a task
    #[command(subcommand)]
    File(FileCommand),
    /// Inspect or clear preserved snapshots
    #[command(subcommand)]
    Tmp(TmpCommand),
    /// Manage task templates
    #[command(subcommand)]
    Template(TemplateCommand),
    /// Read or write RULES.md at global, project or task level
    #[command(subcommand)]
    Rules(RulesCommand),
    /// Inspect and commit the base directory's git history
    #[command(subcommand)]
    Git(GitCommand),
    /// Case-insensitive search across task files
    Search {
        query: String,
        #[arg(long)]
        project: Option<String>,
    },
    /// Check that the daemon is alive
    Ping,
    /// Stop the daemon
    Shutdown,
}

#[derive(Debug, Subcommand)]
enum ProjectCommand {
    List,
    Create { name: String },
    /// Delete a project with all its tasks and snapshots
    Delete { name: String },
}

#[derive(Debug, Subcommand)]
enum TaskCommand {
    List {
        project: String,
        /// Only tasks whose front matter status matches
        #[arg(long)]
        status: Option<String>,
    },
    Create {
        project: String,
        task: String,
        #[arg(long)]
        template: Option<String>,
        /// Renders {{title}}, {{created_at}} and {{updated_at}} in template files
        #[arg(long)]
        title: Option<String>,
    },
    Delete { project: String, task: String },
    /// Move a task under the project's _archive/ directory
    Archive { project: String, task: String },
    /// Move an archived task back into the project
    Unarchive { project: String, task: String },
    /// List archived tasks with their status
    Archived { project: String },
}

#[derive(Debug, Subcommand)]
enum GitCommand {
    /// Uncommitted changes
    Status,
    /// Stage and commit changes, optionally only one project or task
    Commit {
        #[arg(short, long)]
        message: String,
        #[arg(long)]
        project: Option<String>,
        #[arg(long, requires = "project")]
        task: Option<String>,
    },
}

#[derive(Debug, Args)]
struct FileTarget {
    project: String,
    task: String,
    filename: String,
}

#[derive(Debug, Args)]
struct ContentArg {
    /// File content; read from stdin when omitted
    #[arg(long)]
    content: Option<String>,
}

#[derive(Debug, Subcommand)]
enum FileCommand {
    List { project: String, task: String },
    Get(FileTarget),
    Create {
        #[command(flatten)]
        target: FileTarget,
        #[command(flatten)]
        content: ContentArg,
    },
    /// Overwrite a file, keeping its previous content for one revert
    Update {
        #[command(flatten)]
        target: FileTarget,
        #[command(flatten)]
        content: ContentArg,
    },
    Delete(FileTarget),
    /// Restore the content preserved by the last update or delete
    Revert(FileTarget),
}

#[derive(Debug, Subcommand)]
enum TmpCommand {
    Stats,
    Clear,
}

#[derive(Debug, Subcommand)]
enum TemplateCommand {
    List,
    Create { name: String },
    AddFile {
        template: String,
        filename: String,
        #[command(flatten)]
        content: ContentArg,
    },
}

#[derive(Debug, Subcommand)]
enum RulesCommand {
    Get {
        #[arg(long)]
        project: Option<String>,
        #[arg(long, requires = "project")]
        task: Option<String>,
    },
    Set {
        #[arg(long)]
        project: Option<String>,
        #[arg(long, requires = "project")]
        task: Option<String>,
        #[command(flatten)]
        content: ContentArg,
    },
}

impl ContentArg {
    fn resolve(self) -> Result<String> {
        match self.content {
            Some(content) => Ok(content),
            None => {
                let mut content = String::new();
                io::stdin()
                    .read_to_string(&mut content)
                    .context("Failed to read content from stdin")?;
                Ok(content)
            }
        }
    }
}

fn build_request(command: Command) -> Result<DaemonRequest> {
    let request = match command {
        Command::Project(cmd) => match cmd {
            ProjectCommand::List => DaemonRequest::ListProjects,
            ProjectCommand::Create { name } => DaemonRequest::CreateProject { project: name },
            ProjectCommand::Delete { name } => DaemonRequest::DeleteProject { project: name },
        },
        Command::Task(cmd) => match cmd {
            TaskCommand::List { project, status } => DaemonRequest::ListTasks { project, status },
            TaskCommand::Create {
                project,
                task,
                template,
                title,
            } => DaemonRequest::CreateTask {
                project,
                task,
                template,
                title,
            },
            TaskCommand::Delete { project, task } => DaemonRequest::DeleteTask { project, task },
            TaskCommand::Archive { project, task } => DaemonRequest::ArchiveTask { project, task },
            TaskCommand::Unarchive { project, task } => {
                DaemonRequest::UnarchiveTask { project, task }
            }
            TaskCommand::Archived { project } => DaemonRequest::ListArchivedTasks { project },
        },
        Command::File(cmd) => match cmd {
            FileCommand::List { project, task } => DaemonRequest::ListFiles { project, task },
            FileCommand::Get(t) => DaemonRequest::GetFile {
                project: t.project,
                task: t.task,
                filename: t.filename,
            },
            FileCommand::Create { target, content } => DaemonRequest::CreateFile {
                content: content.resolve()?,
                project: target.project,
                task: target.task,
                filename: target.filename,
            },
            FileCommand::Update { target, content } => DaemonRequest::UpdateFile {
                content: content.resolve()?,
                project: target.project,
                task: target.task,
                filename: target.filename,
            },
            FileCommand::Delete(t) => DaemonRequest::DeleteFile {
                project: t.project,
                task: t.task,
                filename: t.filename,
            },
            FileCommand::Revert(t) => DaemonRequest::RevertFile {
                project: t.project,
                task: t.task,
                filename: t.filename,
            },
        },
        Command::Tmp(TmpCommand::Stats) => DaemonRequest::TmpStats,
        Command::Tmp(TmpCommand::Clear) => DaemonRequest::ClearTmp,
        Command::Template(cmd) => match cmd {
            TemplateCommand::List => DaemonRequest::ListTemplates,
            TemplateCommand::Create { name } => DaemonRequest::CreateTemplate { template: name },
            TemplateCommand::AddFile {
                template,
                filename,
                content,
            } => DaemonRequest::AddTemplateFile {
                template,
                filename,
                content: content.resolve()?,
            },
        },
        Command::Rules(cmd) => match cmd {
            RulesCommand::Get { project, task } => DaemonRequest::GetRules { project, task },
            RulesCommand::Set {
                project,
                task,
                content,
            } => DaemonRequest::SetRules {
                content: content.resolve()?,
                project,
                task,
            },
        },
        Command::Git(GitCommand::Status) => DaemonRequest::GitStatus,
        Command::Git(GitCommand::Commit {
            message,
            project,
            task,
        }) => DaemonRequest::GitCommit {
            message,
            project,
            task,
        },
        Command::Search { query, project } => DaemonRequest::Search { query, project },
        Command::Ping => DaemonRequest::Ping,
        Command::Shutdown => DaemonRequest::Shutdown,
    };
    Ok(request)
}

/// Human-readable rendering of a successful response
fn render(response: &DaemonResponse) -> String {
    match response {
        DaemonResponse::Handshake { protocol_version } => {
            format!("Protocol version {}", protocol_version)
        }
        DaemonResponse::Pong => "pong".to_string(),
        DaemonResponse::ShuttingDown => "Daemon shutting down".to_string(),
        DaemonResponse::Names { names } if names.is_empty() => "(none)".to_string(),
        DaemonResponse::Names { names } => names.join("\n"),
        DaemonResponse::Tasks { tasks } if tasks.is_empty() => "(no tasks)".to_string(),
        DaemonResponse::Tasks { tasks } => tasks
            .iter()
            .map(|t| match &t.status {
                Some(status) => format!("{} [{}]", t.name, status),
                None => t.name.clone(),
            })
            .collect::<Vec<_>>()
            .join("\n"),
        DaemonResponse::Created { path, files, rules } => {
            let mut out = format!("Created {}", path);
            for file in files {
                out.push_str(&format!("\n  {}", file));
            }
            with_rules(out, rules.as_deref())
        }
        DaemonResponse::Deleted => "Deleted".to_string(),
        DaemonResponse::Moved { path } => format!("Moved to {}", path),
        DaemonResponse::File { content, rules, .. } => match rules {
            Some(rules) => format!("{}\n\n---\n{}", rules, content),
            None => content.clone(),
        },
        DaemonResponse::Updated {
            path,
            snapshot_path,
            rules,
        } => {
            let mut out = format!("Updated {}", path);
            if let Some(snapshot) = snapshot_path {
                out.push_str(&format!("\nPrevious version kept at {}", snapshot));
            }
            with_rules(out, rules.as_deref())
        }
        DaemonResponse::Reverted { path, content } => {
            format!("Reverted {}\n\n{}", path, content)
        }
        DaemonResponse::TmpStats { count, total_bytes } => format!(
            "{} snapshot(s), {}",
            count,
            format_size(*total_bytes)
        ),
        DaemonResponse::Cleared { deleted_count } => {
            format!("Cleared {} snapshot(s)", deleted_count)
        }
        DaemonResponse::Rules { rules } if rules.is_empty() => "(no rules)".to_string(),
        DaemonResponse::Rules { rules } => rules.clone(),
        DaemonResponse::RulesSet { path } => format!("Rules written to {}", path),
        DaemonResponse::SearchResults { hits } if hits.is_empty() => "No matches".to_string(),
        DaemonResponse::SearchResults { hits } => hits
            .iter()
            .map(|hit| {
                let mut out = format!("{}/{}/{}", hit.project, hit.task, hit.file);
                for line in &hit.matched_lines {
                    out.push_str(&format!("\n  {}", line));
                }
                out
            })
            .collect::<Vec<_>>()
            .join("\n"),
        DaemonResponse::GitStatus { changes } if changes.is_empty() => {
            "No uncommitted changes".to_string()
        }
        DaemonResponse::GitStatus { changes } => changes.clone(),
        DaemonResponse::Committed { summary: None } => "Nothing to commit".to_string(),
        DaemonResponse::Committed {
            summary: Some(summary),
        } => summary.clone(),
        DaemonResponse::Error { code, message } => format!("Error [{}]: {}", code, message),
    }
}

fn with_rules(mut out: String, rules: Option<&str>) -> String {
    if let Some(rules) = rules {
        out.push_str("\n\n");
        out.push_str(rules);
    }
    out
}

fn main() -> Result<()> {
    taskmark_lib::init_tracing("warn");
    let cli = Cli::parse();
    let config = Config::from_env();

    let needs_running_daemon = matches!(cli.command, Command::Ping | Command::Shutdown);
    let request = build_request(cli.command)?;

    let stream = if needs_running_daemon {
        client::connect(&config)?
    } else {
        client::connect_or_start_daemon(&config)?
    };
    let response = client::send_request(stream, &request)?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&response)?);
    }
    if let DaemonResponse::Error { .. } = response {
        if !cli.json {
            eprintln!("{}", render(&response));
        }
        std::process::exit(1);
    }
    if !cli.json {
        println!("{}", render(&response));
    }
    Ok(())
}
