// Git history for the base directory
// Shells out to the `git` binary; snapshots under .tmp/ are ignored

use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use super::paths::{Resolver, SNAPSHOTS_DIR};
use crate::error::{Entity, IoResultExt, Result, StoreError};

const GITIGNORE: &str = ".gitignore";

/// Identity used when the user has not configured one
const FALLBACK_NAME: &str = "taskmark";
const FALLBACK_EMAIL: &str = "taskmark@localhost";

#[derive(Debug, Clone)]
pub struct GitRepo {
    paths: Resolver,
}

impl GitRepo {
    pub fn new(paths: Resolver) -> Self {
        Self { paths }
    }

    fn root(&self) -> &Path {
        self.paths.root()
    }

    pub fn is_initialized(&self) -> bool {
        self.root().join(".git").exists()
    }

    /// `git init` the base directory and ignore the snapshot area
    ///
    /// Returns `false` when a repository already exists.
    pub fn init_if_missing(&self) -> Result<bool> {
        if self.is_initialized() {
            return Ok(false);
        }
        fs::create_dir_all(self.root()).at(self.root())?;
        self.run(["init", "--quiet"])?;

        let gitignore = self.root().join(GITIGNORE);
        if !gitignore.exists() {
            fs::write(&gitignore, format!("{}/\n", SNAPSHOTS_DIR)).at(&gitignore)?;
        }
        tracing::info!(root = %self.root().display(), "Initialized git repository");
        Ok(true)
    }

    /// Uncommitted changes in `git status --short` form; empty when clean
    pub fn status(&self) -> Result<String> {
        let output = self.run(["status", "--short"])?;
        Ok(stdout(&output))
    }

    /// Stage and commit changes, optionally limited to one project or task
    ///
    /// Returns `None` when there was nothing to commit.
    pub fn commit(
        &self,
        message: &str,
        project: Option<&str>,
        task: Option<&str>,
    ) -> Result<Option<String>> {
        let target: Option<PathBuf> = match (project, task) {
            (Some(project), Some(task)) => Some(self.paths.task_dir(project, task)?),
            (Some(project), None) => Some(self.paths.project_dir(project)?),
            (None, Some(task)) => {
                return Err(StoreError::InvalidIdentifier {
                    kind: "task",
                    value: task.to_string(),
                    reason: "a task requires a project",
                })
            }
            (None, None) => None,
        };

        if let (Some(path), Some(project)) = (&target, project) {
            if !path.is_dir() {
                let entity = match task {
                    Some(task) => Entity::task(project, task),
                    None => Entity::Project(project.to_string()),
                };
                return Err(StoreError::NotFound(entity));
            }
        }

        match &target {
            Some(path) => self.run([OsStr::new("add"), OsStr::new("--"), path.as_os_str()])?,
            None => self.run(["add", "-A"])?,
        };

        let mut args: Vec<String> = Vec::new();
        if !self.has_identity() {
            args.extend([
                "-c".to_string(),
                format!("user.name={}", FALLBACK_NAME),
                "-c".to_string(),
                format!("user.email={}", FALLBACK_EMAIL),
            ]);
        }
        args.extend(["commit".to_string(), "-m".to_string(), message.to_string()]);

        let output = self.output(&args)?;
        if output.status.success() {
            let summary = stdout(&output);
            tracing::info!(project, task, "Committed changes");
            return Ok(Some(summary));
        }
        if stdout(&output).contains("nothing to commit")
            || stdout(&output).contains("no changes added to commit")
            || stdout(&output).contains("nothing added to commit")
        {
            return Ok(None);
        }
        Err(failure("commit", &output))
    }

    fn has_identity(&self) -> bool {
        self.output(["config", "user.email"])
            .map(|output| output.status.success() && !stdout(&output).is_empty())
            .unwrap_or(false)
    }

    /// Run git and fail on a non-zero exit
    fn run<I, S>(&self, args: I) -> Result<Output>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let args: Vec<S> = args.into_iter().collect();
        let command = args
            .first()
            .map(|a| a.as_ref().to_string_lossy().into_owned())
            .unwrap_or_default();
        let output = self.output(args)?;
        if !output.status.success() {
            return Err(failure(&command, &output));
        }
        Ok(output)
    }

    fn output<I, S>(&self, args: I) -> Result<Output>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        Command::new("git")
            .arg("-C")
            .arg(self.root())
            .args(args)
            .output()
            .map_err(|e| StoreError::Git {
                command: "invocation".to_string(),
                message: format!("could not run git: {}", e),
            })
    }
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}

fn failure(command: &str, output: &Output) -> StoreError {
    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    StoreError::Git {
        command: command.to_string(),
        message: if stderr.is_empty() { stdout(output) } else { stderr },
    }
}
