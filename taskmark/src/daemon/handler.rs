// Maps workspace requests onto the workspace API
// Connection-level messages (handshake, ping, shutdown) are answered by the server

use std::path::Path;

use super::protocol::{DaemonErrorCode, DaemonRequest, DaemonResponse};
use crate::error::Result;
use crate::workspace::Workspace;

/// Execute one workspace request
///
/// Blocking: performs filesystem I/O, so async callers run it on the blocking pool.
pub fn handle(workspace: &Workspace, request: DaemonRequest) -> DaemonResponse {
    let kind = request_name(&request);
    match dispatch(workspace, request) {
        Ok(response) => response,
        Err(err) => {
            tracing::debug!(request = kind, error = %err, "Request failed");
            err.into()
        }
    }
}

fn dispatch(ws: &Workspace, request: DaemonRequest) -> Result<DaemonResponse> {
    let response = match request {
        DaemonRequest::Handshake { .. } | DaemonRequest::Ping | DaemonRequest::Shutdown => {
            DaemonResponse::Error {
                code: DaemonErrorCode::InvalidRequest,
                message: "Connection messages are not workspace requests".to_string(),
            }
        }

        // --- projects ---
        DaemonRequest::ListProjects => DaemonResponse::Names {
            names: ws.tasks().list_projects()?,
        },
        DaemonRequest::CreateProject { project } => {
            let path = ws.tasks().create_project(&project)?;
            created(&path)
        }
        DaemonRequest::DeleteProject { project } => {
            ws.tasks().delete_project(&project)?;
            DaemonResponse::Deleted
        }

        // --- tasks ---
        DaemonRequest::ListTasks { project, status } => DaemonResponse::Tasks {
            tasks: match status {
                Some(status) => ws.tasks().list_tasks_by_status(&project, &status)?,
                None => ws.tasks().list_task_summaries(&project)?,
            },
        },
        DaemonRequest::CreateTask {
            project,
            task,
            template,
            title,
        } => {
            let created = ws.tasks().create_task(
                &project,
                &task,
                template.as_deref(),
                title.as_deref(),
            )?;
            DaemonResponse::Created {
                path: display(&created.path),
                files: created.files,
                rules: None,
            }
        }
        DaemonRequest::DeleteTask { project, task } => {
            ws.tasks().delete_task(&project, &task)?;
            DaemonResponse::Deleted
        }
        DaemonRequest::ArchiveTask { project, task } => DaemonResponse::Moved {
            path: display(&ws.tasks().archive_task(&project, &task)?),
        },
        DaemonRequest::UnarchiveTask { project, task } => DaemonResponse::Moved {
            path: display(&ws.tasks().unarchive_task(&project, &task)?),
        },
        DaemonRequest::ListArchivedTasks { project } => DaemonResponse::Tasks {
            tasks: ws.tasks().list_archived_tasks(&project)?,
        },

        // --- files ---
        DaemonRequest::ListFiles { project, task } => DaemonResponse::Names {
            names: ws.files().list_files(&project, &task)?,
        },
        DaemonRequest::GetFile {
            project,
            task,
            filename,
        } => {
            let content = ws.files().get_file(&project, &task, &filename)?;
            let path = ws.paths().resolve(Some(&project), Some(&task), Some(&filename))?;
            DaemonResponse::File {
                path: display(&path),
                content,
                rules: applicable_rules(ws, &project, &task),
            }
        }
        DaemonRequest::CreateFile {
            project,
            task,
            filename,
            content,
        } => {
            let path = ws.files().create_file(&project, &task, &filename, &content)?;
            DaemonResponse::Created {
                path: display(&path),
                files: Vec::new(),
                rules: applicable_rules(ws, &project, &task),
            }
        }
        DaemonRequest::UpdateFile {
            project,
            task,
            filename,
            content,
        } => {
            let updated = ws.files().update_file(&project, &task, &filename, &content)?;
            DaemonResponse::Updated {
                path: display(&updated.path),
                snapshot_path: updated.snapshot_path.as_deref().map(display),
                rules: applicable_rules(ws, &project, &task),
            }
        }
        DaemonRequest::DeleteFile {
            project,
            task,
            filename,
        } => {
            ws.files().delete_file(&project, &task, &filename)?;
            DaemonResponse::Deleted
        }
        DaemonRequest::RevertFile {
            project,
            task,
            filename,
        } => {
            let content = ws.files().revert_file(&project, &task, &filename)?;
            let path = ws.paths().resolve(Some(&project), Some(&task), Some(&filename))?;
            DaemonResponse::Reverted {
                path: display(&path),
                content,
            }
        }

        // --- snapshots ---
        DaemonRequest::TmpStats => ws.tmp_stats().into(),
        DaemonRequest::ClearTmp => DaemonResponse::Cleared {
            deleted_count: ws.clear_tmp(),
        },

        // --- templates ---
        DaemonRequest::ListTemplates => DaemonResponse::Names {
            names: ws.templates().list_templates()?,
        },
        DaemonRequest::CreateTemplate { template } => {
            let path = ws.templates().create_template(&template)?;
            created(&path)
        }
        DaemonRequest::AddTemplateFile {
            template,
            filename,
            content,
        } => {
            let path = ws
                .templates()
                .add_template_file(&template, &filename, &content)?;
            created(&path)
        }

        // --- rules ---
        DaemonRequest::GetRules { project, task } => DaemonResponse::Rules {
            rules: ws.rules().get_rules(project.as_deref(), task.as_deref())?,
        },
        DaemonRequest::SetRules {
            content,
            project,
            task,
        } => {
            let path = ws
                .rules()
                .set_rules(&content, project.as_deref(), task.as_deref())?;
            DaemonResponse::RulesSet {
                path: display(&path),
            }
        }

        DaemonRequest::Search { query, project } => DaemonResponse::SearchResults {
            hits: ws.search(&query, project.as_deref())?,
        },

        // --- git ---
        DaemonRequest::GitStatus => DaemonResponse::GitStatus {
            changes: ws.git().status()?,
        },
        DaemonRequest::GitCommit {
            message,
            project,
            task,
        } => DaemonResponse::Committed {
            summary: ws
                .git()
                .commit(&message, project.as_deref(), task.as_deref())?,
        },
    };
    Ok(response)
}

/// Rules for a task file, or `None` when no level has any
fn applicable_rules(ws: &Workspace, project: &str, task: &str) -> Option<String> {
    match ws.rules().get_rules(Some(project), Some(task)) {
        Ok(rules) if !rules.is_empty() => Some(rules),
        Ok(_) => None,
        Err(e) => {
            tracing::warn!(project, task, error = %e, "Failed to read rules");
            None
        }
    }
}

fn created(path: &Path) -> DaemonResponse {
    DaemonResponse::Created {
        path: display(path),
        files: Vec::new(),
        rules: None,
    }
}

fn display(path: &Path) -> String {
    path.display().to_string()
}

fn request_name(request: &DaemonRequest) -> &'static str {
    match request {
        DaemonRequest::Handshake { .. } => "handshake",
        DaemonRequest::Ping => "ping",
        DaemonRequest::Shutdown => "shutdown",
        DaemonRequest::ListProjects => "list_projects",
        DaemonRequest::CreateProject { .. } => "create_project",
        DaemonRequest::DeleteProject { .. } => "delete_project",
        DaemonRequest::ListTasks { .. } => "list_tasks",
        DaemonRequest::CreateTask { .. } => "create_task",
        DaemonRequest::DeleteTask { .. } => "delete_task",
        DaemonRequest::ArchiveTask { .. } => "archive_task",
        DaemonRequest::UnarchiveTask { .. } => "unarchive_task",
        DaemonRequest::ListArchivedTasks { .. } => "list_archived_tasks",
        DaemonRequest::ListFiles { .. } => "list_files",
        DaemonRequest::GetFile { .. } => "get_file",
        DaemonRequest::CreateFile { .. } => "create_file",
        DaemonRequest::UpdateFile { .. } => "update_file",
        DaemonRequest::DeleteFile { .. } => "delete_file",
        DaemonRequest::RevertFile { .. } => "revert_file",
        DaemonRequest::TmpStats => "tmp_stats",
        DaemonRequest::ClearTmp => "clear_tmp",
        DaemonRequest::ListTemplates => "list_templates",
        DaemonRequest::CreateTemplate { .. } => "create_template",
        DaemonRequest::AddTemplateFile { .. } => "add_template_file",
        DaemonRequest::GetRules { .. } => "get_rules",
        DaemonRequest::SetRules { .. } => "set_rules",
        DaemonRequest::Search { .. } => "search",
        DaemonRequest::GitStatus => "git_status",
        DaemonRequest::GitCommit { .. } => "git_commit",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn workspace() -> (Workspace, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let ws = Workspace::open(temp_dir.path()).unwrap();
        (ws, temp_dir)
    }

    fn s(v: &str) -> String {
        v.to_string()
    }

    fn expect_error(response: DaemonResponse, expected: DaemonErrorCode) {
        match response {
            DaemonResponse::Error { code, .. } => assert_eq!(code, expected),
            other => panic!("Expected {} error, got {:?}", expected, other),
        }
    }

    fn setup_task(ws: &Workspace) {
        handle(ws, DaemonRequest::CreateProject { project: s("app") });
        let response = handle(
            ws,
            DaemonRequest::CreateTask {
                project: s("app"),
                task: s("t1"),
                template: None,
                title: Some(s("First")),
            },
        );
        assert!(matches!(response, DaemonResponse::Created { ref files, .. } if files == &vec![s("task.md")]));
    }

    #[test]
    fn test_update_and_revert_flow() {
        let (ws, _temp) = workspace();
        setup_task(&ws);

        let created = handle(
            &ws,
            DaemonRequest::CreateFile {
                project: s("app"),
                task: s("t1"),
                filename: s("a.md"),
                content: s("A"),
            },
        );
        assert!(matches!(created, DaemonResponse::Created { rules: None, .. }));

        let updated = handle(
            &ws,
            DaemonRequest::UpdateFile {
                project: s("app"),
                task: s("t1"),
                filename: s("a.md"),
                content: s("B"),
            },
        );
        match updated {
            DaemonResponse::Updated { snapshot_path, .. } => {
                assert!(snapshot_path.unwrap().ends_with(".tmp/app/t1/a.md"));
            }
            other => panic!("Expected Updated, got {:?}", other),
        }
        assert_eq!(
            handle(&ws, DaemonRequest::TmpStats),
            DaemonResponse::TmpStats {
                count: 1,
                total_bytes: 1
            }
        );

        let revert = || DaemonRequest::RevertFile {
            project: s("app"),
            task: s("t1"),
            filename: s("a.md"),
        };
        match handle(&ws, revert()) {
            DaemonResponse::Reverted { content, .. } => assert_eq!(content, "A"),
            other => panic!("Expected Reverted, got {:?}", other),
        }
        expect_error(handle(&ws, revert()), DaemonErrorCode::NoSnapshotAvailable);
    }

    #[test]
    fn test_file_responses_carry_rules() {
        let (ws, _temp) = workspace();
        setup_task(&ws);
        handle(
            &ws,
            DaemonRequest::SetRules {
                content: s("Write tests first."),
                project: None,
                task: None,
            },
        );

        let response = handle(
            &ws,
            DaemonRequest::GetFile {
                project: s("app"),
                task: s("t1"),
                filename: s("task.md"),
            },
        );
        match response {
            DaemonResponse::File { content, rules, .. } => {
                assert!(content.contains("# First"));
                assert_eq!(rules.as_deref(), Some("=== Global rules ===\nWrite tests first."));
            }
            other => panic!("Expected File, got {:?}", other),
        }
    }

    #[test]
    fn test_list_tasks_filters_status() {
        let (ws, _temp) = workspace();
        setup_task(&ws);

        let list = |status: Option<&str>| {
            handle(
                &ws,
                DaemonRequest::ListTasks {
                    project: s("app"),
                    status: status.map(s),
                },
            )
        };
        match list(Some("todo")) {
            DaemonResponse::Tasks { tasks } => assert_eq!(tasks.len(), 1),
            other => panic!("Expected Tasks, got {:?}", other),
        }
        assert_eq!(list(Some("done")), DaemonResponse::Tasks { tasks: vec![] });
    }

    #[test]
    fn test_archive_requests() {
        let (ws, _temp) = workspace();
        setup_task(&ws);
        let archive = DaemonRequest::ArchiveTask {
            project: s("app"),
            task: s("t1"),
        };

        match handle(&ws, archive.clone()) {
            DaemonResponse::Moved { path } => assert!(path.ends_with("app/_archive/t1")),
            other => panic!("Expected Moved, got {:?}", other),
        }
        expect_error(handle(&ws, archive), DaemonErrorCode::NotFound);

        match handle(&ws, DaemonRequest::ListArchivedTasks { project: s("app") }) {
            DaemonResponse::Tasks { tasks } => {
                assert_eq!(tasks.len(), 1);
                assert_eq!(tasks[0].name, "t1");
            }
            other => panic!("Expected Tasks, got {:?}", other),
        }
        assert_eq!(
            handle(
                &ws,
                DaemonRequest::ListTasks {
                    project: s("app"),
                    status: None
                }
            ),
            DaemonResponse::Tasks { tasks: vec![] }
        );

        assert!(matches!(
            handle(
                &ws,
                DaemonRequest::UnarchiveTask {
                    project: s("app"),
                    task: s("t1"),
                }
            ),
            DaemonResponse::Moved { .. }
        ));
    }

    #[test]
    fn test_git_commit_needs_project_for_task() {
        let (ws, _temp) = workspace();
        expect_error(
            handle(
                &ws,
                DaemonRequest::GitCommit {
                    message: s("wip"),
                    project: None,
                    task: Some(s("t1")),
                },
            ),
            DaemonErrorCode::InvalidIdentifier,
        );
    }

    #[test]
    fn test_errors_carry_codes() {
        let (ws, _temp) = workspace();
        expect_error(
            handle(&ws, DaemonRequest::CreateProject { project: s("../x") }),
            DaemonErrorCode::InvalidIdentifier,
        );
        expect_error(
            handle(&ws, DaemonRequest::ListFiles { project: s("app"), task: s("t1") }),
            DaemonErrorCode::NotFound,
        );
        expect_error(
            handle(&ws, DaemonRequest::CreateTemplate { template: s("default") }),
            DaemonErrorCode::AlreadyExists,
        );
        expect_error(handle(&ws, DaemonRequest::Ping), DaemonErrorCode::InvalidRequest);
    }

    #[test]
    fn test_clear_tmp_and_search() {
        let (ws, _temp) = workspace();
        setup_task(&ws);
        handle(
            &ws,
            DaemonRequest::UpdateFile {
                project: s("app"),
                task: s("t1"),
                filename: s("task.md"),
                content: s("status: done\nneedle here"),
            },
        );

        match handle(&ws, DaemonRequest::Search { query: s("NEEDLE"), project: None }) {
            DaemonResponse::SearchResults { hits } => {
                assert_eq!(hits.len(), 1);
                assert_eq!(hits[0].matched_lines, vec![s("needle here")]);
            }
            other => panic!("Expected SearchResults, got {:?}", other),
        }

        assert_eq!(
            handle(&ws, DaemonRequest::ClearTmp),
            DaemonResponse::Cleared { deleted_count: 1 }
        );
        assert_eq!(
            handle(&ws, DaemonRequest::ClearTmp),
            DaemonResponse::Cleared { deleted_count: 0 }
        );
    }
}
