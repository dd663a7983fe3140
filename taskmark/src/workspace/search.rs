//! Case-insensitive content search across task files

use std::fs;

use super::models::{SearchHit, MAX_MATCHED_LINES};
use super::paths::{Resolver, ARCHIVE_DIR};
use super::templates::{list_dir_names, EntryType};
use crate::error::{Entity, IoResultExt, Result, StoreError};

/// Find task files whose content contains `query`, ignoring case
///
/// Hits come back ordered by project, task and file. An empty query matches
/// nothing. Files that are not valid UTF-8 are skipped.
pub fn search(paths: &Resolver, query: &str, project: Option<&str>) -> Result<Vec<SearchHit>> {
    if query.is_empty() {
        return Ok(Vec::new());
    }
    let needle = query.to_lowercase();

    let projects = match project {
        Some(project) => {
            let dir = paths.project_dir(project)?;
            if !dir.is_dir() {
                return Err(StoreError::NotFound(Entity::Project(project.to_string())));
            }
            vec![project.to_string()]
        }
        None => list_dir_names(&paths.projects_dir(), EntryType::Dir)?,
    };

    let mut hits = Vec::new();
    for project in &projects {
        let project_dir = paths.project_dir(project)?;
        for task in list_dir_names(&project_dir, EntryType::Dir)? {
            if task == ARCHIVE_DIR {
                continue;
            }
            let task_dir = project_dir.join(&task);
            for file in list_dir_names(&task_dir, EntryType::File)? {
                let path = task_dir.join(&file);
                let bytes = fs::read(&path).at(&path)?;
                let Ok(content) = String::from_utf8(bytes) else {
                    tracing::debug!(path = %path.display(), "Skipping non-UTF-8 file in search");
                    continue;
                };
                if !content.to_lowercase().contains(&needle) {
                    continue;
                }
                let matched_lines = content
                    .lines()
                    .filter(|line| line.to_lowercase().contains(&needle))
                    .map(|line| line.trim().to_string())
                    .take(MAX_MATCHED_LINES)
                    .collect();
                hits.push(SearchHit {
                    project: project.clone(),
                    task: task.clone(),
                    file,
                    matched_lines,
                });
            }
        }
    }

    tracing::debug!(query, hits = hits.len(), "Search finished");
    Ok(hits)
}
