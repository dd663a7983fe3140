// Template store: named bundles of files copied into new tasks
// Templates live under <root>/templates/<name>/ and are never touched by task operations

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::PathBuf;

use super::models::{DEFAULT_TEMPLATE, DEFAULT_TEMPLATE_CONTENT, TASK_FILENAME};
use super::paths::{validate_segment, Resolver};
use super::persistence::atomic_write;
use crate::error::{Entity, IoResultExt, Result, StoreError};

#[derive(Debug, Clone)]
pub struct TemplateStore {
    paths: Resolver,
}

impl TemplateStore {
    pub fn new(paths: Resolver) -> Self {
        Self { paths }
    }

    /// Create the templates area and the default template if missing
    pub fn ensure_default(&self) -> Result<()> {
        let templates_dir = self.paths.templates_dir();
        fs::create_dir_all(&templates_dir).at(&templates_dir)?;

        let default_dir = self.paths.template_dir(DEFAULT_TEMPLATE)?;
        if !default_dir.exists() {
            fs::create_dir(&default_dir).at(&default_dir)?;
            let task_file = default_dir.join(TASK_FILENAME);
            atomic_write(&task_file, DEFAULT_TEMPLATE_CONTENT.as_bytes()).at(&task_file)?;
            tracing::info!(dir = %default_dir.display(), "Created default template");
        }
        Ok(())
    }

    /// Template names, sorted; empty if none exist
    pub fn list_templates(&self) -> Result<Vec<String>> {
        list_dir_names(&self.paths.templates_dir(), EntryType::Dir)
    }

    pub fn create_template(&self, name: &str) -> Result<PathBuf> {
        let dir = self.paths.template_dir(name)?;
        let parent = self.paths.templates_dir();
        fs::create_dir_all(&parent).at(&parent)?;

        match fs::create_dir(&dir) {
            Ok(()) => {
                tracing::debug!(template = name, "Created template");
                Ok(dir)
            }
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                Err(StoreError::AlreadyExists(Entity::Template(name.to_string())))
            }
            Err(e) => Err(StoreError::io(dir, e)),
        }
    }

    /// Add or overwrite one file in a template
    pub fn add_template_file(&self, name: &str, filename: &str, content: &str) -> Result<PathBuf> {
        let path = self.paths.template_file(name, filename)?;
        self.existing_dir(name)?;
        atomic_write(&path, content.as_bytes()).at(&path)?;
        tracing::debug!(template = name, filename, "Wrote template file");
        Ok(path)
    }

    /// Every file in a template, keyed by filename
    pub fn get_template_files(&self, name: &str) -> Result<BTreeMap<String, Vec<u8>>> {
        let dir = self.existing_dir(name)?;
        let mut files = BTreeMap::new();
        for filename in list_dir_names(&dir, EntryType::File)? {
            let path = dir.join(&filename);
            let content = fs::read(&path).at(&path)?;
            files.insert(filename, content);
        }
        Ok(files)
    }

    fn existing_dir(&self, name: &str) -> Result<PathBuf> {
        let dir = self.paths.template_dir(name)?;
        if !dir.is_dir() {
            return Err(StoreError::NotFound(Entity::Template(name.to_string())));
        }
        Ok(dir)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum EntryType {
    File,
    Dir,
}

/// Sorted names of visible entries of one type in `dir`
///
/// A missing directory lists as empty. Hidden entries (temp files, staging
/// dirs) and names that are not valid identifiers are skipped.
pub(crate) fn list_dir_names(dir: &std::path::Path, entry_type: EntryType) -> Result<Vec<String>> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(StoreError::io(dir, e)),
    };

    let mut names = Vec::new();
    for entry in entries {
        let entry = entry.at(dir)?;
        let path = entry.path();
        let matches = match entry_type {
            EntryType::File => path.is_file(),
            EntryType::Dir => path.is_dir(),
        };
        if !matches {
            continue;
        }
        if let Some(name) = entry.file_name().to_str() {
            if validate_segment("name", name).is_ok() {
                names.push(name.to_string());
            }
        }
    }
    names.sort();
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use tempfile::TempDir;

    fn store() -> (TemplateStore, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let store = TemplateStore::new(Resolver::new(temp_dir.path()));
        (store, temp_dir)
    }

    #[test]
    fn test_default_template_created_once() {
        let (store, temp_dir) = store();
        store.ensure_default().unwrap();

        let task_file = temp_dir.path().join("templates/default/task.md");
        assert_eq!(
            fs::read_to_string(&task_file).unwrap(),
            DEFAULT_TEMPLATE_CONTENT
        );

        // A user-edited default is left alone
        fs::write(&task_file, "custom").unwrap();
        store.ensure_default().unwrap();
        assert_eq!(fs::read_to_string(&task_file).unwrap(), "custom");
        assert_eq!(store.list_templates().unwrap(), vec!["default"]);
    }

    #[test]
    fn test_list_templates_empty_without_dir() {
        let (store, _temp) = store();
        assert!(store.list_templates().unwrap().is_empty());
    }

    #[test]
    fn test_create_and_fill_template() {
        let (store, _temp) = store();
        store.create_template("bug").unwrap();
        store.create_template("feature").unwrap();

        let err = store.create_template("bug").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AlreadyExists);

        store.add_template_file("bug", "x.md", "1").unwrap();
        store.add_template_file("bug", "y.md", "2").unwrap();
        store.add_template_file("bug", "y.md", "22").unwrap();

        let files = store.get_template_files("bug").unwrap();
        assert_eq!(files.len(), 2);
        assert_eq!(files["x.md"], b"1");
        assert_eq!(files["y.md"], b"22");
        assert_eq!(store.list_templates().unwrap(), vec!["bug", "feature"]);
    }

    #[test]
    fn test_missing_template() {
        let (store, _temp) = store();
        let err = store.add_template_file("nope", "x.md", "1").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(err.to_string(), "template 'nope' not found");

        let err = store.get_template_files("nope").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_template_names_are_validated() {
        let (store, temp_dir) = store();
        let err = store.create_template("../escape").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidIdentifier);
        assert!(!temp_dir.path().join("escape").exists());
    }
}
