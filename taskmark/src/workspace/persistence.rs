// Disk helpers shared by the workspace and the snapshot store
// Every content write goes through write-to-temp + fsync + rename so readers never see partial files

use std::fs;
use std::io::{self, Write as _};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime};

/// Age threshold for temp file cleanup (1 hour)
pub const CLEANUP_AGE_THRESHOLD: Duration = Duration::from_secs(3600);

/// Maximum number of entries to scan during startup cleanup
const CLEANUP_SCAN_LIMIT: usize = 10_000;

/// Marker embedded in every temp file and staging directory name
const TEMP_MARKER: &str = ".tmp.";

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Fresh temp sibling name for `name`
///
/// Unique per call within the process, so concurrent writers never share a
/// temp file or staging directory.
pub fn temp_name(name: &str) -> String {
    let seq = TEMP_COUNTER.fetch_add(1, Ordering::Relaxed);
    format!(".{}{}{}.{}", name, TEMP_MARKER, std::process::id(), seq)
}

/// Whether a directory entry name is one of our temp files or staging dirs
pub fn is_temp_name(name: &str) -> bool {
    name.starts_with('.') && name.contains(TEMP_MARKER)
}

/// Atomically replace `path` with `contents`
///
/// Writes a temp file in the same directory, fsyncs it, then renames over the
/// target. The temp file is removed if any step fails.
pub fn atomic_write(path: &Path, contents: &[u8]) -> io::Result<()> {
    let parent = path.parent().ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("Invalid path: {}", path.display()),
        )
    })?;
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("unknown");
    let temp_path = parent.join(temp_name(name));

    let result = (|| {
        let mut file = fs::File::create(&temp_path)?;
        file.write_all(contents)?;
        file.sync_all()?;
        drop(file);
        fs::rename(&temp_path, path)
    })();

    if result.is_err() {
        let _ = fs::remove_file(&temp_path);
    }
    result
}

/// Remove stale temp files and staging directories under `dir`
///
/// Deletes entries matching [`is_temp_name`] whose mtime is older than
/// `threshold`. Scans at most `CLEANUP_SCAN_LIMIT` entries to keep startup bounded.
///
/// Returns (deleted_count, scanned_count, hit_limit)
pub fn cleanup_stale_temps(
    dir: &Path,
    max_depth: usize,
    threshold: Duration,
) -> io::Result<(usize, usize, bool)> {
    if !dir.exists() {
        return Ok((0, 0, false));
    }

    let mut scanned = 0;
    let mut deleted = 0;
    let now = SystemTime::now();

    let mut entries = walkdir::WalkDir::new(dir)
        .min_depth(1)
        .max_depth(max_depth)
        .into_iter();
    while let Some(entry) = entries.next() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(_) => continue,
        };

        if scanned >= CLEANUP_SCAN_LIMIT {
            tracing::warn!(
                limit = CLEANUP_SCAN_LIMIT,
                dir = %dir.display(),
                "Hit cleanup scan limit"
            );
            return Ok((deleted, scanned, true));
        }
        scanned += 1;

        let name = entry.file_name().to_string_lossy();
        if !is_temp_name(&name) {
            continue;
        }

        let is_dir = entry.file_type().is_dir();
        if is_dir {
            entries.skip_current_dir();
        }

        let age = entry
            .metadata()
            .ok()
            .and_then(|m| m.modified().ok())
            .and_then(|modified| now.duration_since(modified).ok());
        if !age.map_or(false, |age| age > threshold) {
            continue;
        }

        let removed = if is_dir {
            fs::remove_dir_all(entry.path())
        } else {
            fs::remove_file(entry.path())
        };
        match removed {
            Ok(()) => deleted += 1,
            Err(e) => tracing::warn!(
                path = %entry.path().display(),
                error = %e,
                "Failed to delete stale temp entry"
            ),
        }
    }

    Ok((deleted, scanned, false))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_atomic_write() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("task.md");

        atomic_write(&path, b"# Test\n- [ ] Task\n").unwrap();
        atomic_write(&path, b"# Replaced\n").unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "# Replaced\n");
        let leftovers: Vec<_> = fs::read_dir(temp_dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| is_temp_name(&e.file_name().to_string_lossy()))
            .collect();
        assert!(leftovers.is_empty(), "Temp files should be renamed away");
    }

    #[test]
    fn test_atomic_write_missing_parent_fails_cleanly() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("missing").join("task.md");
        assert!(atomic_write(&path, b"x").is_err());
        assert!(!temp_dir.path().join("missing").exists());
    }

    #[test]
    fn test_temp_names() {
        assert!(is_temp_name(&temp_name("task.md")));
        assert_ne!(temp_name("task.md"), temp_name("task.md"));
        assert!(!is_temp_name("notes.tmp.md"));
        assert!(!is_temp_name("task.md"));
    }

    #[test]
    fn test_cleanup_stale_temps() {
        let temp_dir = TempDir::new().unwrap();
        let task_dir = temp_dir.path().join("projects/app/t1");
        fs::create_dir_all(&task_dir).unwrap();

        let fresh_temp = task_dir.join(".task.md.tmp.12345");
        fs::write(&fresh_temp, "fresh").unwrap();

        let old_temp = task_dir.join(".old.md.tmp.99999");
        fs::write(&old_temp, "old").unwrap();

        let old_staging = temp_dir.path().join("projects/app/.t2.tmp.4242");
        fs::create_dir_all(&old_staging).unwrap();
        fs::write(old_staging.join("task.md"), "half copied").unwrap();

        let regular = task_dir.join("task.md");
        fs::write(&regular, "keep").unwrap();

        let two_hours_ago = filetime::FileTime::from_system_time(
            SystemTime::now() - Duration::from_secs(7200),
        );
        filetime::set_file_mtime(&old_temp, two_hours_ago).unwrap();
        filetime::set_file_mtime(&old_staging, two_hours_ago).unwrap();
        filetime::set_file_mtime(&regular, two_hours_ago).unwrap();

        let (deleted, scanned, hit_limit) =
            cleanup_stale_temps(temp_dir.path(), 4, CLEANUP_AGE_THRESHOLD).unwrap();

        assert!(!hit_limit);
        assert_eq!(deleted, 2, "Should delete the old temp file and staging dir");
        assert!(scanned > 0);
        assert!(!old_temp.exists());
        assert!(!old_staging.exists());
        assert!(fresh_temp.exists(), "Fresh temp should remain");
        assert!(regular.exists(), "Regular files are never touched");
    }
}
