//! Source reads, backups, and atomic replacement of the target file.

use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::{info, warn};

use crate::error::{RepairError, Result};

/// Suffix appended to the target path for its backup.
pub const BACKUP_SUFFIX: &str = ".backup";

/// `<path>.backup`
pub fn backup_path_for(path: &Path) -> PathBuf {
    let mut os = path.as_os_str().to_owned();
    os.push(BACKUP_SUFFIX);
    PathBuf::from(os)
}

/// Read the current on-disk source.
pub fn read_source(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).map_err(|e| RepairError::source_io(path, e))
}

/// Read the backup next to `path`, if one exists.
pub fn read_backup(path: &Path) -> Result<Option<String>> {
    let backup = backup_path_for(path);
    match std::fs::read_to_string(&backup) {
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(RepairError::source_io(backup, e)),
    }
}

/// What happened during a successful [`apply_patch`].
#[derive(Debug)]
pub struct ApplyOutcome {
    pub backup_path: PathBuf,

    /// Set when the backup copy failed; the write still went through.
    pub backup_warning: Option<RepairError>,
}

impl ApplyOutcome {
    pub fn backup_created(&self) -> bool {
        self.backup_warning.is_none()
    }
}

/// Back up `path` to `<path>.backup`, then atomically replace its content.
///
/// The backup always holds the content from immediately before the most
/// recent apply. A failed backup is reported in the outcome, not as an error.
/// The new content is written to a temporary file in the same directory and
/// renamed over `path`, so readers never observe a partial write.
pub fn apply_patch(path: &Path, new_text: &str) -> Result<ApplyOutcome> {
    let backup_path = backup_path_for(path);

    let backup_warning = match std::fs::copy(path, &backup_path) {
        Ok(_) => {
            info!(backup = %backup_path.display(), "backup created");
            None
        }
        Err(source) => {
            let err = RepairError::Backup {
                path: backup_path.clone(),
                source,
            };
            warn!(error = %err, "continuing without backup");
            Some(err)
        }
    };

    write_atomic(path, new_text)?;
    info!(path = %path.display(), bytes = new_text.len(), "patch applied");

    Ok(ApplyOutcome {
        backup_path,
        backup_warning,
    })
}

fn write_atomic(path: &Path, content: &str) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let io_err = |e: std::io::Error| RepairError::source_io(path, e);

    let mut tmp = NamedTempFile::new_in(&dir).map_err(io_err)?;
    tmp.write_all(content.as_bytes()).map_err(io_err)?;
    tmp.as_file().sync_all().map_err(io_err)?;

    if let Ok(meta) = std::fs::metadata(path) {
        std::fs::set_permissions(tmp.path(), meta.permissions()).map_err(io_err)?;
    }

    tmp.persist(path).map_err(|e| io_err(e.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_backup_path_appends_suffix() {
        assert_eq!(
            backup_path_for(Path::new("dir/app.py")),
            PathBuf::from("dir/app.py.backup")
        );
    }

    #[test]
    fn test_apply_writes_backup_then_content() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("app.py");
        std::fs::write(&target, "print('old')\n").unwrap();

        let outcome = apply_patch(&target, "print('new')").unwrap();

        assert!(outcome.backup_created());
        assert_eq!(
            std::fs::read_to_string(&outcome.backup_path).unwrap(),
            "print('old')\n"
        );
        assert_eq!(read_source(&target).unwrap(), "print('new')");
    }

    #[test]
    fn test_backup_holds_only_previous_content() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("app.py");
        std::fs::write(&target, "v1").unwrap();

        apply_patch(&target, "v2").unwrap();
        apply_patch(&target, "v3").unwrap();

        assert_eq!(read_backup(&target).unwrap().as_deref(), Some("v2"));
        assert_eq!(read_source(&target).unwrap(), "v3");
    }

    #[test]
    fn test_missing_target_warns_but_still_writes() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("fresh.py");

        let outcome = apply_patch(&target, "print(1)").unwrap();

        assert!(matches!(
            outcome.backup_warning,
            Some(RepairError::Backup { .. })
        ));
        assert_eq!(read_source(&target).unwrap(), "print(1)");
    }

    #[test]
    fn test_write_into_missing_directory_is_source_io() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("nope").join("app.py");
        let err = apply_patch(&target, "x").unwrap_err();
        assert!(matches!(err, RepairError::SourceIo { .. }));
    }

    #[test]
    fn test_read_backup_absent_is_none() {
        let dir = tempdir().unwrap();
        assert!(read_backup(&dir.path().join("a.py")).unwrap().is_none());
    }

    #[test]
    fn test_no_temp_files_left_behind() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("app.py");
        std::fs::write(&target, "a").unwrap();
        apply_patch(&target, "b").unwrap();

        let mut names: Vec<String> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        names.sort();
        assert_eq!(names, vec!["app.py", "app.py.backup"]);
    }

    #[cfg(unix)]
    #[test]
    fn test_permissions_survive_replace() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        let target = dir.path().join("run.sh");
        std::fs::write(&target, "exit 1").unwrap();
        std::fs::set_permissions(&target, std::fs::Permissions::from_mode(0o755)).unwrap();

        apply_patch(&target, "exit 0").unwrap();

        let mode = std::fs::metadata(&target).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o755);
    }
}
