//! File-system helpers with `Error::internal_io` reporting.

use crate::error::{Error, Result};
use std::fs;
use std::path::{Path, PathBuf};

fn io_error(e: std::io::Error, operation: &str) -> Error {
    Error::internal_io(e.to_string(), Some(operation.to_string()))
}

pub fn read_file(path: &Path, operation: &str) -> Result<String> {
    fs::read_to_string(path).map_err(|e| io_error(e, operation))
}

/// Create `path` and any missing parents.
pub fn ensure_dir(path: &Path, operation: &str) -> Result<()> {
    fs::create_dir_all(path).map_err(|e| io_error(e, operation))
}

/// Write bytes next to `path` as `<name>.tmp` and rename into place.
///
/// Readers see either the previous file or the complete new one.
pub fn write_bytes_atomic(path: &Path, content: &[u8], operation: &str) -> Result<()> {
    let tmp_path = temp_sibling(path, operation)?;

    fs::write(&tmp_path, content)
        .map_err(|e| io_error(e, &format!("{} (write temp)", operation)))?;

    if let Err(e) = fs::rename(&tmp_path, path) {
        let _ = fs::remove_file(&tmp_path);
        return Err(io_error(e, &format!("{} (rename)", operation)));
    }

    Ok(())
}

pub fn write_file_atomic(path: &Path, content: &str, operation: &str) -> Result<()> {
    write_bytes_atomic(path, content.as_bytes(), operation)
}

/// `<dir>/<file_name>.tmp` for a target path.
pub fn temp_sibling(path: &Path, operation: &str) -> Result<PathBuf> {
    let invalid = || {
        Error::internal_io(
            format!("Invalid path: {}", path.display()),
            Some(operation.to_string()),
        )
    };
    let parent = path.parent().ok_or_else(invalid)?;
    let filename = path.file_name().ok_or_else(invalid)?;
    Ok(parent.join(format!("{}.tmp", filename.to_string_lossy())))
}

/// Remove a file or directory tree. Missing paths are not an error.
///
/// Returns whether anything was removed.
pub fn remove_path(path: &Path, operation: &str) -> Result<bool> {
    let metadata = match fs::symlink_metadata(path) {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(io_error(e, operation)),
    };

    let removed = if metadata.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    };

    match removed {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(io_error(e, operation)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn read_file_returns_error_for_missing_file() {
        let err = read_file(Path::new("/nonexistent/path.txt"), "test read").unwrap_err();
        assert_eq!(err.code.as_str(), "internal.io_error");
        assert_eq!(err.details["context"], "test read");
    }

    #[test]
    fn write_file_atomic_replaces_content_and_leaves_no_temp() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("wrangler.toml");

        write_file_atomic(&path, "first", "write").unwrap();
        write_file_atomic(&path, "second", "write").unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "second");
        assert!(!dir.path().join("wrangler.toml.tmp").exists());
    }

    #[test]
    fn write_file_atomic_fails_when_parent_missing() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("missing").join("file.txt");
        assert!(write_file_atomic(&path, "x", "write").is_err());
    }

    #[test]
    fn ensure_dir_creates_nested_directories() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("a").join("b").join("src");
        ensure_dir(&nested, "mkdir").unwrap();
        assert!(nested.is_dir());
    }

    #[test]
    fn remove_path_handles_dirs_files_and_missing() {
        let dir = TempDir::new().unwrap();
        let tree = dir.path().join("tree");
        fs::create_dir_all(tree.join("src")).unwrap();
        fs::write(tree.join("src").join("worker.js"), "js").unwrap();
        let file = dir.path().join("loose.txt");
        fs::write(&file, "x").unwrap();

        assert!(remove_path(&tree, "cleanup").unwrap());
        assert!(remove_path(&file, "cleanup").unwrap());
        assert!(!remove_path(&tree, "cleanup").unwrap());
        assert!(!tree.exists());
        assert!(!file.exists());
    }
}
