//! Filesystem operations module.
//!
//! Enumerates the regular files under a root directory and turns them into
//! `FileReference`s whose keys are root-relative, `/`-separated paths.

use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::error::EngineError;
use crate::model::FileReference;

/// Filters applied while walking a directory tree.
#[derive(Debug, Clone, Default)]
pub struct EnumerateOptions {
    /// Only include files with one of these extensions (case-insensitive,
    /// leading dot optional). Empty means every file.
    pub extensions: Vec<String>,

    /// Paths to leave out, such as the manifest file itself
    pub exclude: Vec<PathBuf>,
}

impl EnumerateOptions {
    /// True if `path` passes the extension filter. Exclusions are not checked.
    pub fn wants(&self, path: &Path) -> bool {
        if self.extensions.is_empty() {
            return true;
        }
        let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
            return false;
        };
        self.extensions
            .iter()
            .any(|wanted| wanted.trim_start_matches('.').eq_ignore_ascii_case(ext))
    }
}

/// Enumerate every regular file below `root`, sorted by key.
///
/// Symbolic links are not followed. A subdirectory that cannot be read is
/// logged and skipped; only failure to read `root` itself is an error.
///
/// # Errors
/// `RootNotFound` if `root` does not exist, `EnumerationFailed` if it is not
/// a readable directory.
pub fn enumerate_files(
    root: &Path,
    options: &EnumerateOptions,
) -> Result<Vec<FileReference>, EngineError> {
    let root = match fs::canonicalize(root) {
        Ok(path) => path,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(EngineError::RootNotFound {
                path: root.to_path_buf(),
            })
        }
        Err(e) => {
            return Err(EngineError::EnumerationFailed {
                path: root.to_path_buf(),
                source: e,
            })
        }
    };

    if !root.is_dir() {
        return Err(EngineError::EnumerationFailed {
            path: root.clone(),
            source: io::Error::new(io::ErrorKind::InvalidInput, "not a directory"),
        });
    }

    let excluded: HashSet<PathBuf> = options.exclude.iter().map(|p| absolute(p)).collect();

    let mut files = Vec::new();
    let entries = fs::read_dir(&root).map_err(|e| EngineError::EnumerationFailed {
        path: root.clone(),
        source: e,
    })?;
    walk(entries, &root, "", options, &excluded, &mut files);

    files.sort_by(|a, b| a.key.cmp(&b.key));
    tracing::debug!(root = %root.display(), files = files.len(), "enumerated directory");
    Ok(files)
}

fn walk(
    entries: fs::ReadDir,
    dir: &Path,
    prefix: &str,
    options: &EnumerateOptions,
    excluded: &HashSet<PathBuf>,
    files: &mut Vec<FileReference>,
) {
    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(dir = %dir.display(), error = %e, "skipping unreadable entry");
                continue;
            }
        };

        let file_type = match entry.file_type() {
            Ok(t) => t,
            Err(e) => {
                tracing::warn!(path = %entry.path().display(), error = %e, "skipping entry");
                continue;
            }
        };

        let file_name = entry.file_name();
        let Some(name) = file_name.to_str() else {
            tracing::warn!(path = %entry.path().display(), "skipping entry whose name is not valid UTF-8");
            continue;
        };
        let key = if prefix.is_empty() {
            name.to_string()
        } else {
            format!("{}/{}", prefix, name)
        };
        let path = entry.path();

        if file_type.is_dir() {
            match fs::read_dir(&path) {
                Ok(children) => walk(children, &path, &key, options, excluded, files),
                Err(e) => {
                    tracing::warn!(dir = %path.display(), error = %e, "skipping unreadable directory")
                }
            }
        } else if file_type.is_file() {
            if excluded.contains(&path) || !options.wants(&path) {
                continue;
            }
            files.push(FileReference::new(path, key));
        } else {
            tracing::debug!(path = %path.display(), "skipping non-regular file");
        }
    }
}

/// Best-effort absolute form of a path that may not exist yet.
fn absolute(path: &Path) -> PathBuf {
    if let Ok(canonical) = fs::canonicalize(path) {
        return canonical;
    }
    match (path.parent(), path.file_name()) {
        (Some(parent), Some(name)) if !parent.as_os_str().is_empty() => fs::canonicalize(parent)
            .map(|p| p.join(name))
            .unwrap_or_else(|_| path.to_path_buf()),
        _ => std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(path: &Path, content: &[u8]) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("Failed to create parent dir");
        }
        fs::write(path, content).expect("Failed to write file");
    }

    #[test]
    fn test_enumerate_flat_directory() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        touch(&temp_dir.path().join("file2.txt"), b"test data 2");
        touch(&temp_dir.path().join("file1.txt"), b"test data 1");

        let files = enumerate_files(temp_dir.path(), &EnumerateOptions::default())
            .expect("Failed to enumerate");

        let keys: Vec<_> = files.iter().map(|f| f.key.as_str()).collect();
        assert_eq!(keys, vec!["file1.txt", "file2.txt"]);
        assert!(files.iter().all(|f| f.path.is_absolute()));
    }

    #[test]
    fn test_enumerate_nested_directory_uses_slash_keys() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        touch(&temp_dir.path().join("top.txt"), b"1");
        touch(&temp_dir.path().join("sub").join("deeper").join("leaf.txt"), b"2");
        fs::create_dir(temp_dir.path().join("empty")).expect("Failed to create dir");

        let files = enumerate_files(temp_dir.path(), &EnumerateOptions::default())
            .expect("Failed to enumerate");

        let keys: Vec<_> = files.iter().map(|f| f.key.as_str()).collect();
        assert_eq!(keys, vec!["sub/deeper/leaf.txt", "top.txt"]);
        assert_eq!(fs::read(&files[0].path).expect("read leaf"), b"2");
    }

    #[test]
    fn test_extension_filter() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        touch(&temp_dir.path().join("a.JPG"), b"");
        touch(&temp_dir.path().join("b.png"), b"");
        touch(&temp_dir.path().join("c"), b"");

        let options = EnumerateOptions {
            extensions: vec![".jpg".to_string(), "nef".to_string()],
            ..EnumerateOptions::default()
        };
        let files = enumerate_files(temp_dir.path(), &options).expect("Failed to enumerate");

        assert_eq!(files.len(), 1);
        assert_eq!(files[0].key, "a.JPG");
    }

    #[test]
    fn test_exclude_manifest() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        touch(&temp_dir.path().join("data.bin"), b"x");
        touch(&temp_dir.path().join("SUMS.manifest"), b"; sumcheck manifest\n");

        let options = EnumerateOptions {
            exclude: vec![temp_dir.path().join("SUMS.manifest")],
            ..EnumerateOptions::default()
        };
        let files = enumerate_files(temp_dir.path(), &options).expect("Failed to enumerate");

        assert_eq!(files.len(), 1);
        assert_eq!(files[0].key, "data.bin");
    }

    #[test]
    fn test_enumerate_nonexistent_root() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let result = enumerate_files(&temp_dir.path().join("nonexistent"), &EnumerateOptions::default());
        assert!(matches!(result, Err(EngineError::RootNotFound { .. })));
    }

    #[test]
    fn test_enumerate_file_as_root() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let file = temp_dir.path().join("file.txt");
        touch(&file, b"x");

        let result = enumerate_files(&file, &EnumerateOptions::default());
        assert!(matches!(result, Err(EngineError::EnumerationFailed { .. })));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_non_utf8_names_are_skipped() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        touch(&temp_dir.path().join("plain.txt"), b"ok");
        touch(&temp_dir.path().join(OsStr::from_bytes(b"a\xff")), b"1");
        touch(&temp_dir.path().join(OsStr::from_bytes(b"a\xfe")), b"2");
        touch(&temp_dir.path().join(OsStr::from_bytes(b"dir\xff")).join("inner.txt"), b"3");

        let files = enumerate_files(temp_dir.path(), &EnumerateOptions::default())
            .expect("Failed to enumerate");

        let keys: Vec<_> = files.iter().map(|f| f.key.as_str()).collect();
        assert_eq!(keys, vec!["plain.txt"]);
    }

    #[test]
    fn test_wants_checks_extension_only() {
        let options = EnumerateOptions {
            extensions: vec!["jpg".to_string()],
            ..EnumerateOptions::default()
        };
        assert!(options.wants(Path::new("raw/IMG_1.JPG")));
        assert!(!options.wants(Path::new("notes.txt")));
        assert!(!options.wants(Path::new("jpg")));
        assert!(EnumerateOptions::default().wants(Path::new("anything")));
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinks_are_not_followed() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        touch(&temp_dir.path().join("real.txt"), b"x");
        std::os::unix::fs::symlink(temp_dir.path().join("real.txt"), temp_dir.path().join("link.txt"))
            .expect("Failed to create symlink");

        let files = enumerate_files(temp_dir.path(), &EnumerateOptions::default())
            .expect("Failed to enumerate");
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].key, "real.txt");
    }
}
