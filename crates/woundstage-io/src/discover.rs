//! Input discovery.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use walkdir::WalkDir;

/// Extensions accepted when scanning a directory (compared lowercase).
pub const IMAGE_EXTENSIONS: [&str; 5] = ["jpg", "jpeg", "png", "bmp", "webp"];

/// Whether `path` has one of [`IMAGE_EXTENSIONS`], ignoring case.
#[must_use]
pub fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
}

/// Resolve `input` to the ordered list of photographs to stage.
///
/// A directory is scanned recursively for image files, and the result
/// is sorted lexicographically by path so batch order is reproducible.
/// Anything else (a file, or a path that does not exist) is returned as
/// a single entry; reading it is the loader's job, and a missing file
/// becomes a per-item read failure rather than a batch failure.
///
/// Unreadable directory entries are logged and skipped.
#[must_use]
pub fn discover_inputs(input: &Path) -> Vec<PathBuf> {
    if !input.is_dir() {
        return vec![input.to_path_buf()];
    }

    let mut files: Vec<PathBuf> = WalkDir::new(input)
        .follow_links(false)
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!(error = %e, "skipping unreadable directory entry");
                None
            }
        })
        .filter(|entry| entry.file_type().is_file() && has_image_extension(entry.path()))
        .map(walkdir::DirEntry::into_path)
        .collect();
    files.sort();

    debug!(dir = %input.display(), count = files.len(), "discovered inputs");
    files
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::fs;

    use super::*;

    #[test]
    fn extension_match_ignores_case() {
        assert!(has_image_extension(Path::new("a/b.JPG")));
        assert!(has_image_extension(Path::new("b.WebP")));
        assert!(has_image_extension(Path::new("c.jpeg")));
        assert!(!has_image_extension(Path::new("d.tiff")));
        assert!(!has_image_extension(Path::new("noext")));
    }

    #[test]
    fn directory_scan_is_recursive_filtered_and_sorted() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        for name in ["b.png", "a.JPG", "notes.txt", "sub/c.bmp", "sub/d.gif"] {
            fs::write(dir.path().join(name), b"x").unwrap();
        }

        let found = discover_inputs(dir.path());
        let rel: Vec<String> = found
            .iter()
            .map(|p| p.strip_prefix(dir.path()).unwrap().to_string_lossy().replace('\\', "/"))
            .collect();
        assert_eq!(rel, ["a.JPG", "b.png", "sub/c.bmp"]);
    }

    #[test]
    fn empty_directory_yields_nothing() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("readme.md"), b"x").unwrap();
        assert!(discover_inputs(dir.path()).is_empty());
    }

    #[test]
    fn single_path_is_passed_through() {
        let missing = Path::new("does/not/exist.jpg");
        assert_eq!(discover_inputs(missing), vec![missing.to_path_buf()]);
    }
}
