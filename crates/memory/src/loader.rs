//! Document loader: walks a corpus directory for text files.

use std::path::Path;
use tracing::{debug, info, warn};

/// A whole text document and where it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceDocument {
    pub content: String,
    /// The file path, as a string.
    pub source: String,
}

/// Load every file under `root` whose extension is in `extensions`
/// (compared case-insensitively, without the dot).
///
/// A missing root yields no documents. Unreadable files, including ones that
/// are not valid UTF-8, are logged and skipped.
pub fn load_documents(root: &Path, extensions: &[String]) -> Vec<SourceDocument> {
    let mut docs = Vec::new();
    if !root.exists() {
        warn!(path = %root.display(), "Docs path not found");
        return docs;
    }
    walk(root, extensions, &mut docs);
    info!(path = %root.display(), count = docs.len(), "Loaded documents");
    docs
}

fn walk(dir: &Path, extensions: &[String], docs: &mut Vec<SourceDocument>) {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            warn!(path = %dir.display(), error = %e, "Failed to read directory");
            return;
        }
    };

    // `file_type` does not follow symlinks: linked directories are skipped.
    let mut paths: Vec<_> = entries
        .filter_map(|e| e.ok())
        .filter_map(|e| e.file_type().ok().map(|t| (e.path(), t.is_dir())))
        .collect();
    paths.sort();

    for (path, is_dir) in paths {
        if is_dir {
            walk(&path, extensions, docs);
            continue;
        }
        if !has_extension(&path, extensions) {
            continue;
        }
        match std::fs::read_to_string(&path) {
            Ok(content) => {
                debug!(path = %path.display(), "Loaded document");
                docs.push(SourceDocument {
                    content,
                    source: path.display().to_string(),
                });
            }
            Err(e) => warn!(path = %path.display(), error = %e, "Failed to load document"),
        }
    }
}

fn has_extension(path: &Path, extensions: &[String]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| extensions.iter().any(|want| want.eq_ignore_ascii_case(ext)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exts() -> Vec<String> {
        vec!["txt".into(), "md".into()]
    }

    #[test]
    fn missing_root_yields_nothing() {
        assert!(load_documents(Path::new("/definitely/not/here"), &exts()).is_empty());
    }

    #[test]
    fn walks_recursively_and_filters_extensions() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.md"), "# Rust ownership").unwrap();
        std::fs::write(dir.path().join("skip.pdf"), "binary-ish").unwrap();
        std::fs::create_dir(dir.path().join("nested")).unwrap();
        std::fs::write(dir.path().join("nested").join("b.txt"), "borrowing").unwrap();

        let docs = load_documents(dir.path(), &exts());
        assert_eq!(docs.len(), 2);
        assert!(docs.iter().any(|d| d.source.ends_with("a.md") && d.content.contains("ownership")));
        assert!(docs.iter().any(|d| d.source.ends_with("b.txt")));
    }

    #[cfg(unix)]
    #[test]
    fn symlinked_directories_are_not_followed() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.md"), "ownership").unwrap();
        std::os::unix::fs::symlink(dir.path(), dir.path().join("loop")).unwrap();

        let docs = load_documents(dir.path(), &exts());
        assert_eq!(docs.len(), 1);
        assert!(docs[0].source.ends_with("a.md"));
    }

    #[test]
    fn invalid_utf8_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("bad.txt"), [0xff, 0xfe, 0xfd]).unwrap();
        std::fs::write(dir.path().join("good.txt"), "fine").unwrap();

        let docs = load_documents(dir.path(), &exts());
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].content, "fine");
    }

    #[test]
    fn empty_dir_yields_nothing() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_documents(dir.path(), &exts()).is_empty());
    }
}
