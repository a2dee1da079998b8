//! Discovery of candidate module sources in the plugin directory.
//!
//! A candidate is either a file directly under the root whose extension a
//! loader handles, or the `index.<ext>` entry of a first-level subdirectory.

use std::path::{Component, Path, PathBuf};

use tracing::debug;

use hookhost_core::AppResult;

/// Entry file name (without extension) inside a plugin subdirectory.
pub const ENTRY_STEM: &str = "index";

/// Lists candidate sources under `root`, sorted by path.
///
/// A missing root yields no candidates. Each call reflects the current
/// directory state.
pub async fn discover(root: &Path, extensions: &[String]) -> AppResult<Vec<PathBuf>> {
    let mut entries = match tokio::fs::read_dir(root).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let mut candidates = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if is_hidden(&path) {
            continue;
        }

        let file_type = entry.file_type().await?;
        if file_type.is_dir() {
            for ext in extensions {
                let index = path.join(format!("{ENTRY_STEM}.{ext}"));
                if tokio::fs::metadata(&index).await.is_ok_and(|m| m.is_file()) {
                    candidates.push(index);
                    break;
                }
            }
        } else if has_extension(&path, extensions) {
            candidates.push(path);
        }
    }

    candidates.sort();
    debug!(root = %root.display(), count = candidates.len(), "Plugin discovery pass");
    Ok(candidates)
}

/// Maps a changed path to the candidate source it belongs to, if any.
///
/// Used by the watcher, so it works on paths that may no longer exist.
pub fn candidate_for(root: &Path, path: &Path, extensions: &[String]) -> Option<PathBuf> {
    let relative = path.strip_prefix(root).ok()?;
    let parts: Vec<&str> = relative
        .components()
        .map(|c| match c {
            Component::Normal(part) => part.to_str(),
            _ => None,
        })
        .collect::<Option<_>>()?;

    match parts.as_slice() {
        [file] if !file.starts_with('.') && has_extension(Path::new(file), extensions) => {
            Some(root.join(file))
        }
        [dir, ..] if !dir.starts_with('.') => {
            let dir = root.join(dir);
            // An existing entry wins; otherwise the changed path itself, when it is one.
            extensions
                .iter()
                .map(|ext| dir.join(format!("{ENTRY_STEM}.{ext}")))
                .find(|index| index.is_file())
                .or_else(|| {
                    (parts.len() == 2 && is_entry_file(Path::new(parts[1]), extensions))
                        .then(|| dir.join(parts[1]))
                })
        }
        _ => None,
    }
}

fn is_entry_file(path: &Path, extensions: &[String]) -> bool {
    path.file_stem().and_then(|s| s.to_str()) == Some(ENTRY_STEM) && has_extension(path, extensions)
}

fn has_extension(path: &Path, extensions: &[String]) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| extensions.iter().any(|known| known == ext))
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.starts_with('.'))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exts() -> Vec<String> {
        vec!["json".to_string()]
    }

    #[tokio::test]
    async fn test_missing_root_is_empty() {
        let dir = tempfile::tempdir().expect("tempdir");
        let found = discover(&dir.path().join("absent"), &exts()).await.unwrap();
        assert!(found.is_empty());
    }

    #[tokio::test]
    async fn test_flat_files_and_subdirectory_entries() {
        let dir = tempfile::tempdir().expect("tempdir");
        let root = dir.path();
        std::fs::write(root.join("b.json"), "{}").unwrap();
        std::fs::write(root.join("a.json"), "{}").unwrap();
        std::fs::write(root.join("notes.txt"), "").unwrap();
        std::fs::write(root.join(".hidden.json"), "{}").unwrap();
        std::fs::create_dir(root.join("c")).unwrap();
        std::fs::write(root.join("c").join("index.json"), "{}").unwrap();
        std::fs::create_dir(root.join("d")).unwrap();
        std::fs::write(root.join("d").join("other.json"), "{}").unwrap();

        let found = discover(root, &exts()).await.unwrap();

        assert_eq!(
            found,
            vec![
                root.join("a.json"),
                root.join("b.json"),
                root.join("c").join("index.json"),
            ]
        );
    }

    #[tokio::test]
    async fn test_discovery_is_restartable() {
        let dir = tempfile::tempdir().expect("tempdir");
        let root = dir.path();
        std::fs::write(root.join("a.json"), "{}").unwrap();
        assert_eq!(discover(root, &exts()).await.unwrap().len(), 1);

        std::fs::write(root.join("b.json"), "{}").unwrap();
        assert_eq!(discover(root, &exts()).await.unwrap().len(), 2);
    }

    #[test]
    fn test_candidate_for_changed_paths() {
        let dir = tempfile::tempdir().expect("tempdir");
        let root = dir.path();
        std::fs::create_dir(root.join("c")).unwrap();
        std::fs::write(root.join("c").join("index.json"), "{}").unwrap();

        assert_eq!(
            candidate_for(root, &root.join("a.json"), &exts()),
            Some(root.join("a.json"))
        );
        assert_eq!(
            candidate_for(root, &root.join("c").join("helper.txt"), &exts()),
            Some(root.join("c").join("index.json"))
        );
        assert_eq!(
            candidate_for(root, &root.join("gone").join("index.json"), &exts()),
            Some(root.join("gone").join("index.json"))
        );
        assert_eq!(candidate_for(root, &root.join("a.txt"), &exts()), None);
        assert_eq!(candidate_for(root, &root.join(".a.json"), &exts()), None);
        assert_eq!(candidate_for(root, Path::new("/elsewhere/a.json"), &exts()), None);
    }
}
