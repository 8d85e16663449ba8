use std::path::{Path, PathBuf};

use anyhow::Result;
use walkdir::{DirEntry, WalkDir};

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];

/// Collect image files under a directory for batch processing. Hidden
/// entries are skipped; the result is sorted so batches are deterministic.
pub fn scan_images(root: &Path) -> Result<Vec<PathBuf>> {
    let mut paths = Vec::new();
    let walker = WalkDir::new(root).into_iter();
    // depth 0 is the root itself, which may legitimately be dot-named
    for entry in walker.filter_entry(|e| e.depth() == 0 || !is_hidden(e)) {
        let entry = entry?;
        if entry.file_type().is_file() && is_image(entry.path()) {
            paths.push(entry.path().to_path_buf());
        }
    }
    paths.sort();
    Ok(paths)
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry
        .file_name()
        .to_str()
        .map(|s| s.starts_with('.'))
        .unwrap_or(false)
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_scan_filters_and_sorts() -> Result<()> {
        let dir = tempfile::tempdir()?;
        fs::write(dir.path().join("b.jpg"), b"x")?;
        fs::write(dir.path().join("a.PNG"), b"x")?;
        fs::write(dir.path().join("notes.txt"), b"x")?;
        fs::write(dir.path().join(".hidden.jpg"), b"x")?;
        let found = scan_images(dir.path())?;
        let names: Vec<_> = found
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap())
            .collect();
        assert_eq!(names, vec!["a.PNG", "b.jpg"]);
        Ok(())
    }
}
