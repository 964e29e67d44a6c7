//! Source tree enumeration.
//!
//! Recursively walks the source directory and maps every file to its
//! item path inside the container, with relative paths normalized to
//! forward slashes.

use std::path::Path;

use crate::error::UploadError;
use crate::types::UploadUnit;

/// Enumerates every file under `source_dir` as an [`UploadUnit`].
///
/// `container_path` is the container-relative base the tree lands
/// under; a trailing `/` is ignored and an empty base maps files to
/// their bare relative paths. Fails with
/// [`UploadError::SourceNotFound`] if `source_dir` does not exist.
/// An empty directory yields an empty list.
pub fn enumerate_units(
    source_dir: &Path,
    container_path: &str,
) -> Result<Vec<UploadUnit>, UploadError> {
    if !source_dir.is_dir() {
        return Err(UploadError::SourceNotFound(source_dir.to_path_buf()));
    }

    let base = container_path.trim_end_matches('/');
    let mut units = Vec::new();
    walk_dir(source_dir, source_dir, base, &mut units)?;
    Ok(units)
}

fn walk_dir(
    root: &Path,
    current: &Path,
    base: &str,
    units: &mut Vec<UploadUnit>,
) -> Result<(), UploadError> {
    for entry in std::fs::read_dir(current)? {
        let entry = entry?;
        let path = entry.path();
        let metadata = entry.metadata()?;

        if metadata.is_dir() {
            walk_dir(root, &path, base, units)?;
        } else if metadata.is_file() {
            let rel = path.strip_prefix(root).map_err(std::io::Error::other)?;

            // Normalize to forward slashes.
            let rel = rel.to_string_lossy().replace('\\', "/");
            let item_path = if base.is_empty() {
                rel
            } else {
                format!("{base}/{rel}")
            };

            units.push(UploadUnit {
                source: path,
                item_path,
                size: metadata.len(),
            });
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::fs;
    use tempfile::TempDir;

    fn create_test_tree() -> TempDir {
        let dir = TempDir::new().unwrap();
        let root = dir.path();

        fs::write(root.join("index.html"), b"<html/>").unwrap();
        fs::write(root.join("cobertura.xml"), b"<coverage/>").unwrap();

        fs::create_dir_all(root.join("assets").join("js")).unwrap();
        fs::write(root.join("assets").join("style.css"), b"css").unwrap();
        fs::write(root.join("assets").join("js").join("report.js"), b"js!").unwrap();

        dir
    }

    #[test]
    fn enumerates_all_files() {
        let dir = create_test_tree();
        let units = enumerate_units(dir.path(), "coverage").unwrap();

        assert_eq!(units.len(), 4);

        let paths: HashSet<&str> = units.iter().map(|u| u.item_path.as_str()).collect();
        assert!(paths.contains("coverage/index.html"));
        assert!(paths.contains("coverage/cobertura.xml"));
        assert!(paths.contains("coverage/assets/style.css"));
        assert!(paths.contains("coverage/assets/js/report.js"));
    }

    #[test]
    fn records_file_sizes() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("report.bin"), vec![0u8; 1234]).unwrap();

        let units = enumerate_units(dir.path(), "coverage").unwrap();
        assert_eq!(units.len(), 1);
        assert_eq!(units[0].size, 1234);
        assert!(units[0].source.ends_with("report.bin"));
    }

    #[test]
    fn empty_dir_yields_empty_list() {
        let dir = TempDir::new().unwrap();
        let units = enumerate_units(dir.path(), "coverage").unwrap();
        assert!(units.is_empty());
    }

    #[test]
    fn missing_dir_is_source_not_found() {
        let result = enumerate_units(Path::new("/nonexistent/path/nowhere"), "coverage");
        assert!(matches!(result, Err(UploadError::SourceNotFound(_))));
    }

    #[test]
    fn trailing_slash_on_base_is_trimmed() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.txt"), b"a").unwrap();

        let units = enumerate_units(dir.path(), "coverage/reports/").unwrap();
        assert_eq!(units[0].item_path, "coverage/reports/a.txt");
    }

    #[test]
    fn empty_base_maps_to_bare_relative_path() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join("sub").join("a.txt"), b"a").unwrap();

        let units = enumerate_units(dir.path(), "").unwrap();
        assert_eq!(units[0].item_path, "sub/a.txt");
    }

    #[test]
    fn reruns_produce_the_same_set() {
        let dir = create_test_tree();

        let first: HashSet<UploadUnit> = enumerate_units(dir.path(), "coverage")
            .unwrap()
            .into_iter()
            .collect();
        let second: HashSet<UploadUnit> = enumerate_units(dir.path(), "coverage")
            .unwrap()
            .into_iter()
            .collect();

        assert_eq!(first, second);
    }
}
